//! Direction-neutral buffer access: scatter-gather fragments, the blocking
//! policy, and the obtain/release interface shared by both endpoints.

use std::time::Duration;

use minstant::Instant;

use crate::error::FifoError;

/// One virtually contiguous fragment of a logically contiguous run of
/// frames. Compare `struct iovec` for `readv(2)` and `writev(2)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Iovec {
    /// Offset in frames from the start of the FIFO buffer.
    /// Undefined when `len == 0`.
    pub offset: u32,
    /// Length in frames.
    pub len: u32,
}

/// Blocking policy for `obtain`, `read`, and `write`.
///
/// [`Timeout::NonBlocking`] and a zero [`Timeout::Duration`] are
/// equivalent: the call transfers what it can and returns. An expired
/// timeout is not an error, it is a short transfer.
///
/// Durations are relative to the moment the call is entered.
#[derive(Debug, Clone, Copy)]
pub enum Timeout {
    /// Return immediately with whatever is available.
    NonBlocking,
    /// Wait at most this long for at least one frame.
    Duration(Duration),
    /// Wait indefinitely for at least one frame.
    Infinite,
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Self::Duration(d)
    }
}

/// Wait budget derived once per call from a [`Timeout`], shared across the
/// retries inside that call.
#[derive(Clone, Copy)]
pub(crate) enum Deadline {
    Poll,
    At(Instant),
    Never,
}

impl Deadline {
    pub(crate) fn new(timeout: Timeout) -> Self {
        match timeout {
            Timeout::NonBlocking => Self::Poll,
            Timeout::Duration(d) if d.is_zero() => Self::Poll,
            Timeout::Duration(d) => Self::At(Instant::now() + d),
            Timeout::Infinite => Self::Never,
        }
    }

    /// Remaining wait budget: `None` when the caller should stop waiting,
    /// otherwise the bound to hand to the wait primitive (`Some(None)` is
    /// unbounded).
    pub(crate) fn remaining(&self) -> Option<Option<Duration>> {
        match self {
            Self::Poll => None,
            Self::Never => Some(None),
            Self::At(deadline) => {
                let now = Instant::now();
                if now >= *deadline {
                    None
                } else {
                    Some(Some(*deadline - now))
                }
            }
        }
    }
}

/// Common two-phase interface implemented by both endpoints.
///
/// `obtain` grants direct access to up to `count` frames as one or two
/// fragments; `release` returns them to the FIFO. The count is the maximum
/// desired number of frames, not a minimum, and the timeout bounds the wait
/// for at least one frame, not for all of them.
///
/// A second `obtain` without an intervening full `release` implicitly
/// replaces the outstanding batch; fragments are always computed from the
/// released position.
pub trait FifoProvider {
    /// Grants access to up to `count` frames.
    ///
    /// Fills `iovec` with one or two fragments (the second is zeroed when a
    /// single contiguous range suffices) and returns the granted frame
    /// count, which is zero when nothing is transferable within the
    /// timeout.
    fn obtain(
        &mut self,
        iovec: &mut [Iovec; 2],
        count: usize,
        timeout: Timeout,
    ) -> Result<usize, FifoError>;

    /// Returns `count` frames obtained earlier to the FIFO.
    ///
    /// # Panics
    ///
    /// Panics if `count` exceeds the currently obtained frames.
    fn release(&mut self, count: usize);

    /// Frames granted by the most recent `obtain` and not yet released.
    fn obtained(&self) -> usize;
}
