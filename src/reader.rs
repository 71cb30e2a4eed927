//! The consumer endpoint.

use std::cell::Cell;
use std::marker::PhantomData;
use std::ptr;

use crate::arith::Diff;
use crate::error::FifoError;
use crate::fifo::Fifo;
use crate::provider::{Deadline, FifoProvider, Iovec, Timeout};
use crate::trace;

/// Marker type to opt out of `Sync` while remaining `Send`.
type PhantomUnsync = PhantomData<Cell<&'static ()>>;

/// Read end of a [`Fifo`]: one consumer.
///
/// Any number of readers may attach to one FIFO. At most one of them may
/// throttle the writer by publishing its front index; the others consume
/// independently and can be overrun. An overrun reader loses a contiguous
/// range of frames, resynchronizes to the oldest frame still present, and
/// reports an approximate loss once; the remaining frames stay in order.
///
/// # Thread safety
///
/// `FifoReader` is [`Send`] but **not** [`Sync`]: move it to the consuming
/// thread, do not share it. Users must also ensure at most one reader per
/// FIFO passes `throttles_writer = true`, across all attached processes.
pub struct FifoReader<'a> {
    fifo: &'a Fifo<'a>,
    /// Raw index of the first frame slot available to read.
    local_front: u32,
    /// Whether this reader publishes its front to throttle the writer.
    throttles_writer: bool,
    /// Frames granted by the most recent obtain, less those released.
    obtained: u32,
    /// Rearm the trigger when the fill rises to this level or above.
    high_level_arm: u32,
    /// While armed, wake the writer when the fill drops to this level.
    low_level_trigger: u32,
    armed: bool,
    _unsync: PhantomUnsync,
}

impl<'a> FifoReader<'a> {
    /// Attaches a reader to `fifo`.
    ///
    /// A throttling reader adopts the current shared front; a non-throttling
    /// reader starts at index zero and, when attaching to a long-running
    /// FIFO, self-heals through the overrun resynchronization on its first
    /// obtain.
    ///
    /// The default trigger levels wake the writer on every publishing
    /// release; use [`set_low_level_trigger`](Self::set_low_level_trigger)
    /// and [`set_high_level_arm`](Self::set_high_level_arm) to coalesce
    /// wakeups.
    ///
    /// # Panics
    ///
    /// Panics if `throttles_writer` is requested on a FIFO constructed
    /// without a throttling front index.
    #[must_use]
    pub fn new(fifo: &'a Fifo<'a>, throttles_writer: bool) -> Self {
        let local_front = if throttles_writer {
            fifo.throttle_front()
                .expect("fifo was constructed without a throttling front")
                .load_acquire()
        } else {
            0
        };
        Self {
            fifo,
            local_front,
            throttles_writer,
            obtained: 0,
            high_level_arm: 0,
            low_level_trigger: fifo.frame_count(),
            armed: true,
            _unsync: PhantomData,
        }
    }

    /// Reads up to `dst.len() / frame_size` frames into `dst`.
    ///
    /// Returns the number of frames copied, short (or zero) when the FIFO
    /// drains before the timeout elapses.
    ///
    /// # Errors
    ///
    /// [`FifoError::Overrun`] if the writer lapped this reader before any
    /// frame was copied: the reader has resynchronized and the next call
    /// reads the oldest frames still present. An overrun detected after a
    /// partial transfer ends the call short instead. [`FifoError::Corrupted`]
    /// if the index words are damaged.
    ///
    /// # Panics
    ///
    /// Panics if `dst.len()` is not a multiple of the frame size.
    pub fn read(&mut self, dst: &mut [u8], timeout: Timeout) -> Result<usize, FifoError> {
        let frame_size = self.fifo.frame_size() as usize;
        assert!(
            dst.len() % frame_size == 0,
            "destination length must be a multiple of the frame size"
        );
        let count = dst.len() / frame_size;
        let deadline = Deadline::new(timeout);
        let mut iovec = [Iovec::default(); 2];
        let mut transferred = 0usize;
        while transferred < count {
            let granted = match self.obtain_inner(&mut iovec, count - transferred, deadline) {
                Ok(0) => break,
                Ok(granted) => granted,
                Err(err) if transferred == 0 => return Err(err),
                Err(_) => break,
            };
            let mut dst_offset = transferred * frame_size;
            for frag in iovec.iter().take_while(|frag| frag.len > 0) {
                let (src, len) = self.fifo.fragment_raw(frag);
                // SAFETY: fragment_raw bounds the source inside the FIFO
                // buffer; the index protocol keeps the writer out of slots
                // between our front and the rear it published.
                unsafe {
                    ptr::copy_nonoverlapping(src, dst.as_mut_ptr().add(dst_offset), len);
                }
                dst_offset += len;
            }
            self.release(granted);
            transferred += granted;
        }
        Ok(transferred)
    }

    /// Grants access to up to `count` readable frames as one or two
    /// fragments. See [`FifoProvider::obtain`].
    ///
    /// An empty FIFO parks the reader on the rear index until the writer
    /// advances it or the timeout expires.
    ///
    /// # Errors
    ///
    /// [`FifoError::Overrun`] when the writer lapped this reader; the error
    /// carries the approximate loss, the reader is already resynchronized,
    /// and the next obtain sees a full buffer. [`FifoError::Corrupted`] if
    /// the index words are damaged.
    pub fn obtain(
        &mut self,
        iovec: &mut [Iovec; 2],
        count: usize,
        timeout: Timeout,
    ) -> Result<usize, FifoError> {
        self.obtain_inner(iovec, count, Deadline::new(timeout))
    }

    fn obtain_inner(
        &mut self,
        iovec: &mut [Iovec; 2],
        count: usize,
        deadline: Deadline,
    ) -> Result<usize, FifoError> {
        let arith = self.fifo.arith();
        let filled = loop {
            let rear = self.fifo.rear().load_acquire();
            match arith.diff(rear, self.local_front) {
                Diff::Ok(0) => match deadline.remaining() {
                    None => break 0,
                    Some(timeout) => {
                        self.fifo.rear().wait(rear, timeout, self.fifo.is_private());
                    }
                },
                Diff::Ok(filled) => break filled,
                Diff::Overrun { lost } => {
                    // The writer lapped us. Snap to the oldest frame still
                    // present and report the estimated loss once.
                    self.local_front = arith.oldest_valid_front(rear);
                    self.obtained = 0;
                    if self.throttles_writer {
                        // Keep a blocked writer from waiting on a front that
                        // no longer moves.
                        if let Some(front_cell) = self.fifo.throttle_front() {
                            front_cell.store_release(self.local_front);
                            front_cell.wake_one(self.fifo.is_private());
                        }
                    }
                    trace::warn!(lost, "reader overrun, resynchronized");
                    return Err(FifoError::Overrun { lost });
                }
                Diff::Corrupt => return Err(FifoError::Corrupted),
            }
        };
        let granted = count.min(filled as usize) as u32;
        *iovec = arith.fragments(self.local_front, granted);
        self.obtained = granted;
        Ok(granted as usize)
    }

    /// Returns `count` consumed frames to the writer.
    ///
    /// # Panics
    ///
    /// Panics if `count` exceeds the frames obtained and not yet released.
    pub fn release(&mut self, count: usize) {
        assert!(
            count <= self.obtained as usize,
            "released more frames than obtained"
        );
        if count == 0 {
            return;
        }
        let count = count as u32;
        let arith = self.fifo.arith();
        self.local_front = arith.sum(self.local_front, count);
        self.obtained -= count;
        if !self.throttles_writer {
            return;
        }
        let Some(front_cell) = self.fifo.throttle_front() else {
            return;
        };
        front_cell.store_release(self.local_front);
        // Coalesce wakeups: wake the writer parked on the front only on an
        // armed crossing of the low-water level, rearm when the fill rises
        // back to the high-water level.
        if let Diff::Ok(filled) = arith.diff(self.fifo.rear().load_acquire(), self.local_front) {
            if self.armed && filled <= self.low_level_trigger {
                trace::debug!(filled, "reader trigger, waking writer");
                front_cell.wake_one(self.fifo.is_private());
                self.armed = false;
            }
            if filled >= self.high_level_arm {
                self.armed = true;
            }
        }
    }

    /// Bytes of one obtained fragment, for zero-copy consumption.
    ///
    /// # Panics
    ///
    /// Panics if the fragment does not lie within the FIFO buffer.
    pub fn fragment(&self, frag: &Iovec) -> &[u8] {
        let (ptr, len) = self.fifo.fragment_raw(frag);
        // SAFETY: the range is inside the buffer; the index protocol keeps
        // the writer out of slots between our front and the rear.
        unsafe { std::slice::from_raw_parts(ptr, len) }
    }

    /// Sets the low-water level at which an armed reader wakes the writer.
    /// Values above the capacity are clamped. Only meaningful for the
    /// throttling reader.
    pub fn set_low_level_trigger(&mut self, level: u32) {
        self.low_level_trigger = level.min(self.fifo.frame_count());
    }

    /// Sets the high-water level at which the trigger rearms. Values above
    /// the capacity are clamped.
    pub fn set_high_level_arm(&mut self, level: u32) {
        self.high_level_arm = level.min(self.fifo.frame_count());
    }
}

impl FifoProvider for FifoReader<'_> {
    fn obtain(
        &mut self,
        iovec: &mut [Iovec; 2],
        count: usize,
        timeout: Timeout,
    ) -> Result<usize, FifoError> {
        FifoReader::obtain(self, iovec, count, timeout)
    }

    fn release(&mut self, count: usize) {
        FifoReader::release(self, count);
    }

    fn obtained(&self) -> usize {
        self.obtained as usize
    }
}
