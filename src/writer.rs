//! The producer endpoint.

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

/// Write end of a [`Fifo`]: the single producer.
///
/// The writer owns the rear index. Frames become visible to readers when
/// `release` publishes the advanced rear with a release store; a reader
/// that observes the new rear with its acquire load is guaranteed to see
/// the frame bytes copied before it.
///
/// # Thread safety
///
/// `FifoWriter` is [`Send`] but **not** [`Sync`]: move it to the producing
/// thread, do not share it. The type system cannot prevent constructing a
/// second writer on the same FIFO (or another process attaching one when
/// the indices live in shared memory); users must ensure exactly one writer
/// exists, or the index protocol is violated.
pub struct FifoWriter<'a> {
    fifo: &'a Fifo<'a>,
    /// Raw index of the next frame slot available to write. Equals the
    /// shared rear at every quiescent point; only this endpoint advances
    /// either.
    local_rear: u32,
    /// Frames granted by the most recent obtain, less those released.
    obtained: u32,
    /// Rearm the trigger when the fill drops to this level or below.
    low_level_arm: u32,
    /// While armed, wake the readers when the fill reaches this level.
    high_level_trigger: u32,
    armed: bool,
    /// Soft capacity in `[1, frame_count]`: shrinks the apparent buffer
    /// without reallocating.
    effective_frames: u32,
    _unsync: PhantomUnsync,
}

impl<'a> FifoWriter<'a> {
    /// Attaches the writer to `fifo`, adopting the current shared rear.
    ///
    /// The default trigger levels wake the readers on every publishing
    /// release; use [`set_high_level_trigger`](Self::set_high_level_trigger)
    /// and [`set_low_level_arm`](Self::set_low_level_arm) to coalesce
    /// wakeups.
    #[must_use]
    pub fn new(fifo: &'a Fifo<'a>) -> Self {
        let frame_count = fifo.frame_count();
        Self {
            fifo,
            local_rear: fifo.rear().load_acquire(),
            obtained: 0,
            low_level_arm: frame_count,
            high_level_trigger: 0,
            armed: true,
            effective_frames: frame_count,
            _unsync: PhantomData,
        }
    }

    /// Writes the frames in `src`, which must hold a whole number of them.
    ///
    /// Returns the number of frames actually written, which may be short
    /// (or zero) if the FIFO stayed full past the timeout.
    ///
    /// # Errors
    ///
    /// [`FifoError::Corrupted`] if the index words are damaged.
    ///
    /// # Panics
    ///
    /// Panics if `src.len()` is not a multiple of the frame size.
    pub fn write(&mut self, src: &[u8], timeout: Timeout) -> Result<usize, FifoError> {
        let frame_size = self.fifo.frame_size() as usize;
        assert!(
            src.len() % frame_size == 0,
            "source length must be a multiple of the frame size"
        );
        let count = src.len() / frame_size;
        let deadline = Deadline::new(timeout);
        let mut iovec = [Iovec::default(); 2];
        let mut transferred = 0usize;
        while transferred < count {
            let granted = self.obtain_inner(&mut iovec, count - transferred, deadline)?;
            if granted == 0 {
                break;
            }
            let mut src_offset = transferred * frame_size;
            for frag in iovec.iter().take_while(|frag| frag.len > 0) {
                let (dst, len) = self.fifo.fragment_raw(frag);
                // SAFETY: fragment_raw bounds the destination inside the
                // FIFO buffer, and the index protocol gives the writer
                // exclusive ownership of obtained, unreleased slots.
                unsafe {
                    ptr::copy_nonoverlapping(src.as_ptr().add(src_offset), dst, len);
                }
                src_offset += len;
            }
            self.release(granted);
            transferred += granted;
        }
        Ok(transferred)
    }

    /// Grants up to `count` frames for in-place production as one or two
    /// fragments. See [`FifoProvider::obtain`].
    ///
    /// A throttled writer with nothing available parks on the throttling
    /// front index until its reader advances it or the timeout expires.
    ///
    /// # Errors
    ///
    /// [`FifoError::Corrupted`] if the index words are damaged. Writers
    /// have no overflow path: the throttling front bounds them from above.
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
        let available = loop {
            match self.fifo.throttle_front() {
                // Unthrottled: nothing bounds the writer from above, but a
                // single obtain can only describe one buffer's worth of
                // distinct slots.
                None => break self.effective_frames,
                Some(front_cell) => {
                    let front = front_cell.load_acquire();
                    let filled = match arith.diff(self.local_rear, front) {
                        Diff::Ok(filled) => filled,
                        // The throttling front can never legitimately pass
                        // the rear.
                        Diff::Overrun { .. } | Diff::Corrupt => {
                            return Err(FifoError::Corrupted);
                        }
                    };
                    let available = self.effective_frames.saturating_sub(filled);
                    if available > 0 {
                        break available;
                    }
                    match deadline.remaining() {
                        None => break 0,
                        Some(timeout) => {
                            front_cell.wait(front, timeout, self.fifo.is_private());
                        }
                    }
                }
            }
        };
        let granted = count.min(available as usize) as u32;
        *iovec = arith.fragments(self.local_rear, granted);
        self.obtained = granted;
        Ok(granted as usize)
    }

    /// Publishes `count` produced frames to the readers.
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
        self.local_rear = arith.sum(self.local_rear, count);
        self.fifo.rear().store_release(self.local_rear);
        self.obtained -= count;
        match self.fifo.throttle_front() {
            Some(front_cell) => {
                // Coalesce wakeups: wake the readers parked on the rear only
                // on an armed crossing of the high-water level, rearm when
                // the throttling reader drains back to the low-water level.
                if let Diff::Ok(filled) = arith.diff(self.local_rear, front_cell.load_acquire()) {
                    if self.armed && filled >= self.high_level_trigger {
                        trace::debug!(filled, "writer trigger, waking readers");
                        self.fifo.rear().wake_all(self.fifo.is_private());
                        self.armed = false;
                    }
                    if filled <= self.low_level_arm {
                        self.armed = true;
                    }
                }
            }
            // Without a throttling front the fill level is unobservable, so
            // every publish wakes.
            None => self.fifo.rear().wake_all(self.fifo.is_private()),
        }
    }

    /// Bytes of one obtained fragment, for in-place production.
    ///
    /// # Panics
    ///
    /// Panics if the fragment does not lie within the FIFO buffer.
    pub fn fragment_mut(&mut self, frag: &Iovec) -> &mut [u8] {
        let (ptr, len) = self.fifo.fragment_raw(frag);
        // SAFETY: the range is inside the buffer, and the writer holds
        // exclusive ownership of obtained, unreleased slots.
        unsafe { std::slice::from_raw_parts_mut(ptr, len) }
    }

    /// Sets the high-water level at which an armed writer wakes the
    /// readers. Values above the capacity are clamped.
    pub fn set_high_level_trigger(&mut self, level: u32) {
        self.high_level_trigger = level.min(self.fifo.frame_count());
    }

    /// Sets the low-water level at which the trigger rearms. Values above
    /// the capacity are clamped.
    pub fn set_low_level_arm(&mut self, level: u32) {
        self.low_level_arm = level.min(self.fifo.frame_count());
    }

    /// Shrinks or restores the apparent capacity without touching the
    /// underlying buffer. Clamped to `[1, frame_count]`.
    pub fn set_effective_frames(&mut self, frames: u32) {
        self.effective_frames = frames.clamp(1, self.fifo.frame_count());
    }
}

impl FifoProvider for FifoWriter<'_> {
    fn obtain(
        &mut self,
        iovec: &mut [Iovec; 2],
        count: usize,
        timeout: Timeout,
    ) -> Result<usize, FifoError> {
        FifoWriter::obtain(self, iovec, count, timeout)
    }

    fn release(&mut self, count: usize) {
        FifoWriter::release(self, count);
    }

    fn obtained(&self) -> usize {
        self.obtained as usize
    }
}
