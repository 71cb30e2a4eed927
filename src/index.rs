//! The shared 32-bit index cell.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::futex;

/// A frame counter shared between the writer and the readers, possibly
/// across address spaces.
///
/// The cell is exactly 32 bits with natural alignment and no hidden fields,
/// so differently-compiled peers agree on its layout, and it doubles as the
/// word the OS wait primitive targets (a Linux futex is 32 bits on every
/// platform). The counter grows monotonically modulo 2³²; slot positions
/// are derived from it by the FIFO's internal arithmetic, never stored here.
///
/// # Shared memory
///
/// Exactly one peer zero-initializes an index (via [`FifoIndex::new`] or by
/// writing zero bytes); every other peer binds to the existing bytes. The
/// type is `#[repr(transparent)]` over [`AtomicU32`], so a correctly aligned
/// 4-byte region of a shared mapping may be reinterpreted as a `FifoIndex`
/// by the embedding application.
#[repr(transparent)]
pub struct FifoIndex(AtomicU32);

impl FifoIndex {
    /// Creates a zero index. In shared memory, run by exactly one peer.
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    pub(crate) fn load_acquire(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    /// Publishes a new value. Pairs with [`load_acquire`](Self::load_acquire)
    /// on the peer side, so frame bytes copied before the store are visible
    /// to anyone who observes the new index.
    pub(crate) fn store_release(&self, value: u32) {
        self.0.store(value, Ordering::Release);
    }

    /// Parks the calling thread until the cell no longer holds `expected`,
    /// a wake arrives, the timeout expires, or spuriously. `None` waits
    /// indefinitely. Callers re-read the cell and decide what happened.
    pub(crate) fn wait(&self, expected: u32, timeout: Option<Duration>, private: bool) {
        futex::wait(&self.0, expected, timeout, private);
    }

    /// Wakes the single waiter parked on this cell.
    pub(crate) fn wake_one(&self, private: bool) {
        futex::wake(&self.0, futex::WAKE_ONE, private);
    }

    /// Wakes every waiter parked on this cell.
    pub(crate) fn wake_all(&self, private: bool) {
        futex::wake(&self.0, futex::WAKE_ALL, private);
    }
}

impl Default for FifoIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_is_a_bare_32_bit_word() {
        // Peers compiled separately must agree on the layout.
        assert_eq!(std::mem::size_of::<FifoIndex>(), 4);
        assert_eq!(std::mem::align_of::<FifoIndex>(), 4);
    }

    #[test]
    fn store_then_load_round_trips() {
        let index = FifoIndex::new();
        assert_eq!(index.load_acquire(), 0);
        index.store_release(0xDEAD_BEEF);
        assert_eq!(index.load_acquire(), 0xDEAD_BEEF);
    }

    #[test]
    fn wait_with_stale_expectation_does_not_block() {
        let index = FifoIndex::new();
        index.store_release(42);
        index.wait(7, Some(Duration::from_secs(5)), true);
    }
}
