//! Errors surfaced by the FIFO endpoints.

use thiserror::Error;

/// Errors returned by [`FifoWriter`](crate::FifoWriter) and
/// [`FifoReader`](crate::FifoReader) operations.
///
/// A would-block outcome or an expired timeout is not an error: transfers
/// simply return a short (possibly zero) frame count.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FifoError {
    /// The shared index words disagree beyond any plausible wrap distance.
    ///
    /// Fatal for the call. The indices may live in memory writable by a
    /// desynchronized or hostile peer; the caller decides whether to tear
    /// the FIFO down or re-create it.
    #[error("fifo index words are corrupted")]
    Corrupted,

    /// The writer lapped this reader.
    ///
    /// Reader-only. The reader has already resynchronized itself to the
    /// oldest still-valid frame, so the next obtain sees a full buffer.
    /// `lost` is approximate: the exact count is not recoverable after an
    /// overrun, and it is reported at most once per resynchronization.
    #[error("writer overran reader, approximately {lost} frames lost")]
    Overrun {
        /// Approximate number of frames dropped since the previous call.
        lost: u32,
    },
}
