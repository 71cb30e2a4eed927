//! Fixed-capacity, frame-oriented, non-blocking FIFO for real-time audio
//! data transfer between exactly one writer and one or many readers.
//!
//! Frames are opaque fixed-size byte records carried in FIFO order through
//! a caller-owned buffer. The control state is a pair of monotonically
//! growing 32-bit indices designed to live in memory shared between address
//! spaces: the fast path is lock-free, blocking is layered on top through
//! the OS futex (with a condvar fallback off Linux), and corrupted or
//! desynchronized peers are detected rather than trusted.
//!
//! # Overview
//!
//! - [`Fifo`] — the immutable holder: geometry, buffer, shared index cells
//! - [`FifoWriter`] — the single producer
//! - [`FifoReader`] — a consumer; at most one per FIFO may throttle the writer
//! - [`FifoProvider`] — direction-neutral obtain/release over [`Iovec`]
//!   fragments
//!
//! # Example
//!
//! ```
//! use framefifo::{Fifo, FifoReader, FifoWriter, Timeout};
//!
//! let mut storage = [0u8; 24]; // 6 frames of 4 bytes
//! let fifo = Fifo::new(6, 4, &mut storage, false);
//! let mut writer = FifoWriter::new(&fifo);
//! let mut reader = FifoReader::new(&fifo, false);
//!
//! writer.write(b"abcdefgh", Timeout::NonBlocking).unwrap();
//!
//! let mut out = [0u8; 8];
//! let frames = reader.read(&mut out, Timeout::NonBlocking).unwrap();
//! assert_eq!(frames, 2);
//! assert_eq!(&out, b"abcdefgh");
//! ```

mod arith;
mod error;
mod fifo;
mod futex;
mod index;
mod provider;
mod reader;
mod trace;
mod writer;

pub use error::FifoError;
pub use fifo::Fifo;
pub use index::FifoIndex;
pub use provider::{FifoProvider, Iovec, Timeout};
pub use reader::FifoReader;
pub use trace::init_tracing;
pub use writer::FifoWriter;
