//! The FIFO holder: frame geometry, the caller-owned buffer, and the shared
//! index cells. The holder performs no I/O itself; the endpoints do.

use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::arith::IndexArith;
use crate::index::FifoIndex;
use crate::provider::Iovec;

/// Storage for one index cell: embedded for the single-process constructor,
/// borrowed when the caller supplies cells living in a shared mapping.
enum IndexCell<'a> {
    Embedded(FifoIndex),
    Shared(&'a FifoIndex),
}

impl IndexCell<'_> {
    fn get(&self) -> &FifoIndex {
        match self {
            IndexCell::Embedded(index) => index,
            IndexCell::Shared(index) => index,
        }
    }
}

/// Fixed-capacity frame FIFO over a caller-owned byte buffer.
///
/// Immutable after construction. Exactly one [`FifoWriter`] and any number
/// of [`FifoReader`]s attach by borrowing the `Fifo`; at most one reader may
/// throttle the writer. The buffer is borrowed for the FIFO's lifetime and
/// no allocation happens on the data path.
///
/// If writes and reads always use the same frame count, and that count
/// divides the capacity, transfers never split across the wrap.
///
/// [`FifoWriter`]: crate::FifoWriter
/// [`FifoReader`]: crate::FifoReader
pub struct Fifo<'a> {
    arith: IndexArith,
    /// Size of each frame in bytes.
    frame_size: u32,
    /// First byte of the caller-allocated buffer of `frame_count` frames.
    buffer: NonNull<u8>,
    /// Whether reader and writer share one virtual address space. Always
    /// true for now; selects the private futex operations.
    is_private: bool,
    rear: IndexCell<'a>,
    /// Front index of the at most one reader that throttles the writer.
    throttle_front: Option<IndexCell<'a>>,
    _buffer: PhantomData<&'a mut [u8]>,
}

// SAFETY: Fifo may move between threads: the buffer pointer refers to
// caller-owned memory borrowed for 'a, and the index cells are atomics.
unsafe impl Send for Fifo<'_> {}

// SAFETY: Concurrent access through &Fifo is mediated by the index
// protocol: the atomic rear/front cells order all buffer access, and the
// endpoints are the only parties that touch buffer bytes.
unsafe impl Sync for Fifo<'_> {}

impl<'a> Fifo<'a> {
    /// Constructs a single-process FIFO with the index cells embedded.
    ///
    /// `throttles_writer` declares whether one reader will bound the writer
    /// by publishing its front index.
    ///
    /// # Panics
    ///
    /// Panics if `frame_count == 0`, `frame_size == 0`,
    /// `frame_count * frame_size > 2³¹ - 1`, or the buffer length is not
    /// exactly `frame_count * frame_size` bytes.
    #[must_use]
    pub fn new(
        frame_count: u32,
        frame_size: u32,
        buffer: &'a mut [u8],
        throttles_writer: bool,
    ) -> Self {
        let throttle_front = throttles_writer.then(|| IndexCell::Embedded(FifoIndex::new()));
        Self::build(
            frame_count,
            frame_size,
            buffer,
            IndexCell::Embedded(FifoIndex::new()),
            throttle_front,
        )
    }

    /// Constructs a multi-process FIFO around caller-supplied index cells.
    ///
    /// Exactly one peer must have zero-initialized each cell; the others
    /// bind to the existing bytes. Pass `throttle_front` when one reader
    /// throttles the writer.
    ///
    /// # Panics
    ///
    /// Same conditions as [`Fifo::new`].
    #[must_use]
    pub fn with_shared_indices(
        frame_count: u32,
        frame_size: u32,
        buffer: &'a mut [u8],
        shared_rear: &'a FifoIndex,
        throttle_front: Option<&'a FifoIndex>,
    ) -> Self {
        Self::build(
            frame_count,
            frame_size,
            buffer,
            IndexCell::Shared(shared_rear),
            throttle_front.map(IndexCell::Shared),
        )
    }

    fn build(
        frame_count: u32,
        frame_size: u32,
        buffer: &'a mut [u8],
        rear: IndexCell<'a>,
        throttle_front: Option<IndexCell<'a>>,
    ) -> Self {
        assert!(frame_count > 0, "frame count must be greater than 0");
        assert!(frame_size > 0, "frame size must be greater than 0");
        let bytes = u64::from(frame_count) * u64::from(frame_size);
        assert!(
            bytes <= i32::MAX as u64,
            "frame_count * frame_size must not exceed 2^31 - 1"
        );
        assert!(
            buffer.len() as u64 == bytes,
            "buffer length must equal frame_count * frame_size"
        );
        Self {
            arith: IndexArith::new(frame_count),
            frame_size,
            // SAFETY: slice pointers are never null.
            buffer: unsafe { NonNull::new_unchecked(buffer.as_mut_ptr()) },
            is_private: true,
            rear,
            throttle_front,
            _buffer: PhantomData,
        }
    }

    /// Capacity in frames.
    #[must_use]
    pub fn frame_count(&self) -> u32 {
        self.arith.frame_count
    }

    /// Size of each frame in bytes.
    #[must_use]
    pub fn frame_size(&self) -> u32 {
        self.frame_size
    }

    /// Whether a throttling front index is configured.
    #[must_use]
    pub fn throttles_writer(&self) -> bool {
        self.throttle_front.is_some()
    }

    pub(crate) fn arith(&self) -> &IndexArith {
        &self.arith
    }

    pub(crate) fn rear(&self) -> &FifoIndex {
        self.rear.get()
    }

    pub(crate) fn throttle_front(&self) -> Option<&FifoIndex> {
        self.throttle_front.as_ref().map(IndexCell::get)
    }

    pub(crate) fn is_private(&self) -> bool {
        self.is_private
    }

    /// Byte range covered by a fragment, as a raw pointer and length.
    ///
    /// The caller upholds the index protocol: the writer touches only slots
    /// between the throttling front and its rear, a reader only slots
    /// between its front and the rear.
    ///
    /// # Panics
    ///
    /// Panics if the fragment does not lie within the buffer.
    pub(crate) fn fragment_raw(&self, frag: &Iovec) -> (*mut u8, usize) {
        let frame_count = self.arith.frame_count;
        assert!(frag.offset < frame_count && frag.len <= frame_count - frag.offset);
        let frame_size = self.frame_size as usize;
        // SAFETY: the assert bounds the range inside the frame_count *
        // frame_size bytes the buffer was constructed with.
        let ptr = unsafe { self.buffer.as_ptr().add(frag.offset as usize * frame_size) };
        (ptr, frag.len as usize * frame_size)
    }
}
