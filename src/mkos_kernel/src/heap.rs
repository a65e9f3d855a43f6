//! Fixed-arena memory allocator
//!
//! The arena is a single byte array. Every block, free or allocated, starts
//! with a header holding the block size and a "next free block" link; the
//! free blocks form a singly linked list sorted by address. Allocation is
//! first-fit with splitting, and deallocation coalesces the released block
//! with its immediate neighbors.
//!
//! Since both neighbors are examined on every [`Heap::free`], the free list
//! never contains two address-adjacent blocks.
use core::{
    fmt,
    mem::size_of,
    num::NonZeroUsize,
    sync::atomic::{AtomicU32, Ordering},
};

use crate::cfg;

/// The alignment of block boundaries and of the returned allocations.
pub const ALIGN: usize = 8;

/// The size of the header embedded at the start of every block.
pub const HEADER_SIZE: usize = size_of::<usize>() * 2;

const _: () = assert!(HEADER_SIZE % ALIGN == 0);

/// The value of a header's link field marking the end of the free list (or an
/// allocated block).
const NIL: usize = usize::MAX;

/// The source of [`Heap`] identities.
static NEXT_HEAP_ID: AtomicU32 = AtomicU32::new(0);

/// Refers to an allocation made by a [`Heap`].
///
/// This is the offset of the allocation's first usable byte within the arena,
/// tagged with the identity of the heap that produced it. Other heaps reject
/// it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapPtr {
    heap_id: u32,
    offset: NonZeroUsize,
}

impl HeapPtr {
    /// Get the offset of the allocation within the arena.
    #[inline]
    pub fn offset(self) -> usize {
        self.offset.get()
    }

    #[inline]
    fn block(self) -> usize {
        self.offset.get() - HEADER_SIZE
    }
}

impl fmt::Debug for HeapPtr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "HeapPtr({}:{:#x})", self.heap_id, self.offset)
    }
}

/// A first-fit allocator over a fixed byte arena.
///
/// Each call is serialized by an allocator-wide lock. A sequence of calls is
/// not atomic as a whole.
pub struct Heap {
    id: u32,
    inner: spin::Mutex<HeapInner>,
}

struct HeapInner {
    arena: Box<[u8]>,
    /// The offset of the first free block, or `NIL`.
    free_head: usize,
    free_bytes: usize,
}

impl Default for Heap {
    /// Construct a heap of [`cfg::HEAP_SIZE`] bytes.
    fn default() -> Self {
        Self::new(cfg::HEAP_SIZE)
    }
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Heap")
            .field("id", &self.id)
            .field("total_size", &self.total_size())
            .field("free_heap_size", &self.free_heap_size())
            .field("free_block_count", &self.free_block_count())
            .finish()
    }
}

impl Heap {
    /// Construct a heap managing an arena of `len` bytes. `len` is rounded
    /// down to a multiple of [`ALIGN`].
    ///
    /// An arena too small to hold a single header has no free blocks at all.
    pub fn new(len: usize) -> Self {
        let len = len & !(ALIGN - 1);
        let mut inner = HeapInner {
            arena: vec![0u8; len].into_boxed_slice(),
            free_head: NIL,
            free_bytes: 0,
        };
        if len > HEADER_SIZE {
            inner.set_size(0, len);
            inner.set_next(0, NIL);
            inner.free_head = 0;
            inner.free_bytes = len;
        }
        Self {
            id: NEXT_HEAP_ID.fetch_add(1, Ordering::Relaxed),
            inner: spin::Mutex::new(inner),
        }
    }

    /// Get the block of `ptr` if `ptr` was produced by this heap.
    #[inline]
    fn own_block(&self, ptr: HeapPtr) -> Option<usize> {
        (ptr.heap_id == self.id).then(|| ptr.block())
    }

    /// Get the arena size in bytes.
    pub fn total_size(&self) -> usize {
        self.inner.lock().arena.len()
    }

    /// Allocate a block with at least `size` usable bytes.
    ///
    /// Returns `None` if `size` is zero or if no free block is large enough.
    pub fn allocate(&self, size: usize) -> Option<HeapPtr> {
        if size == 0 {
            return None;
        }
        let size = size.checked_add(HEADER_SIZE + ALIGN - 1)? & !(ALIGN - 1);

        let mut inner = self.inner.lock();
        let ptr = inner.allocate(size).map(|offset| HeapPtr {
            heap_id: self.id,
            offset,
        });
        match ptr {
            Some(ptr) => log::trace!(
                "allocate({size}) = {ptr:?}, {} bytes free",
                inner.free_bytes
            ),
            None => log::trace!("allocate({size}) failed"),
        }
        ptr
    }

    /// Return a block to the heap.
    ///
    /// A pointer that doesn't refer to a live allocation of this heap (e.g.,
    /// one that was already freed) is ignored.
    pub fn free(&self, ptr: HeapPtr) {
        let mut inner = self.inner.lock();
        let freed = self
            .own_block(ptr)
            .map_or(false, |block| inner.free(block));
        if freed {
            log::trace!("free({ptr:?}), {} bytes free", inner.free_bytes);
        } else {
            log::warn!("free({ptr:?}): not a live allocation of this heap; ignored");
        }
    }

    /// Get the number of bytes in free blocks, headers included.
    pub fn free_heap_size(&self) -> usize {
        self.inner.lock().free_bytes
    }

    /// Get the number of blocks in the free list.
    pub fn free_block_count(&self) -> usize {
        self.inner.lock().free_blocks().count()
    }

    /// Get the size of the largest free block, headers included.
    pub fn largest_free_block(&self) -> usize {
        let inner = self.inner.lock();
        inner
            .free_blocks()
            .map(|(_, size)| size)
            .max()
            .unwrap_or(0)
    }

    /// Get the number of usable bytes of an allocation. This may exceed the
    /// requested size.
    pub fn usable_size(&self, ptr: HeapPtr) -> Option<usize> {
        let block = self.own_block(ptr)?;
        let inner = self.inner.lock();
        inner
            .allocated_block_size(block)
            .map(|size| size - HEADER_SIZE)
    }

    /// Call `f` with the usable bytes of an allocation.
    ///
    /// The heap lock is held while `f` runs, so `f` must not call back into
    /// this heap.
    pub fn with_bytes<R>(&self, ptr: HeapPtr, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        let block = self.own_block(ptr)?;
        let inner = self.inner.lock();
        let size = inner.allocated_block_size(block)?;
        Some(f(&inner.arena[ptr.offset()..block + size]))
    }

    /// Call `f` with the usable bytes of an allocation, mutably.
    ///
    /// The heap lock is held while `f` runs, so `f` must not call back into
    /// this heap.
    pub fn with_bytes_mut<R>(
        &self,
        ptr: HeapPtr,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Option<R> {
        let block = self.own_block(ptr)?;
        let mut inner = self.inner.lock();
        let size = inner.allocated_block_size(block)?;
        Some(f(&mut inner.arena[ptr.offset()..block + size]))
    }

    #[cfg(test)]
    fn free_block_list(&self) -> Vec<(usize, usize)> {
        self.inner.lock().free_blocks().collect()
    }
}

impl HeapInner {
    #[inline]
    fn read_word(&self, at: usize) -> usize {
        let mut bytes = [0u8; size_of::<usize>()];
        bytes.copy_from_slice(&self.arena[at..at + size_of::<usize>()]);
        usize::from_ne_bytes(bytes)
    }

    #[inline]
    fn write_word(&mut self, at: usize, value: usize) {
        self.arena[at..at + size_of::<usize>()].copy_from_slice(&value.to_ne_bytes());
    }

    #[inline]
    fn next(&self, block: usize) -> usize {
        self.read_word(block)
    }

    #[inline]
    fn set_next(&mut self, block: usize, next: usize) {
        self.write_word(block, next);
    }

    #[inline]
    fn size(&self, block: usize) -> usize {
        self.read_word(block + size_of::<usize>())
    }

    #[inline]
    fn set_size(&mut self, block: usize, size: usize) {
        self.write_word(block + size_of::<usize>(), size);
    }

    /// Iterate over the free blocks as `(offset, size)` pairs in address
    /// order.
    fn free_blocks(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let mut cur = self.free_head;
        core::iter::from_fn(move || {
            if cur == NIL {
                None
            } else {
                let block = cur;
                cur = self.next(block);
                Some((block, self.size(block)))
            }
        })
    }

    /// `size` includes the header and is a multiple of `ALIGN`. Returns the
    /// offset of the usable bytes.
    fn allocate(&mut self, size: usize) -> Option<NonZeroUsize> {
        let mut prev = NIL;
        let mut cur = self.free_head;

        while cur != NIL {
            let block_size = self.size(cur);
            if block_size >= size {
                let next = self.next(cur);

                // Split off the remainder if it's large enough to be useful
                let replacement = if block_size > size + HEADER_SIZE * 2 {
                    let rest = cur + size;
                    self.set_size(rest, block_size - size);
                    self.set_next(rest, next);
                    self.set_size(cur, size);
                    rest
                } else {
                    next
                };

                self.link_after(prev, replacement);
                self.set_next(cur, NIL);
                self.free_bytes -= self.size(cur);

                return NonZeroUsize::new(cur + HEADER_SIZE);
            }
            prev = cur;
            cur = self.next(cur);
        }

        None
    }

    /// Make `block` follow `prev` in the free list, or become its head if
    /// `prev` is `NIL`.
    #[inline]
    fn link_after(&mut self, prev: usize, block: usize) {
        if prev == NIL {
            self.free_head = block;
        } else {
            self.set_next(prev, block);
        }
    }

    /// Get the size of the allocated block at `block` if `block` looks like
    /// one. This can't detect every bogus offset, but it rejects anything
    /// that would corrupt the free list.
    fn allocated_block_size(&self, block: usize) -> Option<usize> {
        let len = self.arena.len();
        if block % ALIGN != 0 || block + HEADER_SIZE > len {
            return None;
        }
        let size = self.size(block);
        if self.next(block) != NIL
            || size < HEADER_SIZE
            || size % ALIGN != 0
            || size > len - block
        {
            return None;
        }
        // Must not overlap a free block
        let overlaps_free = self
            .free_blocks()
            .any(|(free, free_size)| free < block + size && block < free + free_size);
        (!overlaps_free).then_some(size)
    }

    /// Returns `false` if `block` is not a live allocation.
    fn free(&mut self, block: usize) -> bool {
        let Some(size) = self.allocated_block_size(block) else {
            return false;
        };

        // Find the insertion point that keeps the list sorted by address
        let mut prev = NIL;
        let mut cur = self.free_head;
        while cur != NIL && cur < block {
            prev = cur;
            cur = self.next(cur);
        }

        self.set_next(block, cur);
        self.link_after(prev, block);
        self.free_bytes += size;

        // Coalesce with the right neighbor
        if cur != NIL && block + size == cur {
            let merged = size + self.size(cur);
            self.set_size(block, merged);
            self.set_next(block, self.next(cur));
        }

        // Coalesce with the left neighbor
        if prev != NIL && prev + self.size(prev) == block {
            let merged = self.size(prev) + self.size(block);
            self.set_size(prev, merged);
            self.set_next(prev, self.next(block));
        }

        true
    }
}
