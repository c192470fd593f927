//! Two-layer scratch allocator for per-frame GPU staging (§4.3).
//!
//! A [`ScratchBufferPool`] holds a [`LockFreeList`] of [`ScratchAllocator`]s, each
//! owning one fixed-size GPU buffer and a [`BucketAllocator`] tracking free pages
//! as a bitmask. An allocated run of pages becomes a [`ScratchPage`] carrying a
//! [`LinearAllocator`] over its own bytes; dropping the page returns its pages to
//! the bucket allocator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::foundation::bitarray::span_mask;
use crate::foundation::collections::LockFreeList;

/// Size of one scratch page, in bytes (1 MiB).
pub const PAGE_SIZE: u64 = 1 << 20;
/// Number of pages in one scratch buffer (64).
pub const PAGE_COUNT: u32 = 64;
/// Total size of one scratch buffer, in bytes (64 MiB).
pub const BUFFER_SIZE: u64 = PAGE_COUNT as u64 * PAGE_SIZE;

/// Identifies the memory kind a scratch allocator's buffer was created for.
///
/// The concrete GPU memory-type enumeration belongs to the device collaborator;
/// this is the backend-neutral key the pool probes allocators with.
pub type MemoryKind = u32;

/// Wait-free bitmask allocator for fixed-size slots.
///
/// `alloc(n)` scans for `n` consecutive free bits using a trailing-zero-count
/// loop and retries under a single compare-exchange on contention; there is no
/// locking. `free` clears the corresponding bits with a fetch-or.
pub struct BucketAllocator {
    free_mask: AtomicU64,
    capacity: u32,
}

impl BucketAllocator {
    /// Creates an allocator with every slot in `[0, capacity)` free.
    pub fn new(capacity: u32) -> Self {
        assert!(capacity <= 64, "bucket allocator capacity limited to 64 slots");
        let free_mask = if capacity == 64 { u64::MAX } else { (1u64 << capacity) - 1 };
        Self {
            free_mask: AtomicU64::new(free_mask),
            capacity,
        }
    }

    /// Tries to allocate `count` consecutive slots, returning the starting index.
    pub fn alloc(&self, count: u32) -> Option<u32> {
        if count == 0 || count > self.capacity {
            return None;
        }

        let mut old_mask = self.free_mask.load(Ordering::Acquire);
        loop {
            let mut index = 0u32;
            loop {
                if index + count > self.capacity {
                    return None;
                }
                let shifted = old_mask >> index;
                let free_count = (!shifted).trailing_zeros();
                if free_count >= count {
                    break;
                }
                let used_count = (shifted >> free_count).trailing_zeros();
                index += free_count + used_count;
            }

            let new_mask = old_mask & !span_mask(index, count);
            match self.free_mask.compare_exchange_weak(
                old_mask,
                new_mask,
                Ordering::Release,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(index),
                Err(observed) => old_mask = observed,
            }
        }
    }

    /// Returns `count` slots starting at `index` to the free pool.
    pub fn free(&self, index: u32, count: u32) {
        self.free_mask.fetch_or(span_mask(index, count), Ordering::Release);
    }

    /// Returns the raw free mask, for tests and diagnostics.
    pub fn free_mask(&self) -> u64 {
        self.free_mask.load(Ordering::Acquire)
    }
}

/// Simple bump allocator supporting aligned allocations over a fixed capacity.
pub struct LinearAllocator {
    capacity: u64,
    offset: u64,
}

impl LinearAllocator {
    /// Creates an allocator with the given byte capacity.
    pub fn new(capacity: u64) -> Self {
        Self { capacity, offset: 0 }
    }

    /// Returns the allocator's total capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Tries to allocate `size` bytes aligned to `alignment`, returning the offset.
    pub fn alloc(&mut self, size: u64, alignment: u64) -> Option<u64> {
        let offset = align_up(self.offset, alignment);
        if offset + size > self.capacity {
            return None;
        }
        self.offset = offset + size;
        Some(offset)
    }

    /// Resets the allocator to empty without touching its backing storage.
    pub fn reset(&mut self) {
        self.offset = 0;
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return value;
    }
    (value + alignment - 1) & !(alignment - 1)
}

/// A contiguous slice allocated out of a [`ScratchPage`].
#[derive(Debug, Clone, Copy)]
pub struct ScratchRange {
    /// Byte offset of the allocation within the page's own buffer.
    pub offset: u64,
    /// Size of the allocation in bytes.
    pub size: u64,
}

/// A GPU buffer of fixed total size, owning a bucket allocator over its pages.
pub struct ScratchAllocator {
    memory_kind: MemoryKind,
    bucket: BucketAllocator,
}

impl ScratchAllocator {
    fn new(memory_kind: MemoryKind) -> Self {
        Self {
            memory_kind,
            bucket: BucketAllocator::new(PAGE_COUNT),
        }
    }

    /// The memory kind this allocator's buffer was created for.
    pub fn memory_kind(&self) -> MemoryKind {
        self.memory_kind
    }

    /// Allocates a run of `page_count` pages, wrapping them in a [`ScratchPage`].
    ///
    /// The returned page borrows `self` strongly (via `Arc`) so the parent buffer
    /// always outlives every page allocated from it.
    pub fn alloc_pages(self: &Arc<Self>, page_count: u32) -> Option<ScratchPage> {
        let page_index = self.bucket.alloc(page_count)?;
        Some(ScratchPage {
            parent: Arc::clone(self),
            page_index,
            page_count,
            allocator: LinearAllocator::new(page_count as u64 * PAGE_SIZE),
        })
    }

    fn free_pages(&self, page_index: u32, page_count: u32) {
        self.bucket.free(page_index, page_count);
    }
}

/// An RAII sub-allocation of one or more scratch pages, auto-freed on drop.
///
/// Carries its own [`LinearAllocator`] so callers can bump-allocate within the
/// page without touching the parent's bucket allocator per request.
pub struct ScratchPage {
    parent: Arc<ScratchAllocator>,
    page_index: u32,
    page_count: u32,
    allocator: LinearAllocator,
}

impl ScratchPage {
    /// Allocates `size` bytes aligned to `alignment` from this page.
    pub fn alloc(&mut self, size: u64, alignment: u64) -> Option<ScratchRange> {
        let offset = self.allocator.alloc(size, alignment)?;
        Some(ScratchRange { offset, size })
    }

    /// The zero-based index of this page's first backing page in the parent buffer.
    pub fn page_index(&self) -> u32 {
        self.page_index
    }

    /// The number of backing pages this allocation spans.
    pub fn page_count(&self) -> u32 {
        self.page_count
    }
}

impl Drop for ScratchPage {
    fn drop(&mut self) {
        self.parent.free_pages(self.page_index, self.page_count);
    }
}

/// Generic pool of scratch buffers, growing a new one when no existing
/// allocator of the requested memory kind has room.
pub struct ScratchBufferPool {
    mutex: Mutex<()>,
    buffers: LockFreeList<ScratchAllocator>,
}

impl Default for ScratchBufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ScratchBufferPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            mutex: Mutex::new(()),
            buffers: LockFreeList::new(),
        }
    }

    /// Allocates `page_count` pages of the requested `memory_kind`.
    ///
    /// First probes existing buffers lock-free; if none has room, retries under
    /// a mutex and, if still short, inserts a fresh buffer into the list.
    pub fn alloc_pages(&self, memory_kind: MemoryKind, page_count: u32) -> ScratchPage {
        if let Some(page) = self.try_alloc_pages(memory_kind, page_count) {
            return page;
        }

        let _guard = self.mutex.lock().expect("scratch pool poisoned");
        if let Some(page) = self.try_alloc_pages(memory_kind, page_count) {
            return page;
        }

        let fresh = self.buffers.insert(ScratchAllocator::new(memory_kind));
        fresh
            .alloc_pages(page_count)
            .expect("freshly created scratch buffer must satisfy its own page request")
    }

    fn try_alloc_pages(&self, memory_kind: MemoryKind, page_count: u32) -> Option<ScratchPage> {
        for allocator in self.buffers.snapshot().iter() {
            if allocator.memory_kind() != memory_kind {
                continue;
            }
            if let Some(page) = allocator.alloc_pages(page_count) {
                return Some(page);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_alloc_and_free_restores_mask() {
        let bucket = BucketAllocator::new(8);
        let full_mask = bucket.free_mask();
        let a = bucket.alloc(3).unwrap();
        bucket.free(a, 3);
        assert_eq!(bucket.free_mask(), full_mask);
    }

    #[test]
    fn bucket_alloc_skips_used_runs() {
        let bucket = BucketAllocator::new(8);
        let first = bucket.alloc(4).unwrap();
        assert_eq!(first, 0);
        let second = bucket.alloc(4).unwrap();
        assert_eq!(second, 4);
        assert!(bucket.alloc(1).is_none());
    }

    #[test]
    fn bucket_alloc_never_overlaps_under_concurrency() {
        use std::thread;
        let bucket = Arc::new(BucketAllocator::new(64));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let bucket = Arc::clone(&bucket);
                thread::spawn(move || bucket.alloc(4))
            })
            .collect();
        let mut ranges: Vec<u32> = handles.into_iter().filter_map(|h| h.join().unwrap()).collect();
        ranges.sort_unstable();
        for pair in ranges.windows(2) {
            assert!(pair[1] >= pair[0] + 4, "allocations overlapped: {:?}", pair);
        }
    }

    #[test]
    fn linear_allocator_respects_alignment() {
        let mut linear = LinearAllocator::new(64);
        let a = linear.alloc(3, 1).unwrap();
        assert_eq!(a, 0);
        let b = linear.alloc(5, 8).unwrap();
        assert_eq!(b, 8);
    }

    #[test]
    fn scratch_page_returns_pages_on_drop() {
        let pool = ScratchBufferPool::new();
        {
            let _page = pool.alloc_pages(0, PAGE_COUNT);
        }
        // The page count was fully released, so a second full-buffer
        // allocation must reuse the same underlying buffer.
        let page = pool.alloc_pages(0, PAGE_COUNT);
        assert_eq!(page.page_index(), 0);
    }

    #[test]
    fn scratch_pool_grows_when_buffer_is_exhausted() {
        let pool = ScratchBufferPool::new();
        let _first = pool.alloc_pages(0, PAGE_COUNT);
        let second = pool.alloc_pages(0, 1);
        assert_eq!(second.page_count(), 1);
    }
}
