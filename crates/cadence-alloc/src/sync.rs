//! Thread-safe bucketed stack allocator. Bucket heads are Treiber stacks
//! guarded by a tagged pointer to avoid ABA; the page cursor advances with
//! `fetch_add` and rollover is a CAS-guarded critical section. No global
//! lock is ever taken.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize, Ordering};

use crate::block::{write_free_block, TaggedPtr};
use crate::bucket::{bucket_index_for, bucket_size, fragment_gap, target_size};
use crate::page::{align_up, next_page_size, Page, PageHeader};

/// One page, owned by the allocator, with an atomic cursor so any number
/// of threads can race to carve from it.
struct AtomicPage {
    header: NonNull<PageHeader>,
    data_start: usize,
    data_end: usize,
    /// Offset of the next uncarved byte, relative to `data_start`.
    cursor: AtomicUsize,
}

/// Thread-safe variant of [`crate::BucketAllocator`]. Cheap to share via
/// `&SyncBucketAllocator` across worker threads; never blocks.
pub struct SyncBucketAllocator<const MIN_POW: u32 = 5, const MAX_POW: u32 = 12, const MAX_STACK_POW: u32 = 16> {
    buckets: Vec<AtomicU64>,
    /// Head of the intrusive page chain, CAS-guarded during rollover.
    current: AtomicPtr<AtomicPageBox>,
    base_page_size: usize,
}

/// Heap box holding an [`AtomicPage`] plus the link to the previous
/// current page, so the chain survives rollover races.
struct AtomicPageBox {
    page: AtomicPage,
    prev: Option<Box<AtomicPageBox>>,
}

impl<const MIN_POW: u32, const MAX_POW: u32, const MAX_STACK_POW: u32>
    SyncBucketAllocator<MIN_POW, MAX_POW, MAX_STACK_POW>
{
    const NUM_BUCKETS: usize = (MAX_POW - MIN_POW + 1) as usize;
    const MAX_ALLOC_SIZE: usize = 1usize << MAX_POW;
    const MAX_STACK_SIZE: usize = 1usize << MAX_STACK_POW;

    pub fn new() -> Self {
        Self::with_base_page_size(Self::MAX_ALLOC_SIZE * 4)
    }

    pub fn with_base_page_size(base_page_size: usize) -> Self {
        let mut buckets = Vec::with_capacity(Self::NUM_BUCKETS);
        buckets.resize_with(Self::NUM_BUCKETS, || AtomicU64::new(TaggedPtr::NULL.bits()));
        Self {
            buckets,
            current: AtomicPtr::new(std::ptr::null_mut()),
            base_page_size,
        }
    }

    pub fn allocate(&self, size: usize, alignment: usize) -> Option<NonNull<u8>> {
        if !alignment.is_power_of_two() {
            crate::abort_with("cadence-alloc: alignment must be a power of two");
        }
        let t = target_size(size, alignment);
        match bucket_index_for(t, MIN_POW, MAX_POW) {
            Some(idx) => self.allocate_bucketed(idx),
            None => crate::system_alloc(t, alignment),
        }
    }

    pub fn deallocate(&self, ptr: NonNull<u8>, size: usize, alignment: usize) {
        let t = target_size(size, alignment);
        match bucket_index_for(t, MIN_POW, MAX_POW) {
            Some(idx) => self.push_free(idx, ptr),
            None => unsafe { crate::system_dealloc(ptr, t, alignment) },
        }
    }

    /// Treiber-stack push with a tagged counter to defeat ABA.
    fn push_free(&self, idx: usize, ptr: NonNull<u8>) {
        let cell = &self.buckets[idx];
        let mut old_bits = cell.load(Ordering::Acquire);
        loop {
            let old = TaggedPtr::from_bits(old_bits);
            // SAFETY: `ptr` is a live block of this bucket's size, no
            // longer read by the caller; writing the intrusive link is
            // exclusive until the CAS below publishes it.
            let block = unsafe { write_free_block(ptr, old.ptr()) };
            let new = TaggedPtr::new(Some(block), old.next_tag());
            match cell.compare_exchange_weak(
                old_bits,
                new.bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => old_bits = actual,
            }
        }
    }

    /// Treiber-stack pop.
    fn pop_free(&self, idx: usize) -> Option<NonNull<u8>> {
        let cell = &self.buckets[idx];
        let mut old_bits = cell.load(Ordering::Acquire);
        loop {
            let old = TaggedPtr::from_bits(old_bits);
            let head = old.ptr()?;
            // SAFETY: the block is still linked into the free list, so no
            // other thread has handed it out; reading `next` to compute
            // the replacement head is sound.
            let next = unsafe { head.as_ref().next };
            let new = TaggedPtr::new(next, old.next_tag());
            match cell.compare_exchange_weak(
                old_bits,
                new.bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(head.cast()),
                Err(actual) => old_bits = actual,
            }
        }
    }

    fn allocate_bucketed(&self, idx: usize) -> Option<NonNull<u8>> {
        if let Some(p) = self.pop_free(idx) {
            return Some(p);
        }
        self.carve(idx)
    }

    fn carve(&self, idx: usize) -> Option<NonNull<u8>> {
        let block_size = bucket_size(idx as u32 + MIN_POW);
        loop {
            let page_ptr = self.current.load(Ordering::Acquire);
            let page_box = match unsafe { page_ptr.as_ref() } {
                Some(p) => p,
                None => {
                    self.grow(block_size, page_ptr)?;
                    continue;
                }
            };
            let page = &page_box.page;
            let size = page.data_end - page.data_start;
            loop {
                let cur = page.cursor.load(Ordering::Relaxed);
                let aligned = align_up(page.data_start + cur, block_size) - page.data_start;
                let gap = aligned - cur;
                let needed = gap + block_size;
                if cur + needed > size {
                    // Not enough room left; fragment the tail once and
                    // roll to a new page.
                    let took = page
                        .cursor
                        .compare_exchange(cur, size, Ordering::AcqRel, Ordering::Relaxed);
                    if took.is_ok() {
                        let remaining = size - cur;
                        if remaining > 0 {
                            self.fragment_range((page.data_start + cur) as *mut u8, remaining);
                        }
                    }
                    break;
                }
                match page.cursor.compare_exchange_weak(
                    cur,
                    aligned + block_size,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        if gap > 0 {
                            self.fragment_range((page.data_start + cur) as *mut u8, gap);
                        }
                        return NonNull::new((page.data_start + aligned) as *mut u8);
                    }
                    Err(_) => continue,
                }
            }
            self.grow(block_size, page_ptr)?;
        }
    }

    fn fragment_range(&self, start: *mut u8, len: usize) {
        for (offset, pow) in fragment_gap(len, MIN_POW, MAX_POW) {
            let ptr = unsafe { NonNull::new_unchecked(start.add(offset)) };
            let idx = (pow - MIN_POW) as usize;
            self.push_free(idx, ptr);
        }
    }

    /// CAS-guarded page rollover: only the thread that wins the CAS
    /// allocates a new page; losers retry against whatever the winner
    /// installed.
    fn grow(&self, requested: usize, observed: *mut AtomicPageBox) -> Option<()> {
        if self.current.load(Ordering::Acquire) != observed {
            return Some(()); // someone else already rolled over
        }
        let prev_size = unsafe { observed.as_ref() }
            .map(|p| p.page.data_end - p.page.data_start)
            .unwrap_or(0);
        let size = next_page_size(prev_size, requested, self.base_page_size, Self::MAX_STACK_SIZE);
        let page = Page::new(size, Self::MAX_ALLOC_SIZE)?;
        // SAFETY: freshly allocated, exclusively held until installed.
        unsafe {
            (*page.header.as_ptr()).next = None;
        }
        let data_start = page.data_start.as_ptr() as usize;
        let data_end = page.data_end.as_ptr() as usize;
        let new_box = Box::new(AtomicPageBox {
            page: AtomicPage {
                header: page.header,
                data_start,
                data_end,
                cursor: AtomicUsize::new(0),
            },
            prev: None,
        });
        let new_ptr = Box::into_raw(new_box);
        match self.current.compare_exchange(
            observed,
            new_ptr,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                // Link the dethroned page into the new page's `prev`
                // chain so Drop can still find and free it.
                if !observed.is_null() {
                    // SAFETY: `observed` was the current page and is no
                    // longer reachable for carving once the CAS above
                    // succeeds; reclaiming it into `prev` is sound because
                    // no allocate() call can start carving from it after
                    // this point (carve() re-reads `self.current`).
                    unsafe {
                        let dethroned = Box::from_raw(observed);
                        (*new_ptr).prev = Some(dethroned);
                    }
                }
                Some(())
            }
            Err(_) => {
                // Lost the race: drop our unused page immediately.
                unsafe {
                    let unused = Box::from_raw(new_ptr);
                    Page::dealloc_chain(Some(unused.page.header), Self::MAX_ALLOC_SIZE);
                }
                Some(())
            }
        }
    }
}

impl<const MIN_POW: u32, const MAX_POW: u32, const MAX_STACK_POW: u32> Default
    for SyncBucketAllocator<MIN_POW, MAX_POW, MAX_STACK_POW>
{
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: all mutation goes through atomics (bucket heads, page cursor) or
// a CAS-guarded rollover; no thread ever observes a partially-written page
// or free-list node.
unsafe impl<const MIN_POW: u32, const MAX_POW: u32, const MAX_STACK_POW: u32> Send
    for SyncBucketAllocator<MIN_POW, MAX_POW, MAX_STACK_POW>
{
}
unsafe impl<const MIN_POW: u32, const MAX_POW: u32, const MAX_STACK_POW: u32> Sync
    for SyncBucketAllocator<MIN_POW, MAX_POW, MAX_STACK_POW>
{
}

impl<const MIN_POW: u32, const MAX_POW: u32, const MAX_STACK_POW: u32> Drop
    for SyncBucketAllocator<MIN_POW, MAX_POW, MAX_STACK_POW>
{
    fn drop(&mut self) {
        let mut head = self.current.load(Ordering::Acquire);
        while !head.is_null() {
            // SAFETY: `&mut self` means no other thread holds a reference
            // to this allocator anymore.
            let boxed = unsafe { Box::from_raw(head) };
            unsafe {
                Page::dealloc_chain(Some(boxed.page.header), Self::MAX_ALLOC_SIZE);
            }
            head = boxed
                .prev
                .map(|p| Box::into_raw(p))
                .unwrap_or(std::ptr::null_mut());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn allocates_aligned_blocks() {
        let a = SyncBucketAllocator::<5, 12, 16>::new();
        let p = a.allocate(100, 16).unwrap();
        assert_eq!(p.as_ptr() as usize % 16, 0);
        a.deallocate(p, 100, 16);
    }

    #[test]
    fn concurrent_alloc_dealloc_no_overlap() {
        let alloc = Arc::new(SyncBucketAllocator::<5, 10, 14>::new());
        let threads = 8;
        let iters = 2000;
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let alloc = alloc.clone();
                thread::spawn(move || {
                    for i in 0..iters {
                        let pattern = (t * iters + i) as u8;
                        let p = alloc.allocate(64, 8).unwrap();
                        unsafe {
                            std::ptr::write_bytes(p.as_ptr(), pattern, 64);
                            for b in 0..64 {
                                assert_eq!(*p.as_ptr().add(b), pattern);
                            }
                        }
                        alloc.deallocate(p, 64, 8);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}
