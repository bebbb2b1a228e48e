//! Stack pages: large contiguous regions carved into blocks until
//! exhausted, each carrying an intrusive header giving its size and a link
//! to the next owned page.

use std::alloc::{alloc, dealloc, Layout};
use std::ptr::NonNull;

/// Header written at the top of every page this allocator owns.
pub struct PageHeader {
    pub size: usize,
    pub next: Option<NonNull<PageHeader>>,
}

const HEADER_SIZE: usize = std::mem::size_of::<PageHeader>();
const HEADER_ALIGN: usize = std::mem::align_of::<PageHeader>();

/// Pages are always allocated at `max_block_align` alignment (the
/// allocator's largest bucket size) so that, after skipping the header, the
/// cursor can be aligned up to any bucket boundary while staying inside the
/// page. `max_block_align` is recorded in the header so `dealloc_chain` can
/// reconstruct the same `Layout`.
fn page_layout(size: usize, max_block_align: usize) -> Option<Layout> {
    let total = size.checked_add(HEADER_SIZE)?;
    Layout::from_size_align(total, HEADER_ALIGN.max(max_block_align)).ok()
}

/// A page is the header followed immediately by `size` usable bytes,
/// carved front-to-back by the owning allocator's cursor. Pages chain
/// together solely through `PageHeader::next` (an intrusive list); no
/// separate ownership record is kept.
pub struct Page {
    pub header: NonNull<PageHeader>,
    /// First usable byte after the header.
    pub data_start: NonNull<u8>,
    /// One past the last usable byte.
    pub data_end: NonNull<u8>,
}

impl Page {
    /// Allocates a new page with `size` usable bytes from the system
    /// allocator, big enough to hold the header plus usable space, aligned
    /// to `max_block_align`.
    pub fn new(size: usize, max_block_align: usize) -> Option<Page> {
        let layout = page_layout(size, max_block_align)?;
        // SAFETY: layout is non-zero-sized and validated above.
        let raw = unsafe { alloc(layout) };
        let raw = NonNull::new(raw)?;
        let header_ptr = raw.cast::<PageHeader>();
        // SAFETY: `raw` is freshly allocated with room for the header.
        unsafe {
            header_ptr.as_ptr().write(PageHeader { size, next: None });
        }
        let data_start = unsafe { NonNull::new_unchecked(raw.as_ptr().add(HEADER_SIZE)) };
        let data_end = unsafe { NonNull::new_unchecked(data_start.as_ptr().add(size)) };
        Some(Page {
            header: header_ptr,
            data_start,
            data_end,
        })
    }

    /// Frees `header` and every page reachable through its intrusive
    /// `next` chain, all of which must have been created with the same
    /// `max_block_align`.
    ///
    /// # Safety
    /// Every page in the chain must have been produced by [`Page::new`],
    /// still own its backing allocation, and hold no outstanding
    /// references to blocks carved from it.
    pub unsafe fn dealloc_chain(mut header: Option<NonNull<PageHeader>>, max_block_align: usize) {
        while let Some(h) = header {
            let size = h.as_ref().size;
            let next = h.as_ref().next;
            if let Some(layout) = page_layout(size, max_block_align) {
                dealloc(h.as_ptr().cast(), layout);
            }
            header = next;
        }
    }
}

/// Computes the next page's size given the previous page's size and the
/// carve request that triggered rollover, per spec §4.A step 4:
/// `max(16*t, page_size)` capped at `MAX_STACK_SIZE`; if the previous page
/// already sat at the cap, the next one doubles (also capped).
pub fn next_page_size(prev_size: usize, requested: usize, base_page_size: usize, max_stack_size: usize) -> usize {
    if prev_size >= max_stack_size {
        return (prev_size.saturating_mul(2)).min(max_stack_size).max(base_page_size);
    }
    (16usize.saturating_mul(requested))
        .max(base_page_size)
        .min(max_stack_size)
}

/// Rounds `addr` up to the next multiple of `align` (`align` must be a
/// power of two).
pub fn align_up(addr: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (addr + align - 1) & !(align - 1)
}
