//! Intrusive free-block header and the tagged-pointer encoding used to
//! guard the thread-safe bucket heads against ABA.

use std::ptr::NonNull;

/// A freed block carries nothing but the intrusive `next` link; the block's
/// own storage is reused to hold it.
#[repr(C)]
pub struct FreeBlock {
    pub next: Option<NonNull<FreeBlock>>,
}

/// Packs a `NonNull<FreeBlock>` and a 16-bit generation tag into a single
/// `u64`, assuming a 64-bit target with a canonical (<= 48-bit) address
/// space — true for the x86_64 and aarch64 targets this allocator ships
/// on. The tag occupies the high 16 bits and is bumped on every pop/push so
/// a reader that raced a pop-then-push-of-the-same-address sees a distinct
/// tagged value and retries instead of corrupting the stack.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TaggedPtr(u64);

const PTR_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

impl TaggedPtr {
    pub const NULL: TaggedPtr = TaggedPtr(0);

    pub fn new(ptr: Option<NonNull<FreeBlock>>, tag: u16) -> Self {
        let addr = ptr.map_or(0, |p| p.as_ptr() as u64 & PTR_MASK);
        TaggedPtr(addr | ((tag as u64) << 48))
    }

    pub fn ptr(self) -> Option<NonNull<FreeBlock>> {
        let addr = self.0 & PTR_MASK;
        NonNull::new(addr as *mut FreeBlock)
    }

    pub fn tag(self) -> u16 {
        (self.0 >> 48) as u16
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    pub fn from_bits(bits: u64) -> Self {
        TaggedPtr(bits)
    }

    pub fn next_tag(self) -> u16 {
        self.tag().wrapping_add(1)
    }
}

/// Writes `FreeBlock { next }` into `ptr` and returns it as a `NonNull`.
///
/// # Safety
/// `ptr` must point to at least `size_of::<FreeBlock>()` writable, properly
/// aligned bytes that the caller no longer reads as live data.
pub unsafe fn write_free_block(
    ptr: NonNull<u8>,
    next: Option<NonNull<FreeBlock>>,
) -> NonNull<FreeBlock> {
    let block = ptr.as_ptr().cast::<FreeBlock>();
    block.write(FreeBlock { next });
    NonNull::new_unchecked(block)
}
