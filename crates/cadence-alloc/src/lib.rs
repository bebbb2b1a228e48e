//! Bucketed stack allocator: a page-backed stack with power-of-two
//! retention buckets. Thread-local ([`BucketAllocator`]) and thread-safe
//! ([`SyncBucketAllocator`]) variants share the same carving/fragmentation
//! policy described in spec §4.A.
//!
//! Allocation never fails gracefully beyond `None`/abort: a system
//! allocation failure aborts the process (spec §7), matching the rest of
//! the core's "no exception ever escapes" contract.

mod block;
mod bucket;
mod debug;
mod local;
mod page;
mod static_alloc;
mod sync;

pub use debug::CheckedAllocator;
pub use local::BucketAllocator;
pub use static_alloc::StaticAllocator;
pub use sync::SyncBucketAllocator;

use std::alloc::{alloc, dealloc, Layout};
use std::ptr::NonNull;

/// Logs `msg` and aborts the process. The single abort-with-message
/// primitive for every precondition violation in this crate (spec §7:
/// "a single abort-with-message primitive", never stack-unwound error
/// propagation out of allocator internals).
#[track_caller]
pub(crate) fn abort_with(msg: &str) -> ! {
    tracing::error!(location = %std::panic::Location::caller(), "{msg}");
    std::process::abort()
}

/// Oversized allocations (`> 2^MaxSizePow`) fall back to a page-aligned,
/// unretained system allocation.
pub(crate) fn system_alloc(size: usize, alignment: usize) -> Option<NonNull<u8>> {
    let layout = Layout::from_size_align(size, alignment).ok()?;
    // SAFETY: layout is validated non-zero and alignment-checked above.
    let raw = unsafe { alloc(layout) };
    NonNull::new(raw)
}

/// # Safety
/// `ptr` must have been returned by [`system_alloc`] with the same
/// `(size, alignment)` pair (or a pair yielding the same `Layout`).
pub(crate) unsafe fn system_dealloc(ptr: NonNull<u8>, size: usize, alignment: usize) {
    if let Ok(layout) = Layout::from_size_align(size, alignment) {
        dealloc(ptr.as_ptr(), layout);
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn allocate_returns_aligned_pointers(
            size in 1usize..8192,
            align_pow in 0u32..7,
        ) {
            let alignment = 1usize << align_pow;
            let mut a = BucketAllocator::<5, 12, 16>::new();
            let p = a.allocate(size, alignment).unwrap();
            prop_assert_eq!(p.as_ptr() as usize % alignment, 0);
            a.deallocate(p, size, alignment);
        }
    }
}
