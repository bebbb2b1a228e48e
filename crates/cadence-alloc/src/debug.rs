//! Debug wrapper that validates and logs allocator activity. Gated behind
//! the `alloc-debug` feature so release builds pay nothing for it.

use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::Mutex;

use crate::BucketAllocator;

/// Tracks `(size, alignment)` per outstanding pointer so `deallocate` can
/// flag double-frees and mismatched pairs. Per spec §9's Open Question,
/// a mismatch is **logged and the deallocation proceeds** — it is not
/// forbidden.
pub struct CheckedAllocator<const MIN_POW: u32 = 5, const MAX_POW: u32 = 12, const MAX_STACK_POW: u32 = 16> {
    inner: BucketAllocator<MIN_POW, MAX_POW, MAX_STACK_POW>,
    live: Mutex<HashMap<usize, (usize, usize)>>,
}

impl<const MIN_POW: u32, const MAX_POW: u32, const MAX_STACK_POW: u32>
    CheckedAllocator<MIN_POW, MAX_POW, MAX_STACK_POW>
{
    pub fn new() -> Self {
        Self {
            inner: BucketAllocator::new(),
            live: Mutex::new(HashMap::new()),
        }
    }

    pub fn allocate(&mut self, size: usize, alignment: usize) -> Option<NonNull<u8>> {
        let p = self.inner.allocate(size, alignment)?;
        self.live.lock().unwrap().insert(p.as_ptr() as usize, (size, alignment));
        tracing::trace!(ptr = ?p, size, alignment, "cadence-alloc: allocate");
        Some(p)
    }

    pub fn deallocate(&mut self, ptr: NonNull<u8>, size: usize, alignment: usize) {
        let key = ptr.as_ptr() as usize;
        let mut live = self.live.lock().unwrap();
        match live.remove(&key) {
            None => {
                tracing::warn!(ptr = ?ptr, "cadence-alloc: double-free or unknown pointer detected");
            }
            Some((orig_size, orig_align)) if (orig_size, orig_align) != (size, alignment) => {
                tracing::warn!(
                    ptr = ?ptr,
                    orig_size,
                    orig_align,
                    size,
                    alignment,
                    "cadence-alloc: deallocate called with mismatched (size, alignment); proceeding anyway"
                );
            }
            Some(_) => {}
        }
        drop(live);
        tracing::trace!(ptr = ?ptr, size, alignment, "cadence-alloc: deallocate");
        self.inner.deallocate(ptr, size, alignment);
    }
}

impl<const MIN_POW: u32, const MAX_POW: u32, const MAX_STACK_POW: u32> Default
    for CheckedAllocator<MIN_POW, MAX_POW, MAX_STACK_POW>
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_double_free_without_panicking() {
        let mut a = CheckedAllocator::<5, 12, 16>::new();
        let p = a.allocate(32, 8).unwrap();
        a.deallocate(p, 32, 8);
        a.deallocate(p, 32, 8); // should log, not abort
    }

    #[test]
    fn flags_mismatched_pair_but_still_frees() {
        let mut a = CheckedAllocator::<5, 12, 16>::new();
        let p = a.allocate(32, 8).unwrap();
        a.deallocate(p, 64, 8); // mismatched size, still proceeds
    }
}
