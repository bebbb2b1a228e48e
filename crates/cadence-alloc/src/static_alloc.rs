//! Process-wide singleton wrapper: one instance per `(Allocator, name)`
//! pair, lazily constructed on first allocation, torn down by the last
//! deallocation observed after the destruction flag is raised.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::OnceLock;

/// Wraps an allocator `A` as a lazily-constructed, process-wide singleton.
/// `NAME` disambiguates multiple singletons over the same allocator type.
pub struct StaticAllocator<A, const NAME: u64> {
    cell: OnceLock<A>,
    pending_destruction: AtomicBool,
    outstanding: AtomicUsize,
}

impl<A: Default, const NAME: u64> StaticAllocator<A, NAME> {
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
            pending_destruction: AtomicBool::new(false),
            outstanding: AtomicUsize::new(0),
        }
    }

    /// Returns the singleton, constructing it on first use.
    pub fn get(&self) -> &A {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        self.cell.get_or_init(A::default)
    }

    /// Marks that the program is tearing down; the allocator itself stays
    /// alive (it lives for `'static` as a `OnceLock`) but callers can use
    /// this to detect the "last deallocation after program-end" case and
    /// stop logging/validating further activity.
    pub fn begin_shutdown(&self) {
        self.pending_destruction.store(true, Ordering::Release);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.pending_destruction.load(Ordering::Acquire)
    }

    /// Call once per `get()` borrow is released; when this drops to zero
    /// after `begin_shutdown`, the caller may treat the singleton as
    /// logically disposed (the `OnceLock` storage itself is reclaimed at
    /// process exit regardless).
    pub fn release(&self) -> usize {
        self.outstanding.fetch_sub(1, Ordering::AcqRel) - 1
    }
}

impl<A: Default, const NAME: u64> Default for StaticAllocator<A, NAME> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BucketAllocator;

    static SINGLETON: StaticAllocator<std::sync::Mutex<BucketAllocator>, 1> = StaticAllocator::new();

    #[test]
    fn lazily_constructs_once() {
        let a = SINGLETON.get();
        let b = SINGLETON.get();
        assert!(std::ptr::eq(a, b));
        SINGLETON.release();
        SINGLETON.release();
    }

    #[test]
    fn shutdown_flag_is_observed_by_last_releaser() {
        SINGLETON.get();
        SINGLETON.begin_shutdown();
        assert!(SINGLETON.is_shutting_down());
        SINGLETON.release();
    }
}
