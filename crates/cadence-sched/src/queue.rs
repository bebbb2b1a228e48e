//! Bounded lock-free queue with sequence-number/ticket discipline
//! (Vyukov's MPMC ring buffer). The same cell layout backs both the
//! per-worker queue, used SPMC in practice (only the owner calls
//! `push`), and the global submission queue, used MPMC.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Cell<T> {
    sequence: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// A bounded queue of capacity rounded up to the next power of two.
/// `push`/`pop` never block: `push` fails when full, `pop` fails when
/// empty. Acquire/release on each cell's sequence number is the sole
/// synchronisation, handing off the stored value without a lock.
pub struct Queue<T> {
    buffer: Box<[Cell<T>]>,
    mask: usize,
    enqueue_pos: crossbeam_utils::CachePadded<AtomicUsize>,
    dequeue_pos: crossbeam_utils::CachePadded<AtomicUsize>,
}

unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}

impl<T> Queue<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.next_power_of_two().max(2);
        let buffer: Vec<Cell<T>> = (0..capacity)
            .map(|i| Cell {
                sequence: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();
        Self {
            buffer: buffer.into_boxed_slice(),
            mask: capacity - 1,
            enqueue_pos: crossbeam_utils::CachePadded::new(AtomicUsize::new(0)),
            dequeue_pos: crossbeam_utils::CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the value back on failure so the caller can retry or
    /// redirect it elsewhere without reallocating.
    pub fn push(&self, value: T) -> Result<(), T> {
        let mut pos = self.enqueue_pos.load(Ordering::Relaxed);
        loop {
            let cell = &self.buffer[pos & self.mask];
            let seq = cell.sequence.load(Ordering::Acquire);
            let diff = seq as isize - pos as isize;
            if diff == 0 {
                if self
                    .enqueue_pos
                    .compare_exchange_weak(pos, pos + 1, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    unsafe { (*cell.value.get()).write(value) };
                    cell.sequence.store(pos + 1, Ordering::Release);
                    return Ok(());
                }
            } else if diff < 0 {
                return Err(value);
            } else {
                pos = self.enqueue_pos.load(Ordering::Relaxed);
            }
        }
    }

    pub fn pop(&self) -> Option<T> {
        let mut pos = self.dequeue_pos.load(Ordering::Relaxed);
        loop {
            let cell = &self.buffer[pos & self.mask];
            let seq = cell.sequence.load(Ordering::Acquire);
            let diff = seq as isize - (pos as isize + 1);
            if diff == 0 {
                if self
                    .dequeue_pos
                    .compare_exchange_weak(pos, pos + 1, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    let value = unsafe { (*cell.value.get()).assume_init_read() };
                    cell.sequence.store(pos + self.mask + 1, Ordering::Release);
                    return Some(value);
                }
            } else if diff < 0 {
                return None;
            } else {
                pos = self.dequeue_pos.load(Ordering::Relaxed);
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.mask + 1
    }
}

impl<T> Drop for Queue<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fifo_within_a_single_producer() {
        let q = Queue::with_capacity(8);
        for i in 0..8 {
            q.push(i).unwrap();
        }
        assert!(q.push(99).is_err());
        for i in 0..8 {
            assert_eq!(q.pop(), Some(i));
        }
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn concurrent_producers_and_consumers_move_every_item_exactly_once() {
        let q = Arc::new(Queue::with_capacity(64));
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let q = q.clone();
                thread::spawn(move || {
                    for i in 0..256usize {
                        let mut item = p * 1000 + i;
                        loop {
                            match q.push(item) {
                                Ok(()) => break,
                                Err(back) => {
                                    item = back;
                                    thread::yield_now();
                                }
                            }
                        }
                    }
                })
            })
            .collect();

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let remaining = Arc::new(std::sync::atomic::AtomicUsize::new(4 * 256));
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let q = q.clone();
                let seen = seen.clone();
                let remaining = remaining.clone();
                thread::spawn(move || {
                    let mut local = Vec::new();
                    while remaining.load(Ordering::Relaxed) > 0 {
                        match q.pop() {
                            Some(v) => {
                                local.push(v);
                                remaining.fetch_sub(1, Ordering::Relaxed);
                            }
                            None => thread::yield_now(),
                        }
                    }
                    seen.lock().extend(local);
                })
            })
            .collect();

        for p in producers {
            p.join().unwrap();
        }
        for c in consumers {
            c.join().unwrap();
        }
        let mut all = seen.lock().clone();
        all.sort_unstable();
        assert_eq!(all.len(), 4 * 256);
    }
}
