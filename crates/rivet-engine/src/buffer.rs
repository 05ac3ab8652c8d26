//! Double-buffered publication of values from a stepping thread.
//!
//! [`DoubleBuffer`] has a back half written only by the thread that owns
//! the value (the stepping thread) and a front half that readers see.
//! Readers take a brief read lock on the front; the only write lock on
//! the front is taken by [`flip()`](DoubleBuffer::flip), so a reader can
//! never observe a half-written value.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

/// A writer-private back half plus a reader-visible front half.
#[derive(Debug, Default)]
pub struct DoubleBuffer<T> {
    /// Only ever locked by the stepping thread (and by `flip`, which that
    /// same thread calls), so this lock is never contended.
    back: Mutex<T>,
    front: RwLock<T>,
    generation: AtomicU64,
}

impl<T> DoubleBuffer<T> {
    /// Create a buffer with both halves set from `front` and `back`.
    pub fn new(front: T, back: T) -> Self {
        Self {
            back: Mutex::new(back),
            front: RwLock::new(front),
            generation: AtomicU64::new(0),
        }
    }

    /// Mutate the back half. Stepping thread only.
    pub fn write_back<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.back.lock())
    }

    /// Mutate the front half in place under the write lock.
    ///
    /// Used by single-buffered publishers; counts as a flip.
    pub fn write_front<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let r = f(&mut self.front.write());
        self.generation.fetch_add(1, Ordering::Release);
        r
    }

    /// Swap the halves: the freshly written back becomes readable.
    ///
    /// Returns the new generation.
    pub fn flip(&self) -> u64 {
        let mut back = self.back.lock();
        {
            let mut front = self.front.write();
            std::mem::swap(&mut *front, &mut *back);
        }
        self.generation.fetch_add(1, Ordering::Release) + 1
    }

    /// Borrow the front half under a read lock.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.front.read())
    }

    /// Number of flips performed so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl<T: Clone> DoubleBuffer<T> {
    /// Clone the front half.
    pub fn snapshot(&self) -> T {
        self.front.read().clone()
    }

    /// Create a buffer whose halves both start as `value`.
    pub fn from_value(value: T) -> Self {
        Self::new(value.clone(), value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn writes_are_invisible_until_flip() {
        let buf = DoubleBuffer::from_value(0u32);
        buf.write_back(|v| *v = 7);
        assert_eq!(buf.snapshot(), 0);
        assert_eq!(buf.flip(), 1);
        assert_eq!(buf.snapshot(), 7);
        assert_eq!(buf.generation(), 1);
    }

    #[test]
    fn halves_alternate() {
        let buf = DoubleBuffer::new(1u32, 2u32);
        assert_eq!(buf.snapshot(), 1);
        buf.flip();
        assert_eq!(buf.snapshot(), 2);
        // The back now holds the old front.
        assert_eq!(buf.write_back(|v| *v), 1);
    }

    #[test]
    fn front_writes_count_as_flips() {
        let buf = DoubleBuffer::from_value(String::new());
        buf.write_front(|s| s.push_str("hi"));
        assert_eq!(buf.read(|s| s.len()), 2);
        assert_eq!(buf.generation(), 1);
    }

    #[test]
    fn reader_never_sees_torn_pairs() {
        // Writer keeps both elements equal; a torn read would differ.
        let buf = Arc::new(DoubleBuffer::from_value((0u64, 0u64)));
        let writer = {
            let buf = Arc::clone(&buf);
            thread::spawn(move || {
                for i in 1..=2_000u64 {
                    buf.write_back(|v| {
                        v.0 = i;
                        v.1 = i;
                    });
                    buf.flip();
                }
            })
        };
        for _ in 0..2_000 {
            let (a, b) = buf.snapshot();
            assert_eq!(a, b);
        }
        writer.join().unwrap();
        assert_eq!(buf.snapshot(), (2_000, 2_000));
    }
}
