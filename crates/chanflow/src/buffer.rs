//! The bounded in-memory store a `Chan` drains into and refills from.

use std::collections::VecDeque;

use crate::error::{ChanError, ChanResult};

/// A bounded store of pending channel values.
///
/// `is_full`/`is_unblocking` let `Chan` decide whether back-pressure should
/// be propagated to parked putters: for [`FixedBuffer`] it must be; for the
/// other three kinds, `put` never fails, so the channel treats the buffer as
/// an unbounded sink and never parks a putter on it.
pub trait Buffer<T>: Send {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `put` would currently be rejected. Always `false` for an
    /// unblocking buffer.
    fn is_full(&self) -> bool;

    /// Whether this buffer kind ever reports `is_full`. The channel must not
    /// propagate back-pressure through a buffer for which this is `true`.
    fn is_unblocking(&self) -> bool {
        false
    }

    /// Stores `v`. Must not be called when `is_full()` is `true` for a
    /// non-unblocking buffer.
    fn put(&mut self, v: T);

    /// Removes and returns the oldest value.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is empty.
    fn get(&mut self) -> T;
}

/// A classical bounded ring: `is_full` once `len == cap`.
pub struct FixedBuffer<T> {
    cap: usize,
    items: VecDeque<T>,
}

impl<T> FixedBuffer<T> {
    fn new(cap: usize) -> Self {
        Self {
            cap,
            items: VecDeque::with_capacity(cap),
        }
    }
}

impl<T: Send> Buffer<T> for FixedBuffer<T> {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn is_full(&self) -> bool {
        self.items.len() == self.cap
    }

    fn put(&mut self, v: T) {
        assert!(!self.is_full(), "put on a full FixedBuffer");
        self.items.push_back(v);
    }

    fn get(&mut self) -> T {
        self.items.pop_front().expect("get on an empty FixedBuffer")
    }
}

/// Never full; a `put` at capacity silently drops the new value.
pub struct DroppingBuffer<T> {
    cap: usize,
    items: VecDeque<T>,
}

impl<T> DroppingBuffer<T> {
    fn new(cap: usize) -> Self {
        Self {
            cap,
            items: VecDeque::with_capacity(cap),
        }
    }
}

impl<T: Send> Buffer<T> for DroppingBuffer<T> {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn is_full(&self) -> bool {
        false
    }

    fn is_unblocking(&self) -> bool {
        true
    }

    fn put(&mut self, v: T) {
        if self.items.len() < self.cap {
            self.items.push_back(v);
        }
    }

    fn get(&mut self) -> T {
        self.items.pop_front().expect("get on an empty DroppingBuffer")
    }
}

/// Never full; a `put` at capacity evicts the oldest value to make room for
/// the newest.
pub struct SlidingBuffer<T> {
    cap: usize,
    items: VecDeque<T>,
}

impl<T> SlidingBuffer<T> {
    fn new(cap: usize) -> Self {
        Self {
            cap,
            items: VecDeque::with_capacity(cap),
        }
    }
}

impl<T: Send> Buffer<T> for SlidingBuffer<T> {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn is_full(&self) -> bool {
        false
    }

    fn is_unblocking(&self) -> bool {
        true
    }

    fn put(&mut self, v: T) {
        if self.items.len() == self.cap {
            self.items.pop_front();
        }
        self.items.push_back(v);
    }

    fn get(&mut self) -> T {
        self.items.pop_front().expect("get on an empty SlidingBuffer")
    }
}

/// A single-slot latch: the first `put` sets it, every later `put` is
/// ignored, and `get` always returns the latched value without consuming it.
pub struct PromiseBuffer<T> {
    value: Option<T>,
}

impl<T> PromiseBuffer<T> {
    fn new() -> Self {
        Self { value: None }
    }
}

impl<T: Clone + Send> Buffer<T> for PromiseBuffer<T> {
    fn len(&self) -> usize {
        usize::from(self.value.is_some())
    }

    fn is_full(&self) -> bool {
        false
    }

    fn is_unblocking(&self) -> bool {
        true
    }

    fn put(&mut self, v: T) {
        if self.value.is_none() {
            self.value = Some(v);
        }
    }

    fn get(&mut self) -> T {
        self.value
            .clone()
            .expect("get on a PromiseBuffer that has never been put to")
    }
}

fn require_positive(n: usize) -> ChanResult<usize> {
    if n == 0 {
        return Err(ChanError::value_error("buffer capacity must be at least 1"));
    }
    Ok(n)
}

/// Builds a [`FixedBuffer`] of capacity `n`. `n` must be at least 1.
pub fn buffer<T: Send + 'static>(n: usize) -> ChanResult<Box<dyn Buffer<T>>> {
    Ok(Box::new(FixedBuffer::new(require_positive(n)?)))
}

/// Builds a [`DroppingBuffer`] of capacity `n`. `n` must be at least 1.
pub fn dropping_buffer<T: Send + 'static>(n: usize) -> ChanResult<Box<dyn Buffer<T>>> {
    Ok(Box::new(DroppingBuffer::new(require_positive(n)?)))
}

/// Builds a [`SlidingBuffer`] of capacity `n`. `n` must be at least 1.
pub fn sliding_buffer<T: Send + 'static>(n: usize) -> ChanResult<Box<dyn Buffer<T>>> {
    Ok(Box::new(SlidingBuffer::new(require_positive(n)?)))
}

/// Builds a [`PromiseBuffer`].
pub fn promise_buffer<T: Clone + Send + 'static>() -> Box<dyn Buffer<T>> {
    Box::new(PromiseBuffer::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_buffer_fills_and_drains_in_order() {
        let mut b = FixedBuffer::new(2);
        assert!(!b.is_full());
        b.put(1);
        b.put(2);
        assert!(b.is_full());
        assert_eq!(b.get(), 1);
        assert_eq!(b.get(), 2);
    }

    #[test]
    fn dropping_buffer_drops_newest_at_capacity() {
        let mut b = DroppingBuffer::new(2);
        b.put("k1");
        b.put("k2");
        b.put("drop");
        assert!(!b.is_full());
        assert_eq!(b.get(), "k1");
        assert_eq!(b.get(), "k2");
    }

    #[test]
    fn sliding_buffer_evicts_oldest_at_capacity() {
        let mut b = SlidingBuffer::new(2);
        b.put("k1");
        b.put("k2");
        b.put("drop");
        assert_eq!(b.get(), "k2");
        assert_eq!(b.get(), "drop");
    }

    #[test]
    fn promise_buffer_latches_first_value() {
        let mut b: PromiseBuffer<i32> = PromiseBuffer::new();
        b.put(1);
        b.put(2);
        assert_eq!(b.get(), 1);
        assert_eq!(b.get(), 1);
    }

    #[test]
    fn zero_capacity_is_a_value_error() {
        assert!(buffer::<i32>(0).is_err());
    }
}
