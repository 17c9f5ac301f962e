//! One-slot handoff between a producer thread and the control loop.

use parking_lot::Mutex;

/// Holds at most one value. A newer `put` replaces an unconsumed value and
/// `take` empties the slot, so each value is consumed at most once.
#[derive(Debug)]
pub struct LatestSlot<T> {
    inner: Mutex<Option<T>>,
}

impl<T> LatestSlot<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Store a value, returning the one it replaced (if never taken)
    pub fn put(&self, value: T) -> Option<T> {
        self.inner.lock().replace(value)
    }

    /// Remove and return the current value without blocking on the producer
    pub fn take(&self) -> Option<T> {
        self.inner.lock().take()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_none()
    }
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_take_consumes_once() {
        let slot = LatestSlot::new();
        slot.put(1);
        assert_eq!(slot.take(), Some(1));
        assert_eq!(slot.take(), None);
        assert!(slot.is_empty());
    }

    #[test]
    fn test_put_replaces_stale_value() {
        let slot = LatestSlot::new();
        assert_eq!(slot.put(1), None);
        assert_eq!(slot.put(2), Some(1));
        assert_eq!(slot.take(), Some(2));
    }

    #[test]
    fn test_cross_thread_handoff_sees_latest() {
        let slot = Arc::new(LatestSlot::new());
        let producer = Arc::clone(&slot);
        thread::spawn(move || {
            for i in 0..100u32 {
                producer.put(i);
            }
        })
        .join()
        .unwrap();
        assert_eq!(slot.take(), Some(99));
    }
}
