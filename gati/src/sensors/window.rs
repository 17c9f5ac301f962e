//! Bounded sample windows for smoothing and health tracking.

use std::collections::VecDeque;

/// Keeps the last `capacity` readings and averages them.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    values: VecDeque<f32>,
    capacity: usize,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a reading, evicting the oldest when full. Non-finite values are
    /// ignored.
    pub fn push(&mut self, value: f32) {
        if !value.is_finite() {
            return;
        }
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    /// Moving average, `None` until the first reading
    pub fn mean(&self) -> Option<f32> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f32>() / self.values.len() as f32)
    }

    pub fn latest(&self) -> Option<f32> {
        self.values.back().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Rolling success ratio over the last N sample attempts
#[derive(Debug, Clone)]
pub struct SensorHealth {
    attempts: VecDeque<bool>,
    capacity: usize,
    total_errors: u64,
}

impl SensorHealth {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            attempts: VecDeque::with_capacity(capacity),
            capacity,
            total_errors: 0,
        }
    }

    pub fn record(&mut self, ok: bool) {
        if self.attempts.len() == self.capacity {
            self.attempts.pop_front();
        }
        self.attempts.push_back(ok);
        if !ok {
            self.total_errors += 1;
        }
    }

    /// 1.0 when nothing has been attempted yet
    pub fn ratio(&self) -> f32 {
        if self.attempts.is_empty() {
            return 1.0;
        }
        let ok = self.attempts.iter().filter(|&&ok| ok).count();
        ok as f32 / self.attempts.len() as f32
    }

    pub fn total_errors(&self) -> u64 {
        self.total_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_window_evicts_oldest() {
        let mut w = SampleWindow::new(3);
        for v in [1.0, 2.0, 3.0, 10.0] {
            w.push(v);
        }
        assert_eq!(w.len(), 3);
        assert_relative_eq!(w.mean().unwrap(), 5.0);
        assert_eq!(w.latest(), Some(10.0));
    }

    #[test]
    fn test_window_ignores_nan() {
        let mut w = SampleWindow::new(3);
        w.push(f32::NAN);
        assert!(w.is_empty());
        assert_eq!(w.mean(), None);
    }

    #[test]
    fn test_zero_capacity_treated_as_one() {
        let mut w = SampleWindow::new(0);
        w.push(4.0);
        w.push(6.0);
        assert_eq!(w.mean(), Some(6.0));
    }

    #[test]
    fn test_health_ratio_rolls() {
        let mut h = SensorHealth::new(4);
        assert_eq!(h.ratio(), 1.0);
        h.record(false);
        h.record(false);
        h.record(true);
        h.record(true);
        assert_relative_eq!(h.ratio(), 0.5);
        h.record(true);
        h.record(true);
        assert_relative_eq!(h.ratio(), 1.0);
        assert_eq!(h.total_errors(), 2);
    }
}
