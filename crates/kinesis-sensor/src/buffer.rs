//! [`SensorBuffer`] – bounded FIFO of recent sensor values.

use std::collections::VecDeque;

/// Ordered sequence of the most recent values of one sensor category,
/// oldest first.
///
/// Once `capacity` values are held, every push evicts the oldest one, so
/// `len() <= capacity()` always holds.
#[derive(Debug, Clone)]
pub struct SensorBuffer {
    values: VecDeque<f64>,
    capacity: usize,
}

impl SensorBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `value`, returning the evicted oldest value when the buffer was
    /// already full.
    pub fn push(&mut self, value: f64) -> Option<f64> {
        self.values.push_back(value);
        if self.values.len() > self.capacity {
            self.values.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recent value, if any.
    pub fn latest(&self) -> Option<f64> {
        self.values.back().copied()
    }

    /// Copy of the contents, most-recent-last.
    pub fn to_vec(&self) -> Vec<f64> {
        self.values.iter().copied().collect()
    }
}
