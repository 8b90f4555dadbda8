//! Pending-write buffer
//!
//! Writes are flushed every `capacity` items and once more at the end of a
//! job. A flush is not a transaction boundary for the job as a whole: a crash
//! loses at most the unflushed items, which the next run picks up again.

/// Bounded buffer handing out full batches
#[derive(Debug)]
pub struct PendingBatch<T> {
    items: Vec<T>,
    capacity: usize,
}

impl<T> PendingBatch<T> {
    /// Buffer flushing every `capacity` items (at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Add an item; returns the full batch when it reaches capacity
    pub fn push(&mut self, item: T) -> Option<Vec<T>> {
        self.items.push(item);
        if self.items.len() >= self.capacity {
            Some(std::mem::replace(&mut self.items, Vec::with_capacity(self.capacity)))
        } else {
            None
        }
    }

    /// Remaining items, if any
    pub fn finish(self) -> Option<Vec<T>> {
        (!self.items.is_empty()).then_some(self.items)
    }

    /// Items waiting to be flushed
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
