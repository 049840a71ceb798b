use std::collections::BTreeMap;

/// Releases items strictly in sequence order.
///
/// Items arriving ahead of the next expected sequence number are held back
/// until the gap closes; items at or below the last released number are
/// duplicates and dropped.
#[derive(Debug, Clone)]
pub struct ReorderBuffer<T> {
    next_expected: i64,
    pending: BTreeMap<i64, T>,
}

impl<T> ReorderBuffer<T> {
    /// `last_applied` is the sequence number already reflected downstream.
    pub fn new(last_applied: i64) -> Self {
        Self {
            next_expected: last_applied + 1,
            pending: BTreeMap::new(),
        }
    }

    /// Offer one item; returns every item now releasable, in order.
    pub fn push(&mut self, sequence_no: i64, item: T) -> Vec<T> {
        if sequence_no < self.next_expected {
            return Vec::new();
        }
        self.pending.entry(sequence_no).or_insert(item);

        let mut ready = Vec::new();
        while let Some(item) = self.pending.remove(&self.next_expected) {
            ready.push(item);
            self.next_expected += 1;
        }
        ready
    }

    pub fn last_applied(&self) -> i64 {
        self.next_expected - 1
    }

    /// Number of items waiting on a gap
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn has_gap(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Remove and return everything buffered, in sequence order.
    pub fn take_pending(&mut self) -> Vec<T> {
        std::mem::take(&mut self.pending).into_values().collect()
    }

    /// Drop everything buffered and restart after `last_applied`.
    pub fn reset(&mut self, last_applied: i64) {
        self.next_expected = last_applied + 1;
        self.pending.clear();
    }
}
