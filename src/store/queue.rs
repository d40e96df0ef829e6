use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::position::PositionFix;

/// Bounded FIFO of fixes awaiting delivery. Evicts the oldest entry to admit a new one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingQueue {
    entries: VecDeque<PositionFix>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `fix`, evicting from the front until it fits. Returns the evicted entries.
    pub fn push(&mut self, fix: PositionFix, capacity: usize) -> Vec<PositionFix> {
        let mut evicted = Vec::new();
        while !self.entries.is_empty() && self.entries.len() >= capacity {
            if let Some(oldest) = self.entries.pop_front() {
                evicted.push(oldest);
            }
        }
        self.entries.push_back(fix);
        evicted
    }

    pub fn contains_sample(&self, fix: &PositionFix) -> bool {
        self.entries.iter().any(|entry| entry.same_sample(fix))
    }

    /// Remove the first entry denoting the same sample as `fix`.
    pub fn remove_sample(&mut self, fix: &PositionFix) -> bool {
        match self.entries.iter().position(|entry| entry.same_sample(fix)) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PositionFix> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<PositionFix> {
        self.entries.iter().cloned().collect()
    }
}
