//! Insertion-ordered index of stored photos.
//!
//! Photos are evicted strictly by creation time, so the store keeps the
//! `(created_at, id)` pairs in a deque sorted oldest first. Reads never touch
//! the index.

use std::collections::VecDeque;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct FifoIndex {
    entries: VecDeque<(i64, Uuid)>,
}

impl FifoIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(created_at_ms, id)` pairs in any order
    pub fn from_entries(entries: impl IntoIterator<Item = (i64, Uuid)>) -> Self {
        let mut index = Self::new();
        for (created_at, id) in entries {
            index.insert(created_at, id);
        }
        index
    }

    /// Insert keeping creation order; equal timestamps keep arrival order
    pub fn insert(&mut self, created_at: i64, id: Uuid) {
        let pos = self.entries.partition_point(|(t, _)| *t <= created_at);
        self.entries.insert(pos, (created_at, id));
    }

    pub fn remove(&mut self, id: Uuid) -> bool {
        match self.entries.iter().position(|(_, e)| *e == id) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.entries.iter().any(|(_, e)| *e == id)
    }

    pub fn oldest(&self) -> Option<Uuid> {
        self.entries.front().map(|(_, id)| *id)
    }

    pub fn pop_oldest(&mut self) -> Option<Uuid> {
        self.entries.pop_front().map(|(_, id)| id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Ids oldest first
    pub fn iter(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.entries.iter().map(|(_, id)| *id)
    }
}
