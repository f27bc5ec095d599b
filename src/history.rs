use std::collections::VecDeque;

use crate::models::CurveSettings;

pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Linear undo/redo over immutable curve snapshots.
#[derive(Debug, Clone)]
pub struct HistoryStack {
    entries: VecDeque<CurveSettings>,
    index: usize,
    capacity: usize,
}

impl Default for HistoryStack {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryStack {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            index: 0,
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn current(&self) -> Option<&CurveSettings> {
        self.entries.get(self.index)
    }

    pub fn entries(&self) -> impl Iterator<Item = &CurveSettings> {
        self.entries.iter()
    }

    /// Records `state` as the new tip. Returns `false` when it equals the
    /// current entry. Any redo branch past the current index is dropped.
    pub fn commit(&mut self, state: &CurveSettings) -> bool {
        if self.current() == Some(state) {
            return false;
        }
        if !self.entries.is_empty() {
            self.entries.truncate(self.index + 1);
        }
        self.entries.push_back(state.clone());
        self.index = self.entries.len() - 1;
        if self.entries.len() > self.capacity {
            self.entries.pop_front();
            self.index -= 1;
        }
        true
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.entries.len()
    }

    pub fn undo(&mut self) -> Option<&CurveSettings> {
        if !self.can_undo() {
            return None;
        }
        self.index -= 1;
        self.entries.get(self.index)
    }

    pub fn redo(&mut self) -> Option<&CurveSettings> {
        if !self.can_redo() {
            return None;
        }
        self.index += 1;
        self.entries.get(self.index)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index = 0;
    }
}
