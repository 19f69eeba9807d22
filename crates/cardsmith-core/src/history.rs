//! Undo/redo over full snapshots.
//!
//! A snapshot is pushed immediately *before* a mutation begins, so the
//! pre-mutation state is always recoverable. Pushing clears the redo stack.
//! Depth is unbounded unless a limit is set, in which case the oldest
//! snapshot is evicted first.
//!
//! The editor snapshots the whole [`crate::scene::Scene`] value, so the
//! background pseudo-layer's z-index is restored together with the layers.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct History<S> {
    undo: VecDeque<S>,
    redo: Vec<S>,
    limit: Option<usize>,
}

impl<S> Default for History<S> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<S> History<S> {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            limit,
        }
    }

    /// Records `current` as the state to return to on the next undo.
    pub fn push(&mut self, current: S) {
        self.redo.clear();
        self.undo.push_back(current);
        if let Some(limit) = self.limit {
            while self.undo.len() > limit {
                self.undo.pop_front();
                tracing::debug!("History limit {} reached; dropped oldest snapshot", limit);
            }
        }
    }

    /// Pops the last snapshot, parking `current` on the redo stack.
    pub fn undo(&mut self, current: S) -> Option<S> {
        let previous = self.undo.pop_back()?;
        self.redo.push(current);
        Some(previous)
    }

    pub fn redo(&mut self, current: S) -> Option<S> {
        let next = self.redo.pop()?;
        self.undo.push_back(current);
        Some(next)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{Layer, LayerId};
    use crate::normalize::PercentPoint;

    type Snapshot = Vec<Layer>;

    fn state(n: usize) -> Snapshot {
        (0..n)
            .map(|i| Layer::text(LayerId(i as i64 + 1), format!("t{}", i)))
            .collect()
    }

    fn mutate(history: &mut History<Snapshot>, current: &mut Snapshot, step: usize) {
        history.push(current.clone());
        current[0] = current[0]
            .clone()
            .at(PercentPoint::new(step as f32 * 3.0, 10.0));
    }

    #[test]
    fn undo_redo_round_trip() {
        let original = state(3);
        let mut current = original.clone();
        let mut history = History::new(None);

        for step in 1..=5 {
            mutate(&mut history, &mut current, step);
        }
        let last = current.clone();

        for _ in 0..5 {
            current = history.undo(current).unwrap();
        }
        assert_eq!(current, original);
        assert!(!history.can_undo());

        for _ in 0..5 {
            current = history.redo(current).unwrap();
        }
        assert_eq!(current, last);
        assert!(!history.can_redo());
    }

    #[test]
    fn new_mutation_after_undo_clears_redo() {
        let mut current = state(1);
        let mut history = History::new(None);
        mutate(&mut history, &mut current, 1);
        current = history.undo(current).unwrap();
        assert!(history.can_redo());

        mutate(&mut history, &mut current, 2);
        assert!(!history.can_redo());
        assert!(history.redo(current).is_none());
    }

    #[test]
    fn limit_evicts_oldest_first() {
        let mut current = state(1);
        let mut history = History::new(Some(2));
        for step in 1..=4 {
            mutate(&mut history, &mut current, step);
        }
        assert_eq!(history.undo_depth(), 2);

        current = history.undo(current).unwrap();
        current = history.undo(current).unwrap();
        // Snapshot taken before step 3 is the oldest one left.
        assert_eq!(current[0].position, PercentPoint::new(6.0, 10.0));
        assert!(history.undo(current).is_none());
    }

    #[test]
    fn empty_history_is_a_no_op() {
        let mut history = History::<Snapshot>::default();
        assert!(history.undo(state(1)).is_none());
        assert!(history.redo(state(1)).is_none());
    }
}
