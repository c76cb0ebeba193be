//! Change history with lazily replayed snapshots.
//!
//! Snapshots are computed on first access by replaying every change up to
//! and including the entry, then cached on the entry.

use std::cell::OnceCell;
use std::sync::Arc;

use crate::change::Change;
use crate::engine::Engine;
use crate::error::Result;
use crate::handle::DocHandle;

/// One applied change and the document as it was right after it.
pub struct HistoryEntry<E: Engine> {
    engine: Arc<E>,
    changes: Arc<Vec<Change>>,
    index: usize,
    snapshot: OnceCell<serde_json::Value>,
}

impl<E: Engine> HistoryEntry<E> {
    /// The change.
    pub fn change(&self) -> &Change {
        &self.changes[self.index]
    }

    /// Position in the history, starting at 0.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether the snapshot has been computed yet.
    pub fn is_materialized(&self) -> bool {
        self.snapshot.get().is_some()
    }

    /// The document after this change.
    pub fn snapshot(&self) -> Result<&serde_json::Value> {
        if let Some(view) = self.snapshot.get() {
            return Ok(view);
        }
        let prefix = self.changes[..=self.index].to_vec();
        let (state, _) = self.engine.apply_changes(&self.engine.init(), prefix)?;
        let view = self.engine.materialize(&state);
        Ok(self.snapshot.get_or_init(|| view))
    }
}

/// Every applied change of a document, in application order.
pub struct History<E: Engine> {
    entries: Vec<HistoryEntry<E>>,
}

impl<E: Engine> History<E> {
    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at `index`.
    pub fn get(&self, index: usize) -> Option<&HistoryEntry<E>> {
        self.entries.get(index)
    }

    /// Iterate over entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry<E>> {
        self.entries.iter()
    }
}

/// Build the history of a handle. No snapshot is computed yet.
pub fn get_history<E: Engine>(handle: &DocHandle<E>) -> History<E> {
    let engine = handle.engine();
    let changes = Arc::new(engine.get_changes(handle.state(), &Default::default()));
    let entries = (0..changes.len())
        .map(|index| HistoryEntry {
            engine: Arc::clone(engine),
            changes: Arc::clone(&changes),
            index,
            snapshot: OnceCell::new(),
        })
        .collect();
    History { entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::OpSetEngine;
    use crate::path::Mutation;
    use crate::types::ActorId;
    use serde_json::json;

    #[test]
    fn test_snapshots_are_lazy_and_replay_prefix() {
        let mut doc = DocHandle::new(Arc::new(OpSetEngine::new()), ActorId::new("a").unwrap());
        for (key, value) in [("a", 1), ("b", 2), ("a", 3)] {
            doc = doc
                .change(&[Mutation::set([key], json!(value))], None)
                .unwrap()
                .0;
        }

        let history = get_history(&doc);
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|e| !e.is_materialized()));

        let second = history.get(1).unwrap();
        assert_eq!(second.index(), 1);
        assert_eq!(second.change().seq, 2);
        assert_eq!(second.snapshot().unwrap(), &json!({"a": 1, "b": 2}));
        assert!(second.is_materialized());
        assert!(!history.get(0).unwrap().is_materialized());

        let last = history.get(2).unwrap().snapshot().unwrap();
        assert_eq!(last, doc.view());
    }

    #[test]
    fn test_empty_history() {
        let doc = DocHandle::new(Arc::new(OpSetEngine::new()), ActorId::new("a").unwrap());
        assert!(get_history(&doc).is_empty());
    }
}
