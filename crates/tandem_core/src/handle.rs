//! Document handles: an engine state paired with its rendered view and the
//! actor that edits it.

use std::fmt;
use std::sync::Arc;

use crate::change::Change;
use crate::clock::Clock;
use crate::engine::Engine;
use crate::error::Result;
use crate::patch::Patch;
use crate::path::Mutation;
use crate::types::ActorId;

struct HandleInner<E: Engine> {
    engine: Arc<E>,
    actor: ActorId,
    state: E::State,
    view: serde_json::Value,
}

/// An immutable snapshot of one replica of a document.
///
/// Every edit returns a new handle; the old one stays valid and coherent, so
/// readers can hold on to it while the next one is built. Cloning is cheap.
pub struct DocHandle<E: Engine> {
    inner: Arc<HandleInner<E>>,
}

impl<E: Engine> Clone for DocHandle<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Engine> fmt::Debug for DocHandle<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocHandle")
            .field("actor", &self.inner.actor)
            .field("clock", &self.clock())
            .field("view", &self.inner.view)
            .finish()
    }
}

impl<E: Engine> DocHandle<E> {
    /// Create an empty document edited by `actor`.
    pub fn new(engine: Arc<E>, actor: ActorId) -> Self {
        let state = engine.init();
        Self::from_state(engine, actor, state)
    }

    /// Wrap an existing engine state.
    pub fn from_state(engine: Arc<E>, actor: ActorId, state: E::State) -> Self {
        let view = engine.materialize(&state);
        Self {
            inner: Arc::new(HandleInner {
                engine,
                actor,
                state,
                view,
            }),
        }
    }

    /// Restore a handle from bytes produced by [`save`](Self::save).
    pub fn load(engine: Arc<E>, actor: ActorId, bytes: &[u8]) -> Result<Self> {
        let state = engine.load(bytes)?;
        Ok(Self::from_state(engine, actor, state))
    }

    /// Serialize the engine state.
    pub fn save(&self) -> Result<Vec<u8>> {
        self.inner.engine.save(&self.inner.state)
    }

    /// A new replica sharing this handle's history, edited by `actor`.
    ///
    /// Each replica needs its own actor id; forking to an actor that is
    /// already editing elsewhere produces conflicting sequence numbers.
    pub fn fork(&self, actor: ActorId) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                engine: Arc::clone(&self.inner.engine),
                actor,
                state: self.inner.state.clone(),
                view: self.inner.view.clone(),
            }),
        }
    }

    /// Record a local edit.
    ///
    /// Returns the new handle and the change to broadcast. An empty mutation
    /// list records nothing and returns this same handle.
    pub fn change(
        &self,
        mutations: &[Mutation],
        message: Option<String>,
    ) -> Result<(Self, Option<Change>)> {
        if mutations.is_empty() {
            return Ok((self.clone(), None));
        }
        let (state, change, patch) = self.inner.engine.apply_local_change(
            &self.inner.state,
            &self.inner.actor,
            mutations,
            message,
        )?;
        Ok((self.with_state(state, &patch)?, Some(change)))
    }

    /// Apply remote changes. Returns this same handle if nothing new was
    /// applied or queued.
    pub fn apply_changes(&self, changes: Vec<Change>) -> Result<Self> {
        if changes.is_empty() {
            return Ok(self.clone());
        }
        let before = self.inner.engine.get_queued_changes(&self.inner.state).len();
        let (state, patch) = self.inner.engine.apply_changes(&self.inner.state, changes)?;
        let unchanged = patch.is_empty()
            && self.inner.engine.get_clock(&state) == self.clock()
            && self.inner.engine.get_queued_changes(&state).len() == before;
        if unchanged {
            return Ok(self.clone());
        }
        self.with_state(state, &patch)
    }

    /// Build the successor handle, re-rendering the view through `patch`.
    pub(crate) fn with_state(&self, state: E::State, patch: &Patch) -> Result<Self> {
        let view = if patch.is_empty() {
            self.inner.view.clone()
        } else {
            let mut view = self.inner.view.clone();
            patch.apply(&mut view)?;
            view
        };
        Ok(Self {
            inner: Arc::new(HandleInner {
                engine: Arc::clone(&self.inner.engine),
                actor: self.inner.actor.clone(),
                state,
                view,
            }),
        })
    }

    /// The rendered document.
    pub fn view(&self) -> &serde_json::Value {
        &self.inner.view
    }

    /// Clock of the applied changes.
    pub fn clock(&self) -> Clock {
        self.inner.engine.get_clock(&self.inner.state)
    }

    /// The engine state.
    pub fn state(&self) -> &E::State {
        &self.inner.state
    }

    /// The actor editing this replica.
    pub fn actor(&self) -> &ActorId {
        &self.inner.actor
    }

    /// The engine this handle was built with.
    pub fn engine(&self) -> &Arc<E> {
        &self.inner.engine
    }

    /// Whether two handles are the very same snapshot.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::OpSetEngine;
    use serde_json::json;

    fn handle(actor: &str) -> DocHandle<OpSetEngine> {
        DocHandle::new(Arc::new(OpSetEngine::new()), ActorId::new(actor).unwrap())
    }

    #[test]
    fn test_change_updates_view_and_keeps_old_handle() {
        let doc = handle("a");
        let (next, change) = doc
            .change(&[Mutation::set(["x"], json!(1))], Some("set x".into()))
            .unwrap();
        assert_eq!(next.view(), &json!({"x": 1}));
        assert_eq!(doc.view(), &json!({}));
        assert_eq!(change.unwrap().message.as_deref(), Some("set x"));
    }

    #[test]
    fn test_empty_change_returns_same_handle() {
        let doc = handle("a");
        let (same, change) = doc.change(&[], None).unwrap();
        assert!(change.is_none());
        assert!(same.ptr_eq(&doc));
    }

    #[test]
    fn test_apply_changes_renders_remote_edits() {
        let a = handle("a");
        let b = a.fork(ActorId::new("b").unwrap());
        let (a, change) = a
            .change(&[Mutation::set(["list"], json!([1, 2]))], None)
            .unwrap();
        let b = b.apply_changes(vec![change.unwrap()]).unwrap();
        assert_eq!(b.view(), a.view());
        assert_eq!(b.clock(), a.clock());
        assert_eq!(b.actor().as_str(), "b");
    }

    #[test]
    fn test_apply_known_changes_returns_same_handle() {
        let (doc, change) = handle("a")
            .change(&[Mutation::set(["x"], json!(1))], None)
            .unwrap();
        let again = doc.apply_changes(vec![change.unwrap()]).unwrap();
        assert!(again.ptr_eq(&doc));
    }

    #[test]
    fn test_save_and_load() {
        let (doc, _) = handle("a")
            .change(&[Mutation::set(["nested"], json!({"k": [true]}))], None)
            .unwrap();
        let bytes = doc.save().unwrap();
        let loaded = DocHandle::load(Arc::clone(doc.engine()), doc.actor().clone(), &bytes).unwrap();
        assert_eq!(loaded.view(), doc.view());
        assert_eq!(loaded.clock(), doc.clock());
    }
}
