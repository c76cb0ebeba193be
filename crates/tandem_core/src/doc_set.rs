//! Multi-document registry with change notification.

use std::collections::HashMap;
use std::sync::Arc;

use crate::change::Change;
use crate::engine::Engine;
use crate::error::Result;
use crate::handle::DocHandle;
use crate::registry::{HandlerId, HandlerRegistry};
use crate::types::ActorId;

/// Callback invoked with the document id and its new handle.
pub type DocSetHandler<E> = dyn Fn(&str, &DocHandle<E>) + Send + Sync;

/// A set of documents keyed by id.
///
/// Handlers run synchronously on every [`set_doc`](Self::set_doc), once per
/// call, in registration order.
pub struct DocSet<E: Engine> {
    engine: Arc<E>,
    actor: ActorId,
    docs: HashMap<String, DocHandle<E>>,
    handlers: HandlerRegistry<DocSetHandler<E>>,
}

impl<E: Engine> DocSet<E> {
    /// Create an empty set. Documents created on demand are edited by
    /// `actor`.
    pub fn new(engine: Arc<E>, actor: ActorId) -> Self {
        Self {
            engine,
            actor,
            docs: HashMap::new(),
            handlers: HandlerRegistry::new(),
        }
    }

    /// The engine new documents are created with.
    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// The actor owning documents created by this set.
    pub fn actor(&self) -> &ActorId {
        &self.actor
    }

    /// Insert or replace a document, then notify handlers.
    pub fn set_doc(&mut self, doc_id: impl Into<String>, handle: DocHandle<E>) {
        let doc_id = doc_id.into();
        self.docs.insert(doc_id.clone(), handle.clone());
        let failed = self.handlers.emit(|handler| handler(&doc_id, &handle));
        if failed > 0 {
            log::warn!("[DocSet] {} handler(s) failed for '{}'", failed, doc_id);
        }
    }

    /// Look up a document.
    pub fn get_doc(&self, doc_id: &str) -> Option<&DocHandle<E>> {
        self.docs.get(doc_id)
    }

    /// Remove a document, returning its last handle.
    pub fn remove_doc(&mut self, doc_id: &str) -> Option<DocHandle<E>> {
        self.docs.remove(doc_id)
    }

    /// Ids of every document, in no particular order.
    pub fn doc_ids(&self) -> impl Iterator<Item = &str> {
        self.docs.keys().map(String::as_str)
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Whether the set holds no documents.
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Register a change handler.
    pub fn register_handler<F>(&mut self, handler: F) -> HandlerId
    where
        F: Fn(&str, &DocHandle<E>) + Send + Sync + 'static,
    {
        self.handlers.register(Arc::new(handler))
    }

    /// Remove a handler. Returns `true` if it was registered.
    pub fn unregister_handler(&mut self, id: HandlerId) -> bool {
        self.handlers.unregister(id)
    }

    /// Apply changes to a document, creating it empty if it is unknown.
    ///
    /// Handlers are notified only when the document is new or the batch
    /// contributed something; re-delivered changes are silent.
    pub fn apply_changes(&mut self, doc_id: &str, changes: Vec<Change>) -> Result<DocHandle<E>> {
        let (current, known) = match self.docs.get(doc_id) {
            Some(doc) => (doc.clone(), true),
            None => (
                DocHandle::new(Arc::clone(&self.engine), self.actor.clone()),
                false,
            ),
        };
        let count = changes.len();
        let next = current.apply_changes(changes)?;
        if known && next.ptr_eq(&current) {
            log::debug!("[DocSet] '{}': {} changes already known", doc_id, count);
            return Ok(next);
        }
        log::debug!("[DocSet] '{}': applied {} changes", doc_id, count);
        self.set_doc(doc_id, next.clone());
        Ok(next)
    }
}

impl<E: Engine> std::fmt::Debug for DocSet<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocSet")
            .field("actor", &self.actor)
            .field("docs", &self.docs.len())
            .field("handlers", &self.handlers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::OpSetEngine;
    use crate::path::Mutation;
    use serde_json::json;
    use std::sync::Mutex;

    fn doc_set(actor: &str) -> DocSet<OpSetEngine> {
        DocSet::new(Arc::new(OpSetEngine::new()), ActorId::new(actor).unwrap())
    }

    #[test]
    fn test_set_doc_notifies_once_per_call() {
        let mut docs = doc_set("a");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        docs.register_handler(move |id, doc| {
            s.lock().unwrap().push((id.to_string(), doc.view().clone()));
        });

        let doc = DocHandle::new(Arc::clone(docs.engine()), docs.actor().clone());
        let (doc, _) = doc
            .change(
                &[Mutation::set(["x"], json!(1)), Mutation::set(["y"], json!(2))],
                None,
            )
            .unwrap();
        docs.set_doc("d1", doc);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], ("d1".to_string(), json!({"x": 1, "y": 2})));
    }

    #[test]
    fn test_get_remove_and_ids() {
        let mut docs = doc_set("a");
        let doc = DocHandle::new(Arc::clone(docs.engine()), docs.actor().clone());
        docs.set_doc("one", doc.clone());
        docs.set_doc("two", doc);
        let mut ids: Vec<_> = docs.doc_ids().collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["one", "two"]);
        assert!(docs.remove_doc("one").is_some());
        assert!(docs.get_doc("one").is_none());
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn test_apply_changes_creates_unknown_doc() {
        let source = DocHandle::new(
            Arc::new(OpSetEngine::new()),
            ActorId::new("src").unwrap(),
        );
        let (_, change) = source
            .change(&[Mutation::set(["k"], json!("v"))], None)
            .unwrap();

        let mut docs = doc_set("a");
        let doc = docs.apply_changes("new", vec![change.unwrap()]).unwrap();
        assert_eq!(doc.view(), &json!({"k": "v"}));
        assert_eq!(doc.actor().as_str(), "a");
        assert!(docs.get_doc("new").is_some());
    }

    #[test]
    fn test_redelivered_changes_do_not_notify() {
        let source = DocHandle::new(Arc::new(OpSetEngine::new()), ActorId::new("src").unwrap());
        let (_, change) = source.change(&[Mutation::set(["k"], json!(1))], None).unwrap();
        let change = change.unwrap();

        let mut docs = doc_set("a");
        let count = Arc::new(Mutex::new(0));
        let c = Arc::clone(&count);
        docs.register_handler(move |_, _| *c.lock().unwrap() += 1);

        docs.apply_changes("d", vec![change.clone()]).unwrap();
        docs.apply_changes("d", vec![change]).unwrap();
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_failing_handler_does_not_block_others() {
        let mut docs = doc_set("a");
        let count = Arc::new(Mutex::new(0));
        docs.register_handler(|_, _| panic!("handler failure"));
        let c = Arc::clone(&count);
        let id = docs.register_handler(move |_, _| *c.lock().unwrap() += 1);

        let doc = DocHandle::new(Arc::clone(docs.engine()), docs.actor().clone());
        docs.set_doc("d", doc.clone());
        assert_eq!(*count.lock().unwrap(), 1);

        assert!(docs.unregister_handler(id));
        docs.set_doc("d", doc);
        assert_eq!(*count.lock().unwrap(), 1);
    }
}
