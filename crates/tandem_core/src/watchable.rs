//! Single-document wrapper with change notification.

use std::sync::Arc;

use crate::change::Change;
use crate::engine::Engine;
use crate::error::Result;
use crate::handle::DocHandle;
use crate::registry::{HandlerId, HandlerRegistry};

/// Callback invoked with the new handle.
pub type WatchHandler<E> = dyn Fn(&DocHandle<E>) + Send + Sync;

/// Holds the current handle of one document and notifies handlers on every
/// replacement. Handlers must not rely on invocation order.
pub struct WatchableDoc<E: Engine> {
    doc: DocHandle<E>,
    handlers: HandlerRegistry<WatchHandler<E>>,
}

impl<E: Engine> WatchableDoc<E> {
    /// Wrap a handle.
    pub fn new(doc: DocHandle<E>) -> Self {
        Self {
            doc,
            handlers: HandlerRegistry::new(),
        }
    }

    /// The current handle.
    pub fn get(&self) -> &DocHandle<E> {
        &self.doc
    }

    /// Replace the handle and notify every handler.
    pub fn set(&mut self, doc: DocHandle<E>) {
        self.doc = doc;
        let current = &self.doc;
        let failed = self.handlers.emit(|handler| handler(current));
        if failed > 0 {
            log::warn!("[WatchableDoc] {} handler(s) failed", failed);
        }
    }

    /// Apply changes to the current handle, then [`set`](Self::set) the
    /// result.
    pub fn apply_changes(&mut self, changes: Vec<Change>) -> Result<&DocHandle<E>> {
        let next = self.doc.apply_changes(changes)?;
        self.set(next);
        Ok(&self.doc)
    }

    /// Register a handler.
    pub fn register_handler<F>(&mut self, handler: F) -> HandlerId
    where
        F: Fn(&DocHandle<E>) + Send + Sync + 'static,
    {
        self.handlers.register(Arc::new(handler))
    }

    /// Remove a handler. Returns `true` if it was registered.
    pub fn unregister_handler(&mut self, id: HandlerId) -> bool {
        self.handlers.unregister(id)
    }
}
