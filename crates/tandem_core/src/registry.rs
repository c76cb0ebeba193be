//! Handler registry shared by [`DocSet`](crate::DocSet) and
//! [`WatchableDoc`](crate::WatchableDoc).
//!
//! Handlers are kept in registration order and invoked synchronously. A
//! panicking handler is caught and logged so the remaining handlers still
//! run.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use indexmap::IndexMap;

/// A unique identifier for a registered handler.
pub type HandlerId = u64;

/// Ordered set of handlers of type `F` (usually a `dyn Fn` trait object).
pub struct HandlerRegistry<F: ?Sized> {
    handlers: IndexMap<HandlerId, Arc<F>>,
    next_id: HandlerId,
}

impl<F: ?Sized> HandlerRegistry<F> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: IndexMap::new(),
            next_id: 1,
        }
    }

    /// Register a handler and return its id.
    pub fn register(&mut self, handler: Arc<F>) -> HandlerId {
        let id = self.next_id;
        self.next_id += 1;
        self.handlers.insert(id, handler);
        id
    }

    /// Remove a handler. Returns `true` if it was registered.
    pub fn unregister(&mut self, id: HandlerId) -> bool {
        self.handlers.shift_remove(&id).is_some()
    }

    /// Invoke every handler through `call`, in registration order.
    ///
    /// Returns the number of handlers that panicked.
    pub fn emit(&self, mut call: impl FnMut(&F)) -> usize {
        let mut failed = 0;
        for (id, handler) in &self.handlers {
            if catch_unwind(AssertUnwindSafe(|| call(handler))).is_err() {
                log::warn!("[Handlers] handler {} panicked; continuing", id);
                failed += 1;
            }
        }
        failed
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<F: ?Sized> Default for HandlerRegistry<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> std::fmt::Debug for HandlerRegistry<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handler_count", &self.handlers.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Handler = dyn Fn(&str) + Send + Sync;

    #[test]
    fn test_emit_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry: HandlerRegistry<Handler> = HandlerRegistry::new();
        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            registry.register(Arc::new(move |event: &str| {
                seen.lock().unwrap().push(format!("{tag}:{event}"));
            }));
        }

        registry.emit(|handler| handler("x"));

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["first:x", "second:x", "third:x"]
        );
    }

    #[test]
    fn test_unregister() {
        let mut registry: HandlerRegistry<Handler> = HandlerRegistry::new();
        let id = registry.register(Arc::new(|_: &str| {}));
        assert_eq!(registry.len(), 1);
        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut registry: HandlerRegistry<Handler> = HandlerRegistry::new();
        let a = registry.register(Arc::new(|_: &str| {}));
        registry.unregister(a);
        let b = registry.register(Arc::new(|_: &str| {}));
        assert_ne!(a, b);
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let count = Arc::new(Mutex::new(0));
        let mut registry: HandlerRegistry<Handler> = HandlerRegistry::new();
        registry.register(Arc::new(|_: &str| panic!("boom")));
        let c = Arc::clone(&count);
        registry.register(Arc::new(move |_: &str| *c.lock().unwrap() += 1));

        let failed = registry.emit(|handler| handler("x"));

        assert_eq!(failed, 1);
        assert_eq!(*count.lock().unwrap(), 1);
    }
}
