//! In-process replica network for simulation and tests.
//!
//! A [`Mesh`] connects `n` replicas pairwise. Every outbound message lands in
//! one shared wire queue; the caller decides which message is delivered
//! next, or duplicates one, to exercise reordering and redelivery. Each
//! replica's [`DocSet`] handler records changed documents, and the mesh
//! forwards them to that replica's connections after every step.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use crate::change::Change;
use crate::connection::Connection;
use crate::doc_set::DocSet;
use crate::engine::Engine;
use crate::error::Result;
use crate::handle::DocHandle;
use crate::message::Message;
use crate::path::Mutation;
use crate::types::ActorId;

/// A message in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Sending replica.
    pub from: usize,
    /// Receiving replica.
    pub to: usize,
    /// The message.
    pub msg: Message,
}

type Wire = Arc<Mutex<VecDeque<Envelope>>>;

struct Replica<E: Engine> {
    docs: DocSet<E>,
    links: BTreeMap<usize, Connection>,
    changed: Arc<Mutex<Vec<String>>>,
}

/// A fully connected set of in-process replicas.
pub struct Mesh<E: Engine + 'static> {
    replicas: Vec<Replica<E>>,
    wire: Wire,
}

impl<E: Engine + 'static> Mesh<E> {
    /// Create `n` replicas named `replica-0` .. `replica-{n-1}` and open a
    /// connection between every pair.
    pub fn new(engine: Arc<E>, n: usize) -> Result<Self> {
        let wire: Wire = Arc::new(Mutex::new(VecDeque::new()));
        let mut replicas = Vec::with_capacity(n);
        for index in 0..n {
            let actor = ActorId::new(format!("replica-{index}"))?;
            let mut docs = DocSet::new(Arc::clone(&engine), actor);
            let changed = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&changed);
            docs.register_handler(move |doc_id, _| {
                lock(&sink).push(doc_id.to_string());
            });

            let mut links = BTreeMap::new();
            for peer in (0..n).filter(|&peer| peer != index) {
                let wire = Arc::clone(&wire);
                let mut conn = Connection::new(move |msg| {
                    lock(&wire).push_back(Envelope {
                        from: index,
                        to: peer,
                        msg,
                    });
                });
                conn.open(&docs)?;
                links.insert(peer, conn);
            }
            replicas.push(Replica {
                docs,
                links,
                changed,
            });
        }
        log::debug!("[Mesh] created {} replicas", n);
        Ok(Self { replicas, wire })
    }

    /// Number of replicas.
    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    /// Whether the mesh has no replicas.
    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// The document set of a replica.
    ///
    /// # Panics
    ///
    /// Panics if `replica` is out of range.
    pub fn doc_set(&self, replica: usize) -> &DocSet<E> {
        &self.replicas[replica].docs
    }

    /// Edit a document on one replica, creating it if needed, and gossip
    /// the change to its peers.
    ///
    /// # Panics
    ///
    /// Panics if `replica` is out of range.
    pub fn change(
        &mut self,
        replica: usize,
        doc_id: &str,
        mutations: &[Mutation],
    ) -> Result<Option<Change>> {
        let node = &mut self.replicas[replica];
        let doc = match node.docs.get_doc(doc_id) {
            Some(doc) => doc.clone(),
            None => DocHandle::new(Arc::clone(node.docs.engine()), node.docs.actor().clone()),
        };
        let (next, change) = doc.change(mutations, None)?;
        if change.is_some() {
            node.docs.set_doc(doc_id, next);
        }
        self.flush(replica);
        Ok(change)
    }

    /// Number of messages in flight.
    pub fn pending(&self) -> usize {
        lock(&self.wire).len()
    }

    /// Snapshot of the messages in flight.
    pub fn in_flight(&self) -> Vec<Envelope> {
        lock(&self.wire).iter().cloned().collect()
    }

    /// Deliver the in-flight message at `index`. Returns `false` if there is
    /// no such message.
    pub fn deliver(&mut self, index: usize) -> Result<bool> {
        let Some(envelope) = lock(&self.wire).remove(index) else {
            return Ok(false);
        };
        let Envelope { from, to, msg } = envelope;
        let node = &mut self.replicas[to];
        if let Some(conn) = node.links.get_mut(&from) {
            conn.receive_msg(&mut node.docs, msg)?;
        }
        self.flush(to);
        Ok(true)
    }

    /// Put a second copy of the in-flight message at `index` on the wire.
    pub fn duplicate(&mut self, index: usize) -> bool {
        let mut wire = lock(&self.wire);
        match wire.get(index).cloned() {
            Some(envelope) => {
                wire.push_back(envelope);
                true
            }
            None => false,
        }
    }

    /// Deliver the oldest in-flight message.
    pub fn deliver_next(&mut self) -> Result<bool> {
        self.deliver(0)
    }

    /// Deliver messages in order until the wire is empty or `max` messages
    /// were delivered. Returns the number delivered.
    pub fn drain(&mut self, max: usize) -> Result<usize> {
        let mut delivered = 0;
        while delivered < max && self.deliver_next()? {
            delivered += 1;
        }
        Ok(delivered)
    }

    /// The rendered document on one replica.
    pub fn view(&self, replica: usize, doc_id: &str) -> Option<&serde_json::Value> {
        self.replicas
            .get(replica)?
            .docs
            .get_doc(doc_id)
            .map(DocHandle::view)
    }

    /// Whether every replica renders `doc_id` identically.
    pub fn converged(&self, doc_id: &str) -> bool {
        let mut views = self.replicas.iter().map(|r| r.docs.get_doc(doc_id).map(DocHandle::view));
        match views.next() {
            Some(first) => views.all(|view| view == first),
            None => true,
        }
    }

    /// Forward documents changed on `replica` to all of its connections.
    fn flush(&mut self, replica: usize) {
        let node = &mut self.replicas[replica];
        let changed = std::mem::take(&mut *lock(&node.changed));
        for doc_id in changed {
            for conn in node.links.values_mut() {
                conn.doc_changed(&node.docs, &doc_id);
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::OpSetEngine;
    use serde_json::json;

    fn mesh(n: usize) -> Mesh<OpSetEngine> {
        Mesh::new(Arc::new(OpSetEngine::new()), n).unwrap()
    }

    #[test]
    fn test_new_mesh_is_quiet() {
        let mesh = mesh(3);
        assert_eq!(mesh.len(), 3);
        assert_eq!(mesh.pending(), 0);
        assert!(mesh.converged("doc"));
    }

    #[test]
    fn test_change_propagates_to_every_replica() {
        let mut mesh = mesh(3);
        mesh.change(0, "doc", &[Mutation::set(["x"], json!(1))])
            .unwrap();
        assert!(mesh.pending() > 0);
        mesh.drain(1_000).unwrap();
        assert_eq!(mesh.pending(), 0);
        assert!(mesh.converged("doc"));
        assert_eq!(mesh.view(2, "doc"), Some(&json!({"x": 1})));
    }

    #[test]
    fn test_duplicates_and_reordering_converge() {
        let mut mesh = mesh(3);
        mesh.change(0, "doc", &[Mutation::set(["a"], json!(1))]).unwrap();
        mesh.change(1, "doc", &[Mutation::set(["b"], json!(2))]).unwrap();
        assert!(mesh.duplicate(0));
        // Deliver newest first for a while.
        for _ in 0..5 {
            let last = mesh.pending().saturating_sub(1);
            mesh.deliver(last).unwrap();
        }
        mesh.drain(1_000).unwrap();
        assert!(mesh.converged("doc"));
        assert_eq!(mesh.view(0, "doc"), Some(&json!({"a": 1, "b": 2})));
    }

    #[test]
    fn test_deliver_out_of_range() {
        let mut mesh = mesh(2);
        assert!(!mesh.deliver(3).unwrap());
        assert!(!mesh.duplicate(0));
    }
}
