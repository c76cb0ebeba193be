//! Peer synchronization protocol.
//!
//! A [`Connection`] keeps one peer up to date with the documents of a
//! [`DocSet`]. It remembers, per document, the clock it last announced to
//! the peer and the clock the peer last declared, and uses the difference to
//! decide which changes to send.
//!
//! # Protocol
//!
//! 1. [`open`](Connection::open) announces the local clock of every document
//!    (a clock-only handshake).
//! 2. Each received message records the peer's clock, applies any changes it
//!    carries, and replies with whatever the peer is still missing. A peer
//!    that declared an empty clock receives the full history.
//! 3. If received changes are waiting on dependencies, the local clock is
//!    re-announced once per distinct set of missing dependencies so the peer
//!    can fill the gap.
//!
//! The exchange is quiescent when a round trip produces no message on either
//! side. Delivery may be duplicated or reordered; the engine's idempotent
//! application makes that safe.
//!
//! The connection does not own the document set. Every call borrows it, and
//! the embedder calls [`doc_changed`](Connection::doc_changed) from a
//! [`DocSet`] handler so local edits reach the peer.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::change::Change;
use crate::clock::Clock;
use crate::doc_set::DocSet;
use crate::engine::Engine;
use crate::error::{Result, TandemError};
use crate::handle::DocHandle;
use crate::message::Message;

/// Outbound transport callback. Fire-and-forget.
pub type SendFn = Arc<dyn Fn(Message) + Send + Sync>;

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    /// Created but not yet opened.
    Ready,
    /// Exchanging messages.
    Open,
    /// Closed for good.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Ready => "ready",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        })
    }
}

/// Session with one remote peer.
pub struct Connection {
    send: SendFn,
    state: ConnectionState,
    /// Clock last announced to the peer, per document.
    our_clock: HashMap<String, Clock>,
    /// Clock the peer last declared (or is assumed to have), per document.
    their_clock: HashMap<String, Clock>,
    /// Missing dependencies last requested, per document.
    requested: HashMap<String, Clock>,
}

impl Connection {
    /// Create a connection that sends through `send`.
    pub fn new<F>(send: F) -> Self
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        Self::with_sender(Arc::new(send))
    }

    /// Create a connection from a shared send callback.
    pub fn with_sender(send: SendFn) -> Self {
        Self {
            send,
            state: ConnectionState::Ready,
            our_clock: HashMap::new(),
            their_clock: HashMap::new(),
            requested: HashMap::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Clock last announced to the peer for `doc_id`.
    pub fn our_clock(&self, doc_id: &str) -> Option<&Clock> {
        self.our_clock.get(doc_id)
    }

    /// Clock the peer is known to have for `doc_id`.
    pub fn their_clock(&self, doc_id: &str) -> Option<&Clock> {
        self.their_clock.get(doc_id)
    }

    /// Start the session and announce every document.
    pub fn open<E: Engine>(&mut self, docs: &DocSet<E>) -> Result<()> {
        if self.state != ConnectionState::Ready {
            return Err(TandemError::ConnectionState {
                action: "open".to_string(),
                state: self.state.to_string(),
            });
        }
        self.state = ConnectionState::Open;
        let mut ids: Vec<&str> = docs.doc_ids().collect();
        ids.sort_unstable();
        log::debug!("[Connection] open, announcing {} documents", ids.len());
        for doc_id in ids {
            if let Some(doc) = docs.get_doc(doc_id) {
                self.maybe_send_changes(doc_id, doc);
            }
        }
        Ok(())
    }

    /// End the session. Nothing is flushed.
    pub fn close(&mut self) {
        if self.state != ConnectionState::Closed {
            log::debug!("[Connection] closed");
        }
        self.state = ConnectionState::Closed;
    }

    /// Notify the connection that `doc_id` changed locally.
    ///
    /// Returns `true` if a message was sent. A no-op unless open.
    pub fn doc_changed<E: Engine>(&mut self, docs: &DocSet<E>, doc_id: &str) -> bool {
        if self.state != ConnectionState::Open {
            return false;
        }
        match docs.get_doc(doc_id) {
            Some(doc) => self.maybe_send_changes(doc_id, doc),
            None => false,
        }
    }

    /// Handle one message from the peer.
    ///
    /// Returns the document's handle after the message was processed, or
    /// `None` if the document is still unknown locally. Malformed messages
    /// and rejected change batches are returned as errors; the connection
    /// stays open and other documents are untouched.
    pub fn receive_msg<E: Engine>(
        &mut self,
        docs: &mut DocSet<E>,
        msg: Message,
    ) -> Result<Option<DocHandle<E>>> {
        match self.state {
            ConnectionState::Open => {}
            ConnectionState::Closed => return Err(TandemError::ConnectionClosed),
            ConnectionState::Ready => {
                return Err(TandemError::ConnectionState {
                    action: "receive".to_string(),
                    state: self.state.to_string(),
                });
            }
        }
        msg.validate()?;
        let Message {
            doc_id,
            clock,
            changes,
        } = msg;
        log::debug!(
            "[Connection] received '{}' with {} changes",
            doc_id,
            changes.len()
        );
        self.their_clock.insert(doc_id.clone(), clock);

        let applied = !changes.is_empty();
        if applied {
            docs.apply_changes(&doc_id, changes)?;
        }

        let sent = match docs.get_doc(&doc_id) {
            Some(doc) => self.maybe_send_changes(&doc_id, doc),
            None if !self.our_clock.contains_key(&doc_id) => {
                // Ask for a document we have never seen.
                self.send_msg(&doc_id, Clock::new(), Vec::new());
                true
            }
            None => false,
        };

        if let Some(doc) = docs.get_doc(&doc_id) {
            let missing = doc.engine().get_missing_deps(doc.state());
            if missing.is_empty() {
                self.requested.remove(&doc_id);
            } else if (applied || sent) && self.requested.get(&doc_id) != Some(&missing) {
                // Any announcement of our clock doubles as the request.
                log::debug!("[Connection] '{}' waiting on {:?}", doc_id, missing);
                if !sent {
                    self.send_msg(&doc_id, doc.clock(), Vec::new());
                }
                self.requested.insert(doc_id.clone(), missing);
            }
        }

        Ok(docs.get_doc(&doc_id).cloned())
    }

    fn maybe_send_changes<E: Engine>(&mut self, doc_id: &str, doc: &DocHandle<E>) -> bool {
        let clock = doc.clock();
        if let Some(theirs) = self.their_clock.get(doc_id) {
            let changes = doc.engine().get_changes(doc.state(), theirs);
            if !changes.is_empty() {
                let assumed = theirs.union(&clock);
                self.their_clock.insert(doc_id.to_string(), assumed);
                self.send_msg(doc_id, clock, changes);
                return true;
            }
        }
        if self.our_clock.get(doc_id) != Some(&clock) {
            self.send_msg(doc_id, clock, Vec::new());
            return true;
        }
        false
    }

    fn send_msg(&mut self, doc_id: &str, clock: Clock, changes: Vec<Change>) {
        log::debug!(
            "[Connection] sending '{}' with {} changes",
            doc_id,
            changes.len()
        );
        self.our_clock.insert(doc_id.to_string(), clock.clone());
        (self.send)(Message::with_changes(doc_id, clock, changes));
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("our_clock", &self.our_clock)
            .field("their_clock", &self.their_clock)
            .finish()
    }
}
