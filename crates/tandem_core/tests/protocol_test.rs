//! Integration tests for the sync protocol over a JSON wire

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::json;
use tandem_core::{
    ActorId, Connection, ConnectionState, DocHandle, DocSet, ErrorKind, Message, Mutation,
    OpSetEngine, TandemError, WatchableDoc,
};

/// A peer whose outgoing messages are captured as JSON text.
struct Peer {
    docs: DocSet<OpSetEngine>,
    conn: Connection,
    wire: Arc<Mutex<Vec<String>>>,
}

impl Peer {
    fn new(engine: &Arc<OpSetEngine>, actor: &str) -> Self {
        let wire = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&wire);
        let conn = Connection::new(move |msg: Message| {
            sink.lock().unwrap().push(msg.to_json().unwrap());
        });
        Self {
            docs: DocSet::new(Arc::clone(engine), ActorId::new(actor).unwrap()),
            conn,
            wire,
        }
    }

    fn edit(&mut self, doc_id: &str, mutation: Mutation) {
        let current = self
            .docs
            .get_doc(doc_id)
            .cloned()
            .unwrap_or_else(|| DocHandle::new(Arc::clone(self.docs.engine()), self.docs.actor().clone()));
        let (next, _) = current.change(&[mutation], None).unwrap();
        self.docs.set_doc(doc_id, next);
        self.conn.doc_changed(&self.docs, doc_id);
    }

    fn outbox(&self) -> Vec<String> {
        std::mem::take(&mut *self.wire.lock().unwrap())
    }

    fn receive(&mut self, raw: Vec<String>) {
        for text in raw {
            let msg = Message::from_json(&text).unwrap();
            self.conn.receive_msg(&mut self.docs, msg).unwrap();
        }
    }
}

/// Ping-pong until both outboxes are empty. Returns the number of messages.
fn settle(a: &mut Peer, b: &mut Peer) -> usize {
    let mut total = 0;
    for _ in 0..32 {
        let to_b = a.outbox();
        let to_a = b.outbox();
        if to_a.is_empty() && to_b.is_empty() {
            return total;
        }
        total += to_a.len() + to_b.len();
        b.receive(to_b);
        a.receive(to_a);
    }
    panic!("peers never went quiet");
}

#[test]
fn test_peers_sync_several_documents() {
    let engine = Arc::new(OpSetEngine::new());
    let mut a = Peer::new(&engine, "alice");
    let mut b = Peer::new(&engine, "bob");
    a.edit("notes", Mutation::set(["title"], json!("Shopping")));
    a.edit("todo", Mutation::set(["items"], json!(["milk"])));
    b.edit("notes", Mutation::set(["owner"], json!("bob")));

    a.conn.open(&a.docs).unwrap();
    b.conn.open(&b.docs).unwrap();
    assert!(settle(&mut a, &mut b) > 0);

    for doc_id in ["notes", "todo"] {
        let left = a.docs.get_doc(doc_id).unwrap();
        let right = b.docs.get_doc(doc_id).unwrap();
        assert_eq!(left.view(), right.view(), "{doc_id}");
        assert_eq!(left.clock(), right.clock(), "{doc_id}");
    }
    assert_eq!(
        a.docs.get_doc("notes").unwrap().view(),
        &json!({"title": "Shopping", "owner": "bob"})
    );
}

#[test]
fn test_edits_after_open_propagate_via_doc_changed() {
    let engine = Arc::new(OpSetEngine::new());
    let mut a = Peer::new(&engine, "alice");
    let mut b = Peer::new(&engine, "bob");
    a.edit("doc", Mutation::set(["n"], json!(1)));
    a.conn.open(&a.docs).unwrap();
    b.conn.open(&b.docs).unwrap();
    settle(&mut a, &mut b);

    b.edit("doc", Mutation::set(["n"], json!(2)));
    settle(&mut a, &mut b);
    assert_eq!(a.docs.get_doc("doc").unwrap().view(), &json!({"n": 2}));

    // Nothing new: a quiet network stays quiet
    assert!(!a.conn.doc_changed(&a.docs, "doc"));
    assert_eq!(settle(&mut a, &mut b), 0);
}

#[test]
fn test_redelivered_messages_do_not_notify_or_loop() {
    let engine = Arc::new(OpSetEngine::new());
    let mut a = Peer::new(&engine, "alice");
    let mut b = Peer::new(&engine, "bob");
    a.edit("doc", Mutation::set(["x"], json!(true)));
    a.conn.open(&a.docs).unwrap();
    b.conn.open(&b.docs).unwrap();

    let notified = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&notified);
    b.docs.register_handler(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    // announce, request, then the reply carrying changes
    b.receive(a.outbox());
    a.receive(b.outbox());
    let reply = a.outbox();
    assert!(!reply.is_empty());
    b.receive(reply.clone());
    assert_eq!(notified.load(Ordering::SeqCst), 1);
    b.receive(reply);
    assert_eq!(notified.load(Ordering::SeqCst), 1);
    settle(&mut a, &mut b);
    assert_eq!(b.docs.get_doc("doc").unwrap().view(), &json!({"x": true}));
}

#[test]
fn test_closed_connection_rejects_without_side_effects() {
    let engine = Arc::new(OpSetEngine::new());
    let mut a = Peer::new(&engine, "alice");
    let mut b = Peer::new(&engine, "bob");
    a.edit("doc", Mutation::set(["x"], json!(1)));
    a.conn.open(&a.docs).unwrap();
    b.conn.open(&b.docs).unwrap();
    let pending = a.outbox();

    b.conn.close();
    assert_eq!(b.conn.state(), ConnectionState::Closed);
    for text in pending {
        let err = b
            .conn
            .receive_msg(&mut b.docs, Message::from_json(&text).unwrap())
            .unwrap_err();
        assert!(matches!(err, TandemError::ConnectionClosed));
        assert_eq!(err.kind(), ErrorKind::Connection);
    }
    assert!(b.docs.get_doc("doc").is_none());
    assert!(b.outbox().is_empty());
}

#[test]
fn test_malformed_messages_are_rejected() {
    assert!(matches!(
        Message::from_json(r#"{"clock":{},"changes":[]}"#),
        Err(TandemError::InvalidMessage(_))
    ));
    assert!(matches!(
        Message::from_json(r#"{"docId":"doc","clock":{"":1}}"#),
        Err(TandemError::InvalidActorId(_))
    ));

    let engine = Arc::new(OpSetEngine::new());
    let mut b = Peer::new(&engine, "bob");
    b.conn.open(&b.docs).unwrap();
    let err = b
        .conn
        .receive_msg(&mut b.docs, Message::announce("", Default::default()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(b.conn.their_clock("").is_none());
    assert_eq!(b.conn.state(), ConnectionState::Open);
}

#[test]
fn test_panicking_handler_does_not_block_others() {
    let engine = Arc::new(OpSetEngine::new());
    let doc = DocHandle::new(Arc::clone(&engine), ActorId::new("w").unwrap());
    let mut watched = WatchableDoc::new(doc.clone());

    let seen = Arc::new(Mutex::new(Vec::new()));
    watched.register_handler(|_| panic!("handler failure"));
    let sink = Arc::clone(&seen);
    watched.register_handler(move |handle: &DocHandle<OpSetEngine>| {
        sink.lock().unwrap().push(handle.view().clone());
    });

    let (_, change) = DocHandle::new(Arc::clone(&engine), ActorId::new("src").unwrap())
        .change(&[Mutation::set(["k"], json!("v"))], None)
        .unwrap();
    let current = watched.apply_changes(vec![change.unwrap()]).unwrap();
    assert_eq!(current.view(), &json!({"k": "v"}));
    assert_eq!(seen.lock().unwrap().as_slice(), &[json!({"k": "v"})]);
}
