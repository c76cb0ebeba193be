//! `sync` command: run the sync protocol between two snapshot files

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use tandem_core::{ActorId, Connection, DocSet, Message, OpSetEngine, Result};

use crate::cli::util::{CliContext, CliDoc, fail, print_json};

/// Upper bound on protocol rounds before giving up.
const MAX_ROUNDS: usize = 64;

type Outbox = Arc<Mutex<Vec<Message>>>;

/// One side of the exchange.
struct Side {
    docs: DocSet<OpSetEngine>,
    conn: Connection,
    outbox: Outbox,
}

impl Side {
    fn new(ctx: &CliContext, doc_id: &str, doc: CliDoc) -> Self {
        let mut docs = DocSet::new(Arc::clone(&ctx.engine), doc.actor().clone());
        docs.set_doc(doc_id, doc);
        let outbox: Outbox = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&outbox);
        let conn = Connection::new(move |msg| {
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(msg);
        });
        Self { docs, conn, outbox }
    }

    fn take(&self) -> Vec<Message> {
        std::mem::take(&mut *self.outbox.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn receive(&mut self, messages: Vec<Message>) -> Result<()> {
        for msg in messages {
            self.conn.receive_msg(&mut self.docs, msg)?;
        }
        Ok(())
    }
}

/// Exchange messages until neither side has anything to send.
/// Returns the number of messages exchanged.
fn run_protocol(a: &mut Side, b: &mut Side) -> Result<Option<usize>> {
    a.conn.open(&a.docs)?;
    b.conn.open(&b.docs)?;
    let mut exchanged = 0;
    for _ in 0..MAX_ROUNDS {
        let to_b = a.take();
        let to_a = b.take();
        if to_a.is_empty() && to_b.is_empty() {
            a.conn.close();
            b.conn.close();
            return Ok(Some(exchanged));
        }
        exchanged += to_a.len() + to_b.len();
        b.receive(to_b)?;
        a.receive(to_a)?;
    }
    Ok(None)
}

/// Handle the `sync` command
pub fn handle_sync(ctx: &CliContext, a_file: &Path, b_file: &Path) -> bool {
    let doc_id = ctx.config.default_doc.as_str();
    let load = |file: &Path| ctx.open_doc_as(file, ActorId::random());
    let (a_doc, b_doc) = match (load(a_file), load(b_file)) {
        (Ok(a), Ok(b)) => (a, b),
        (Err(e), _) | (_, Err(e)) => return fail(e),
    };

    let mut a = Side::new(ctx, doc_id, a_doc);
    let mut b = Side::new(ctx, doc_id, b_doc);
    let exchanged = match run_protocol(&mut a, &mut b) {
        Ok(Some(count)) => count,
        Ok(None) => return fail(format!("no quiescence after {} rounds", MAX_ROUNDS)),
        Err(e) => return fail(e),
    };
    log::info!("[CLI] sync settled after {} messages", exchanged);

    for (side, file) in [(&a, a_file), (&b, b_file)] {
        if let Some(doc) = side.docs.get_doc(doc_id)
            && let Err(e) = ctx.save_doc(doc, file)
        {
            return fail(e);
        }
    }

    let (Some(a_doc), Some(b_doc)) = (a.docs.get_doc(doc_id), b.docs.get_doc(doc_id)) else {
        return fail("document missing after sync");
    };
    if a_doc.view() != b_doc.view() {
        return fail("replicas did not converge");
    }
    println!("✓ Synchronized ({} messages)", exchanged);
    print_json(a_doc.view());
    true
}
