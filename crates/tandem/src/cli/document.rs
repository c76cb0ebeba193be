//! Document command handlers

use std::path::Path;
use std::sync::Arc;

use tandem_core::{ActorId, DocHandle, Engine, Mutation, get_history, merge};

use crate::cli::util::{CliContext, fail, format_time, print_json};

/// Handle the `new` command
pub fn handle_new(ctx: &CliContext, file: &Path, force: bool) -> bool {
    if ctx.resolve(file).exists() && !force {
        return fail(format!(
            "{} already exists (use --force to overwrite)",
            file.display()
        ));
    }
    let actor = match ctx.actor() {
        Ok(actor) => actor,
        Err(e) => return fail(e),
    };
    let doc = DocHandle::new(Arc::clone(&ctx.engine), actor);
    match ctx.save_doc(&doc, file) {
        Ok(()) => {
            println!("✓ Created {}", file.display());
            true
        }
        Err(e) => fail(e),
    }
}

/// Handle the `show` command
pub fn handle_show(ctx: &CliContext, file: &Path, verbose: bool) -> bool {
    let doc = match ctx.open_doc_as(file, ActorId::random()) {
        Ok(doc) => doc,
        Err(e) => return fail(e),
    };
    print_json(doc.view());
    if verbose {
        let engine = doc.engine();
        println!();
        println!("Clock:");
        for (actor, seq) in doc.clock().iter() {
            println!("  {}: {}", actor, seq);
        }
        let queued = engine.get_queued_changes(doc.state());
        if !queued.is_empty() {
            println!("Queued changes: {}", queued.len());
            for (actor, seq) in engine.get_missing_deps(doc.state()).iter() {
                println!("  waiting on {} up to {}", actor, seq);
            }
        }
    }
    true
}

/// Handle `set`, `insert` and `delete`
pub fn handle_mutation(
    ctx: &CliContext,
    file: &Path,
    mutation: Mutation,
    message: Option<String>,
) -> bool {
    let doc = match ctx.open_doc(file) {
        Ok(doc) => doc,
        Err(e) => return fail(e),
    };
    let (doc, change) = match doc.change(&[mutation], message) {
        Ok(result) => result,
        Err(e) => return fail(e),
    };
    if let Err(e) = ctx.save_doc(&doc, file) {
        return fail(e);
    }
    if let Some(change) = change {
        println!(
            "✓ Recorded change {}/{} ({} ops)",
            change.actor,
            change.seq,
            change.ops.len()
        );
    }
    print_json(doc.view());
    true
}

/// Handle the `merge` command
pub fn handle_merge(ctx: &CliContext, file: &Path, from: &Path) -> bool {
    let local = match ctx.open_doc(file) {
        Ok(doc) => doc,
        Err(e) => return fail(e),
    };
    // The source is only read, so any distinct actor will do
    let remote = match ctx.open_doc_as(from, ActorId::random()) {
        Ok(doc) => doc,
        Err(e) => return fail(e),
    };
    let merged = match merge(&local, &remote) {
        Ok(doc) => doc,
        Err(e) => return fail(e),
    };
    if merged.ptr_eq(&local) {
        println!("Already up to date");
        return true;
    }
    if let Err(e) = ctx.save_doc(&merged, file) {
        return fail(e);
    }
    println!("✓ Merged {} into {}", from.display(), file.display());
    print_json(merged.view());
    true
}

/// Handle the `history` command
pub fn handle_history(ctx: &CliContext, file: &Path, limit: Option<usize>, snapshots: bool) -> bool {
    let doc = match ctx.open_doc_as(file, ActorId::random()) {
        Ok(doc) => doc,
        Err(e) => return fail(e),
    };
    let history = get_history(&doc);
    let skip = limit.map_or(0, |limit| history.len().saturating_sub(limit));
    for entry in history.iter().skip(skip) {
        let change = entry.change();
        println!(
            "#{} {}/{} {} ({} ops){}",
            entry.index(),
            change.actor,
            change.seq,
            format_time(change.time),
            change.ops.len(),
            change
                .message
                .as_deref()
                .map(|m| format!(" - {}", m))
                .unwrap_or_default()
        );
        if snapshots {
            match entry.snapshot() {
                Ok(view) => print_json(view),
                Err(e) => return fail(e),
            }
        }
    }
    true
}
