//! The bundled engine: a set of applied changes plus their materialized
//! objects.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::Engine;
use super::object::{ObjKind, ObjectStore};
use crate::change::{Change, Op, OpAction};
use crate::clock::Clock;
use crate::error::{Result, TandemError};
use crate::patch::{Patch, diff_trees};
use crate::path::{Mutation, PathSegment, format_path};
use crate::types::{ActorId, ElemRef, Key, ObjId, OpId, Value};

/// Snapshot format version written by [`OpSetEngine::save`].
const SNAPSHOT_VERSION: u32 = 1;

/// Engine state: applied history, queued changes and the object store.
///
/// Every field is behind an [`Arc`], so cloning a state is cheap and a new
/// state shares everything it did not touch with its predecessor.
#[derive(Debug, Clone)]
pub struct OpSet {
    history: Arc<Vec<Arc<Change>>>,
    by_actor: Arc<HashMap<ActorId, Vec<Arc<Change>>>>,
    queue: Arc<Vec<Arc<Change>>>,
    objects: Arc<ObjectStore>,
    clock: Clock,
    max_op: u64,
}

impl Default for OpSet {
    fn default() -> Self {
        Self {
            history: Arc::new(Vec::new()),
            by_actor: Arc::new(HashMap::new()),
            queue: Arc::new(Vec::new()),
            objects: Arc::new(ObjectStore::default()),
            clock: Clock::new(),
            max_op: 0,
        }
    }
}

impl OpSet {
    /// Clock of the applied changes.
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Number of applied changes.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Whether no change has been applied.
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Number of changes waiting for dependencies.
    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Highest operation counter seen so far.
    pub fn max_op(&self) -> u64 {
        self.max_op
    }

    fn applied(&self, actor: &ActorId, seq: u64) -> Option<&Arc<Change>> {
        let index = usize::try_from(seq.checked_sub(1)?).ok()?;
        self.by_actor.get(actor)?.get(index)
    }

    fn queued(&self, actor: &ActorId, seq: u64) -> Option<&Arc<Change>> {
        self.queue
            .iter()
            .find(|c| c.actor == *actor && c.seq == seq)
    }

    /// Add a change to the queue. Returns `false` if it is already known.
    fn enqueue(&mut self, change: Change) -> Result<bool> {
        change.validate()?;
        let known = self
            .applied(&change.actor, change.seq)
            .or_else(|| self.queued(&change.actor, change.seq));
        match known {
            Some(existing) if **existing == change => Ok(false),
            Some(_) => Err(TandemError::SequenceConflict {
                actor: change.actor,
                seq: change.seq,
            }),
            None => {
                Arc::make_mut(&mut self.queue).push(Arc::new(change));
                Ok(true)
            }
        }
    }

    fn is_ready(&self, change: &Change) -> bool {
        self.clock.get(&change.actor).checked_add(1) == Some(change.seq)
            && self.clock.covers(&change.deps)
    }

    /// Apply queued changes until none is ready.
    ///
    /// A change in `submitted` that fails to apply fails the whole call. A
    /// change left over from an earlier call is dropped instead, so it cannot
    /// block the changes it was waiting on.
    fn drain_queue(&mut self, submitted: &HashSet<(ActorId, u64)>) -> Result<usize> {
        let mut applied = 0;
        while let Some(pos) = self.queue.iter().position(|c| self.is_ready(c)) {
            let change = Arc::make_mut(&mut self.queue).remove(pos);
            if submitted.contains(&(change.actor.clone(), change.seq)) {
                self.integrate(change)?;
                applied += 1;
                continue;
            }
            let mut trial = self.clone();
            match trial.integrate(Arc::clone(&change)) {
                Ok(()) => {
                    *self = trial;
                    applied += 1;
                }
                Err(e) => log::warn!(
                    "[OpSet] dropping queued change {}/{}: {}",
                    change.actor,
                    change.seq,
                    e
                ),
            }
        }
        Ok(applied)
    }

    fn integrate(&mut self, change: Arc<Change>) -> Result<()> {
        let objects = Arc::make_mut(&mut self.objects);
        for (index, op) in change.ops.iter().enumerate() {
            objects
                .apply_op(&change.op_id(index), op)
                .map_err(|reason| {
                    TandemError::invalid_change(
                        &change.actor,
                        change.seq,
                        format!("op {index}: {reason}"),
                    )
                })?;
        }
        self.clock.set(change.actor.clone(), change.seq);
        self.max_op = self.max_op.max(change.max_op());
        Arc::make_mut(&mut self.by_actor)
            .entry(change.actor.clone())
            .or_default()
            .push(Arc::clone(&change));
        Arc::make_mut(&mut self.history).push(change);
        Ok(())
    }
}

/// Translates local mutations into operations, applying each one to a
/// scratch object store so later mutations in the batch see earlier ones.
struct OpBuilder<'a> {
    objects: ObjectStore,
    actor: &'a ActorId,
    seq: u64,
    start_op: u64,
    ops: Vec<Op>,
}

impl OpBuilder<'_> {
    fn push(&mut self, op: Op) -> Result<OpId> {
        let counter = self
            .start_op
            .checked_add(self.ops.len() as u64)
            .ok_or_else(|| {
                TandemError::invalid_change(self.actor, self.seq, "operation counter overflow")
            })?;
        let id = OpId::new(counter, self.actor.clone());
        self.objects
            .apply_op(&id, &op)
            .map_err(TandemError::InvalidPath)?;
        self.ops.push(op);
        Ok(id)
    }

    fn mutate(&mut self, mutation: &Mutation) -> Result<()> {
        match mutation {
            Mutation::Set { path, value } => {
                let (obj, key) = self.target(path)?;
                self.write(obj, key, value, false)?;
            }
            Mutation::Delete { path } => {
                let (obj, key) = self.target(path)?;
                self.push(Op {
                    obj,
                    key,
                    action: OpAction::Delete,
                })?;
            }
            Mutation::Insert { path, value } => {
                let Some((PathSegment::Index(index), parent)) = path.split_last() else {
                    return Err(TandemError::InvalidPath(format!(
                        "insert at {} must end in a list index",
                        format_path(path)
                    )));
                };
                let obj = self.object_at(parent)?;
                if self.objects.kind(&obj) != Some(ObjKind::List) {
                    return Err(TandemError::InvalidPath(format!(
                        "{} is not a list",
                        format_path(parent)
                    )));
                }
                if *index > self.objects.visible_len(&obj) {
                    return Err(out_of_range(path));
                }
                let after = match index.checked_sub(1) {
                    None => ElemRef::Head,
                    Some(prev) => ElemRef::Id(
                        self.objects
                            .visible_elem(&obj, prev)
                            .ok_or_else(|| out_of_range(path))?,
                    ),
                };
                self.write(obj, Key::Seq(after), value, true)?;
            }
        }
        Ok(())
    }

    fn object_at(&self, path: &[PathSegment]) -> Result<ObjId> {
        self.objects.resolve_object(path).map_err(|reason| {
            TandemError::InvalidPath(format!("{}: {reason}", format_path(path)))
        })
    }

    /// Resolve the register a set or delete targets.
    fn target(&self, path: &[PathSegment]) -> Result<(ObjId, Key)> {
        let Some((last, parent)) = path.split_last() else {
            return Err(TandemError::InvalidPath(
                "the root object cannot be replaced or deleted".to_string(),
            ));
        };
        let obj = self.object_at(parent)?;
        match (self.objects.kind(&obj), last) {
            (Some(ObjKind::Map), PathSegment::Key(key)) => Ok((obj, Key::Map(key.clone()))),
            (Some(ObjKind::List), PathSegment::Index(index)) => {
                let elem = self
                    .objects
                    .visible_elem(&obj, *index)
                    .ok_or_else(|| out_of_range(path))?;
                Ok((obj, Key::Seq(ElemRef::Id(elem))))
            }
            _ => Err(TandemError::InvalidPath(format!(
                "segment '{last}' does not match the object at {}",
                format_path(parent)
            ))),
        }
    }

    /// Emit the op writing `json`, followed by ops filling any nested
    /// object it creates.
    fn write(
        &mut self,
        obj: ObjId,
        key: Key,
        json: &serde_json::Value,
        insert: bool,
    ) -> Result<OpId> {
        let value = Value::from_json(json);
        let action = if insert {
            OpAction::Insert(value)
        } else {
            OpAction::Set(value)
        };
        let id = self.push(Op { obj, key, action })?;
        match json {
            serde_json::Value::Object(entries) => {
                let child = ObjId::Id(id.clone());
                for (key, value) in entries {
                    self.write(child.clone(), Key::Map(key.clone()), value, false)?;
                }
            }
            serde_json::Value::Array(items) => {
                let child = ObjId::Id(id.clone());
                let mut after = ElemRef::Head;
                for item in items {
                    let elem = self.write(child.clone(), Key::Seq(after), item, true)?;
                    after = ElemRef::Id(elem);
                }
            }
            _ => {}
        }
        Ok(id)
    }
}

fn out_of_range(path: &[PathSegment]) -> TandemError {
    TandemError::InvalidPath(format!("index out of range at {}", format_path(path)))
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    changes: Vec<&'a Change>,
    queued: Vec<&'a Change>,
}

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    changes: Vec<Change>,
    #[serde(default)]
    queued: Vec<Change>,
}

/// Engine backed by [`OpSet`] states.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpSetEngine;

impl OpSetEngine {
    /// Create the engine.
    pub fn new() -> Self {
        Self
    }
}

impl Engine for OpSetEngine {
    type State = OpSet;

    fn init(&self) -> OpSet {
        OpSet::default()
    }

    fn apply_changes(&self, state: &OpSet, changes: Vec<Change>) -> Result<(OpSet, Patch)> {
        let mut next = state.clone();
        let mut submitted = HashSet::new();
        for change in changes {
            let id = (change.actor.clone(), change.seq);
            if next.enqueue(change)? {
                submitted.insert(id);
            }
        }
        let fresh = submitted.len();
        if fresh == 0 {
            return Ok((state.clone(), Patch::empty(state.clock.clone())));
        }
        let applied = next.drain_queue(&submitted)?;
        log::debug!(
            "[OpSet] received {} new changes, applied {}, {} queued",
            fresh,
            applied,
            next.queue.len()
        );
        let patch = if applied == 0 {
            Patch::empty(next.clock.clone())
        } else {
            diff_trees(&state.objects.to_node(), &next.objects.to_node(), next.clock.clone())
        };
        Ok((next, patch))
    }

    fn apply_local_change(
        &self,
        state: &OpSet,
        actor: &ActorId,
        mutations: &[Mutation],
        message: Option<String>,
    ) -> Result<(OpSet, Change, Patch)> {
        actor.validate()?;
        let seq = state
            .clock
            .get(actor)
            .checked_add(1)
            .ok_or_else(|| TandemError::invalid_change(actor, u64::MAX, "sequence overflow"))?;
        let start_op = state
            .max_op
            .checked_add(1)
            .ok_or_else(|| TandemError::invalid_change(actor, seq, "operation counter overflow"))?;
        let mut builder = OpBuilder {
            objects: (*state.objects).clone(),
            actor,
            seq,
            start_op,
            ops: Vec::new(),
        };
        for mutation in mutations {
            builder.mutate(mutation)?;
        }

        let mut deps = state.clock.clone();
        deps.remove(actor);
        let change = Change {
            actor: actor.clone(),
            seq,
            deps,
            start_op: builder.start_op,
            time: chrono::Utc::now().timestamp_millis(),
            message,
            ops: builder.ops,
        };
        log::debug!(
            "[OpSet] local change {}/{} with {} ops",
            change.actor,
            change.seq,
            change.ops.len()
        );
        let (next, patch) = self.apply_changes(state, vec![change.clone()])?;
        Ok((next, change, patch))
    }

    fn get_changes(&self, state: &OpSet, since: &Clock) -> Vec<Change> {
        state
            .history
            .iter()
            .filter(|c| !since.includes(&c.actor, c.seq))
            .map(|c| (**c).clone())
            .collect()
    }

    fn get_changes_for_actor(&self, state: &OpSet, actor: &ActorId) -> Vec<Change> {
        state
            .by_actor
            .get(actor)
            .map(|changes| changes.iter().map(|c| (**c).clone()).collect())
            .unwrap_or_default()
    }

    fn get_queued_changes(&self, state: &OpSet) -> Vec<Change> {
        state.queue.iter().map(|c| (**c).clone()).collect()
    }

    fn get_missing_deps(&self, state: &OpSet) -> Clock {
        let mut missing = Clock::new();
        for change in state.queue.iter() {
            for (actor, seq) in change.all_deps().iter() {
                if state.clock.includes(actor, seq) || state.queued(actor, seq).is_some() {
                    continue;
                }
                missing.advance(actor, seq);
            }
        }
        missing
    }

    fn get_clock(&self, state: &OpSet) -> Clock {
        state.clock.clone()
    }

    fn materialize(&self, state: &OpSet) -> serde_json::Value {
        state.objects.to_node().to_json()
    }

    fn save(&self, state: &OpSet) -> Result<Vec<u8>> {
        let snapshot = SnapshotRef {
            version: SNAPSHOT_VERSION,
            changes: state.history.iter().map(AsRef::as_ref).collect(),
            queued: state.queue.iter().map(AsRef::as_ref).collect(),
        };
        Ok(serde_json::to_vec(&snapshot)?)
    }

    fn load(&self, bytes: &[u8]) -> Result<OpSet> {
        let snapshot: Snapshot = serde_json::from_slice(bytes)
            .map_err(|e| TandemError::InvalidSnapshot(e.to_string()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(TandemError::InvalidSnapshot(format!(
                "unsupported version {}",
                snapshot.version
            )));
        }
        let mut changes = snapshot.changes;
        changes.extend(snapshot.queued);
        let (state, _) = self.apply_changes(&self.init(), changes)?;
        log::debug!(
            "[OpSet] loaded snapshot with {} changes, {} queued",
            state.len(),
            state.queued_len()
        );
        Ok(state)
    }
}
