//! Immutable change records.
//!
//! A [`Change`] is the unit of replication: a batch of operations issued by one
//! actor, tagged with its per-actor sequence number and the clock of changes
//! it causally depends on.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::clock::Clock;
use crate::error::{Result, TandemError};
use crate::types::{ActorId, ElemRef, Key, ObjId, OpId, Value};

/// What an operation does to its target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub enum OpAction {
    /// Write a value to a map property or an existing list element.
    Set(Value),
    /// Remove a map property or list element.
    Delete,
    /// Insert a new list element after the referenced position.
    Insert(Value),
}

/// A single primitive operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Op {
    /// Object the operation applies to.
    pub obj: ObjId,
    /// Property or list position within the object.
    pub key: Key,
    /// The operation itself.
    pub action: OpAction,
}

impl Op {
    /// Check the op's shape without looking at any document state.
    fn check_shape(&self) -> std::result::Result<(), &'static str> {
        match (&self.action, &self.key) {
            (OpAction::Insert(_), Key::Seq(_)) => Ok(()),
            (OpAction::Insert(_), Key::Map(_)) => Err("insert must target a list position"),
            (_, Key::Seq(ElemRef::Head)) => Err("set/delete cannot target the list head"),
            _ => Ok(()),
        }
    }
}

/// An immutable unit of document mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct Change {
    /// Actor that created the change.
    pub actor: ActorId,
    /// Per-actor sequence number, starting at 1.
    pub seq: u64,
    /// Changes this one depends on, besides `(actor, seq - 1)`.
    pub deps: Clock,
    /// Lamport counter of the first operation.
    pub start_op: u64,
    /// Creation time, milliseconds since the Unix epoch.
    pub time: i64,
    /// Optional human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Operations in application order.
    pub ops: Vec<Op>,
}

impl Change {
    /// Id of the `index`-th operation in this change.
    pub fn op_id(&self, index: usize) -> OpId {
        OpId::new(self.start_op.saturating_add(index as u64), self.actor.clone())
    }

    /// Lamport counter of the last operation (or `start_op - 1` if empty).
    pub fn max_op(&self) -> u64 {
        self.start_op
            .saturating_add(self.ops.len() as u64)
            .saturating_sub(1)
    }

    /// All dependencies including the implicit one on the previous change by
    /// the same actor.
    pub fn all_deps(&self) -> Clock {
        let mut deps = self.deps.clone();
        deps.advance(&self.actor, self.seq.saturating_sub(1));
        deps
    }

    /// Structural validation that needs no document state.
    ///
    /// Fails with a validation error for malformed fields and with a
    /// causality error when the change depends on itself or a later change
    /// of its own actor.
    pub fn validate(&self) -> Result<()> {
        self.actor.validate()?;
        self.deps.validate()?;
        if self.seq == 0 {
            return Err(TandemError::invalid_change(
                &self.actor,
                self.seq,
                "sequence numbers start at 1",
            ));
        }
        if self.start_op == 0 {
            return Err(TandemError::invalid_change(
                &self.actor,
                self.seq,
                "operation counters start at 1",
            ));
        }
        if self.start_op.checked_add(self.ops.len() as u64).is_none() {
            return Err(TandemError::invalid_change(
                &self.actor,
                self.seq,
                "operation counter overflow",
            ));
        }
        if self.deps.get(&self.actor) >= self.seq {
            return Err(TandemError::SequenceConflict {
                actor: self.actor.clone(),
                seq: self.seq,
            });
        }
        for (index, op) in self.ops.iter().enumerate() {
            op.check_shape().map_err(|reason| {
                TandemError::invalid_change(&self.actor, self.seq, format!("op {index}: {reason}"))
            })?;
        }
        Ok(())
    }
}
