//! Vector clocks summarizing what a replica has seen.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::TandemError;
use crate::types::ActorId;

/// Mapping from actor to the highest contiguous sequence number seen from it.
///
/// Missing actors count as zero. Answering "what do you have" with a clock
/// avoids transmitting full history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Clock(BTreeMap<ActorId, u64>);

impl Clock {
    /// Create an empty clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number recorded for `actor` (0 if unknown).
    pub fn get(&self, actor: &ActorId) -> u64 {
        self.0.get(actor).copied().unwrap_or(0)
    }

    /// Record `seq` for `actor`. Zero removes the entry.
    pub fn set(&mut self, actor: ActorId, seq: u64) {
        if seq == 0 {
            self.0.remove(&actor);
        } else {
            self.0.insert(actor, seq);
        }
    }

    /// Raise the entry for `actor` to at least `seq`.
    pub fn advance(&mut self, actor: &ActorId, seq: u64) {
        if seq > self.get(actor) {
            self.0.insert(actor.clone(), seq);
        }
    }

    /// Remove the entry for `actor`.
    pub fn remove(&mut self, actor: &ActorId) {
        self.0.remove(actor);
    }

    /// Pointwise maximum of two clocks.
    pub fn union(&self, other: &Clock) -> Clock {
        let mut merged = self.clone();
        for (actor, seq) in &other.0 {
            merged.advance(actor, *seq);
        }
        merged
    }

    /// True if every entry of `other` is less than or equal to ours.
    pub fn covers(&self, other: &Clock) -> bool {
        other.0.iter().all(|(actor, seq)| self.get(actor) >= *seq)
    }

    /// True if `(actor, seq)` is reflected in this clock.
    pub fn includes(&self, actor: &ActorId, seq: u64) -> bool {
        self.get(actor) >= seq
    }

    /// Whether no actor has been seen.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of actors recorded.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over `(actor, seq)` entries in actor order.
    pub fn iter(&self) -> impl Iterator<Item = (&ActorId, u64)> {
        self.0.iter().map(|(actor, seq)| (actor, *seq))
    }

    /// Check that every actor id in the clock is well formed.
    pub fn validate(&self) -> Result<(), TandemError> {
        for actor in self.0.keys() {
            actor.validate()?;
        }
        Ok(())
    }
}

impl FromIterator<(ActorId, u64)> for Clock {
    fn from_iter<I: IntoIterator<Item = (ActorId, u64)>>(iter: I) -> Self {
        let mut clock = Clock::new();
        for (actor, seq) in iter {
            clock.advance(&actor, seq);
        }
        clock
    }
}
