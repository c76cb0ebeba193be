//! Engine abstraction over the opaque replicated state.
//!
//! This module defines the [`Engine`] trait which abstracts over CRDT
//! implementations. Document handles, document sets and connections are
//! constructed with an explicit engine value; nothing reads a process-wide
//! default.
//!
//! # State model
//!
//! Engine states are values: every operation takes a state by reference and
//! returns a new one, leaving the input untouched. Cloning a state is cheap,
//! so readers can keep an old snapshot while a new one is built.
//!
//! [`OpSetEngine`] is the bundled implementation.

mod object;
mod op_set;

pub use op_set::{OpSet, OpSetEngine};

use crate::change::Change;
use crate::clock::Clock;
use crate::error::Result;
use crate::patch::Patch;
use crate::path::Mutation;
use crate::types::ActorId;

/// Trait for replicated document engines.
///
/// # Contract
///
/// - Applying an already-applied change is a no-op.
/// - Changes whose dependencies are absent are queued and reported by
///   [`get_missing_deps`](Engine::get_missing_deps) until they arrive.
/// - Every call is all-or-nothing: on error the input state is still the
///   authoritative one and nothing was applied.
/// - Two states holding the same set of changes materialize identically,
///   whatever order the changes arrived in.
pub trait Engine: Send + Sync {
    /// The opaque state value.
    type State: Clone + Send + Sync;

    /// Create an empty state.
    fn init(&self) -> Self::State;

    /// Apply remote changes.
    fn apply_changes(&self, state: &Self::State, changes: Vec<Change>)
    -> Result<(Self::State, Patch)>;

    /// Record a local edit by `actor` as a new change.
    fn apply_local_change(
        &self,
        state: &Self::State,
        actor: &ActorId,
        mutations: &[Mutation],
        message: Option<String>,
    ) -> Result<(Self::State, Change, Patch)>;

    /// Every applied change not reflected in `since`, in dependency order.
    fn get_changes(&self, state: &Self::State, since: &Clock) -> Vec<Change>;

    /// Every applied change by `actor`, in sequence order.
    fn get_changes_for_actor(&self, state: &Self::State, actor: &ActorId) -> Vec<Change>;

    /// Changes that are queued because their dependencies have not arrived.
    fn get_queued_changes(&self, state: &Self::State) -> Vec<Change>;

    /// Dependencies referenced by queued changes that are neither applied
    /// nor queued, as the highest required sequence number per actor.
    fn get_missing_deps(&self, state: &Self::State) -> Clock;

    /// Clock of the applied changes.
    fn get_clock(&self, state: &Self::State) -> Clock;

    /// Union of both histories.
    fn merge(&self, local: &Self::State, remote: &Self::State) -> Result<(Self::State, Patch)> {
        let mut changes = self.get_changes(remote, &self.get_clock(local));
        changes.extend(self.get_queued_changes(remote));
        self.apply_changes(local, changes)
    }

    /// Project the state into a plain JSON document.
    fn materialize(&self, state: &Self::State) -> serde_json::Value;

    /// Serialize the state.
    fn save(&self, state: &Self::State) -> Result<Vec<u8>>;

    /// Restore a state produced by [`save`](Engine::save).
    fn load(&self, bytes: &[u8]) -> Result<Self::State>;
}
