//! Single-process merge and diff between document handles.

use crate::engine::Engine;
use crate::error::{Result, TandemError};
use crate::handle::DocHandle;
use crate::patch::Patch;

/// Bring `remote`'s changes into `local`.
///
/// Fails with [`TandemError::SelfMerge`] if both handles are edited by the
/// same actor; neither handle is touched. If `remote` contributes nothing
/// new, `local` itself is returned (see [`DocHandle::ptr_eq`]).
pub fn merge<E: Engine>(local: &DocHandle<E>, remote: &DocHandle<E>) -> Result<DocHandle<E>> {
    if local.actor() == remote.actor() {
        return Err(TandemError::SelfMerge(local.actor().clone()));
    }
    let engine = local.engine();
    let mut changes = engine.get_changes(remote.state(), &local.clock());
    changes.extend(engine.get_queued_changes(remote.state()));
    if changes.is_empty() {
        return Ok(local.clone());
    }
    log::debug!(
        "[Merge] {} <- {}: {} candidate changes",
        local.actor(),
        remote.actor(),
        changes.len()
    );
    local.apply_changes(changes)
}

/// What applying `new`'s extra changes to `old` would change, without
/// modifying either handle.
pub fn diff<E: Engine>(old: &DocHandle<E>, new: &DocHandle<E>) -> Result<Patch> {
    let engine = old.engine();
    let changes = engine.get_changes(new.state(), &old.clock());
    if changes.is_empty() {
        return Ok(Patch::empty(old.clock()));
    }
    let (_, patch) = engine.apply_changes(old.state(), changes)?;
    Ok(patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::OpSetEngine;
    use crate::error::ErrorKind;
    use crate::patch::DiffAction;
    use crate::path::Mutation;
    use crate::types::ActorId;
    use serde_json::json;
    use std::sync::Arc;

    fn handle(actor: &str) -> DocHandle<OpSetEngine> {
        DocHandle::new(Arc::new(OpSetEngine::new()), ActorId::new(actor).unwrap())
    }

    fn set(doc: &DocHandle<OpSetEngine>, key: &str, value: serde_json::Value) -> DocHandle<OpSetEngine> {
        doc.change(&[Mutation::set([key], value)], None).unwrap().0
    }

    #[test]
    fn test_forked_replicas_converge() {
        let a = handle("a");
        let b = a.fork(ActorId::new("b").unwrap());
        let a = set(&a, "x", json!(1));
        let b = set(&b, "y", json!(2));

        let a2 = merge(&a, &b).unwrap();
        let b2 = merge(&b, &a).unwrap();
        assert_eq!(a2.view(), &json!({"x": 1, "y": 2}));
        assert_eq!(a2.view(), b2.view());
        assert_eq!(a2.clock(), b2.clock());
    }

    #[test]
    fn test_self_merge_is_rejected() {
        let a = set(&handle("a"), "x", json!(1));
        let other = set(&handle("a"), "y", json!(2));
        let err = merge(&a, &other).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Causality);
        assert_eq!(a.view(), &json!({"x": 1}));
        assert_eq!(other.view(), &json!({"y": 2}));
    }

    #[test]
    fn test_merge_without_new_changes_returns_same_handle() {
        let a = set(&handle("a"), "x", json!(1));
        let b = a.fork(ActorId::new("b").unwrap());
        let merged = merge(&a, &b).unwrap();
        assert!(merged.ptr_eq(&a));
    }

    #[test]
    fn test_diff_does_not_modify_inputs() {
        let old = set(&handle("a"), "x", json!(1));
        let new = set(&old, "y", json!(2));
        let patch = diff(&old, &new).unwrap();
        assert_eq!(patch.diffs.len(), 1);
        assert_eq!(
            patch.diffs[0].action,
            DiffAction::Set {
                key: "y".into(),
                value: json!(2)
            }
        );
        assert_eq!(old.view(), &json!({"x": 1}));
        assert!(diff(&new, &old).unwrap().is_empty());
    }
}
