//! Patches: the derived, net effect of applying changes.
//!
//! A [`Patch`] is computed by comparing the document tree before and after a
//! batch of changes. Its diffs are ordered so that applying them one after
//! another to the old view yields the new view (see [`Patch::apply`]).

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::clock::Clock;
use crate::error::{Result, TandemError};
use crate::path::{PathSegment, format_path};
use crate::types::{ObjId, OpId, Value};

/// One edit within a patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DiffAction {
    /// A map property was created or overwritten.
    Set {
        /// Property name.
        key: String,
        /// New value.
        value: serde_json::Value,
    },
    /// A map property was removed.
    Remove {
        /// Property name.
        key: String,
    },
    /// A list element was inserted.
    Insert {
        /// Index in the list at the time the diff is applied.
        index: usize,
        /// Inserted value.
        value: serde_json::Value,
    },
    /// A list element was overwritten.
    Update {
        /// Element index.
        index: usize,
        /// New value.
        value: serde_json::Value,
    },
    /// A list element was removed.
    RemoveAt {
        /// Element index.
        index: usize,
    },
}

/// An edit to a single object, located by id and by path from the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Diff {
    /// Object being edited.
    pub obj: ObjId,
    /// Path from the root to the object.
    pub path: Vec<PathSegment>,
    /// The edit.
    pub action: DiffAction,
}

/// Net effect of one or more changes, plus the resulting clock.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Patch {
    /// Clock of the state the patch leads to.
    pub clock: Clock,
    /// Edits in application order.
    pub diffs: Vec<Diff>,
}

impl Patch {
    /// A patch with no edits.
    pub fn empty(clock: Clock) -> Self {
        Self {
            clock,
            diffs: Vec::new(),
        }
    }

    /// Whether the patch changes nothing visible.
    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }

    /// Apply the patch to a JSON view in place.
    ///
    /// On error the view may be partially updated; callers apply patches to
    /// a copy.
    pub fn apply(&self, view: &mut serde_json::Value) -> Result<()> {
        for diff in &self.diffs {
            let target = navigate(view, &diff.path)?;
            apply_action(target, &diff.action, &diff.path)?;
        }
        Ok(())
    }
}

fn navigate<'a>(
    view: &'a mut serde_json::Value,
    path: &[PathSegment],
) -> Result<&'a mut serde_json::Value> {
    let mut current = view;
    for segment in path {
        current = match (segment, current) {
            (PathSegment::Key(key), serde_json::Value::Object(map)) => map.get_mut(key),
            (PathSegment::Index(index), serde_json::Value::Array(items)) => items.get_mut(*index),
            _ => None,
        }
        .ok_or_else(|| TandemError::InvalidPath(format!("patch path {}", format_path(path))))?;
    }
    Ok(current)
}

fn apply_action(
    target: &mut serde_json::Value,
    action: &DiffAction,
    path: &[PathSegment],
) -> Result<()> {
    let mismatch = || TandemError::InvalidPath(format!("patch target {}", format_path(path)));
    match (action, target) {
        (DiffAction::Set { key, value }, serde_json::Value::Object(map)) => {
            map.insert(key.clone(), value.clone());
        }
        (DiffAction::Remove { key }, serde_json::Value::Object(map)) => {
            map.remove(key);
        }
        (DiffAction::Insert { index, value }, serde_json::Value::Array(items))
            if *index <= items.len() =>
        {
            items.insert(*index, value.clone());
        }
        (DiffAction::Update { index, value }, serde_json::Value::Array(items))
            if *index < items.len() =>
        {
            items[*index] = value.clone();
        }
        (DiffAction::RemoveAt { index }, serde_json::Value::Array(items))
            if *index < items.len() =>
        {
            items.remove(*index);
        }
        _ => return Err(mismatch()),
    }
    Ok(())
}

/// Materialized document tree with object and element identities, used to
/// compute patches.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Scalar(Value),
    Map {
        id: ObjId,
        entries: BTreeMap<String, Node>,
    },
    List {
        id: ObjId,
        elems: Vec<(OpId, Node)>,
    },
}

impl Node {
    pub(crate) fn empty_root() -> Self {
        Node::Map {
            id: ObjId::Root,
            entries: BTreeMap::new(),
        }
    }

    /// Render as plain JSON.
    pub(crate) fn to_json(&self) -> serde_json::Value {
        match self {
            Node::Scalar(value) => value.to_json(),
            Node::Map { entries, .. } => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(key, node)| (key.clone(), node.to_json()))
                    .collect(),
            ),
            Node::List { elems, .. } => {
                serde_json::Value::Array(elems.iter().map(|(_, node)| node.to_json()).collect())
            }
        }
    }

    fn object_id(&self) -> Option<&ObjId> {
        match self {
            Node::Scalar(_) => None,
            Node::Map { id, .. } | Node::List { id, .. } => Some(id),
        }
    }

    fn same_object(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::Map { id: a, .. }, Node::Map { id: b, .. })
            | (Node::List { id: a, .. }, Node::List { id: b, .. }) => a == b,
            _ => false,
        }
    }
}

/// Compute the patch that turns `old` into `new`.
pub(crate) fn diff_trees(old: &Node, new: &Node, clock: Clock) -> Patch {
    let mut diffs = Vec::new();
    let mut path = Vec::new();
    if old.same_object(new) {
        diff_objects(&mut path, old, new, &mut diffs);
    }
    Patch { clock, diffs }
}

fn diff_objects(path: &mut Vec<PathSegment>, old: &Node, new: &Node, out: &mut Vec<Diff>) {
    let Some(obj) = new.object_id().cloned() else {
        return;
    };
    match (old, new) {
        (Node::Map { entries: before, .. }, Node::Map { entries: after, .. }) => {
            for key in before.keys() {
                if !after.contains_key(key) {
                    out.push(Diff {
                        obj: obj.clone(),
                        path: path.clone(),
                        action: DiffAction::Remove { key: key.clone() },
                    });
                }
            }
            for (key, node) in after {
                match before.get(key) {
                    Some(prev) if prev.same_object(node) => {
                        path.push(PathSegment::Key(key.clone()));
                        diff_objects(path, prev, node, out);
                        path.pop();
                    }
                    Some(prev) if prev == node => {}
                    _ => out.push(Diff {
                        obj: obj.clone(),
                        path: path.clone(),
                        action: DiffAction::Set {
                            key: key.clone(),
                            value: node.to_json(),
                        },
                    }),
                }
            }
        }
        (Node::List { elems: before, .. }, Node::List { elems: after, .. }) => {
            let kept: HashSet<&OpId> = after.iter().map(|(id, _)| id).collect();
            // Removals go from the back so earlier indexes stay valid.
            for (index, (id, _)) in before.iter().enumerate().rev() {
                if !kept.contains(id) {
                    out.push(Diff {
                        obj: obj.clone(),
                        path: path.clone(),
                        action: DiffAction::RemoveAt { index },
                    });
                }
            }
            let previous: HashMap<&OpId, &Node> = before.iter().map(|(id, node)| (id, node)).collect();
            for (index, (id, node)) in after.iter().enumerate() {
                match previous.get(id) {
                    None => out.push(Diff {
                        obj: obj.clone(),
                        path: path.clone(),
                        action: DiffAction::Insert {
                            index,
                            value: node.to_json(),
                        },
                    }),
                    Some(prev) if prev.same_object(node) => {
                        path.push(PathSegment::Index(index));
                        diff_objects(path, prev, node, out);
                        path.pop();
                    }
                    Some(prev) if *prev == node => {}
                    Some(_) => out.push(Diff {
                        obj: obj.clone(),
                        path: path.clone(),
                        action: DiffAction::Update {
                            index,
                            value: node.to_json(),
                        },
                    }),
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActorId;
    use serde_json::json;

    fn op(counter: u64) -> OpId {
        OpId::new(counter, ActorId::new("a").unwrap())
    }

    fn root(entries: Vec<(&str, Node)>) -> Node {
        Node::Map {
            id: ObjId::Root,
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    fn list(id: u64, elems: Vec<(u64, Node)>) -> Node {
        Node::List {
            id: ObjId::Id(op(id)),
            elems: elems.into_iter().map(|(i, n)| (op(i), n)).collect(),
        }
    }

    fn int(i: i64) -> Node {
        Node::Scalar(Value::Int(i))
    }

    fn check(old: &Node, new: &Node) -> Patch {
        let patch = diff_trees(old, new, Clock::new());
        let mut view = old.to_json();
        patch.apply(&mut view).unwrap();
        assert_eq!(view, new.to_json());
        patch
    }

    #[test]
    fn test_identical_trees_produce_empty_patch() {
        let tree = root(vec![("x", int(1))]);
        assert!(check(&tree, &tree).is_empty());
    }

    #[test]
    fn test_map_set_and_remove() {
        let old = root(vec![("x", int(1)), ("y", int(2))]);
        let new = root(vec![("x", int(3)), ("z", int(4))]);
        let patch = check(&old, &new);
        assert_eq!(patch.diffs.len(), 3);
    }

    #[test]
    fn test_list_insert_remove_update() {
        let old = root(vec![("l", list(1, vec![(2, int(1)), (3, int(2)), (4, int(3))]))]);
        let new = root(vec![(
            "l",
            list(1, vec![(5, int(0)), (2, int(1)), (4, int(9)), (6, int(7))]),
        )]);
        let patch = check(&old, &new);
        assert!(patch.diffs.iter().all(|d| d.path == vec![PathSegment::Key("l".into())]));
    }

    #[test]
    fn test_nested_object_diffs_use_paths() {
        let inner_old = Node::Map {
            id: ObjId::Id(op(10)),
            entries: [("a".to_string(), int(1))].into_iter().collect(),
        };
        let inner_new = Node::Map {
            id: ObjId::Id(op(10)),
            entries: [("a".to_string(), int(2))].into_iter().collect(),
        };
        let old = root(vec![("l", list(1, vec![(2, inner_old)]))]);
        let new = root(vec![("l", list(1, vec![(2, inner_new)]))]);
        let patch = check(&old, &new);
        assert_eq!(patch.diffs.len(), 1);
        assert_eq!(
            patch.diffs[0].path,
            vec![PathSegment::Key("l".into()), PathSegment::Index(0)]
        );
    }

    #[test]
    fn test_replaced_object_is_set_whole() {
        let old = root(vec![("o", list(1, vec![(2, int(1))]))]);
        let new = root(vec![("o", list(7, vec![(8, int(1))]))]);
        let patch = check(&old, &new);
        assert_eq!(
            patch.diffs[0].action,
            DiffAction::Set {
                key: "o".into(),
                value: json!([1])
            }
        );
    }

    #[test]
    fn test_apply_rejects_bad_path() {
        let patch = Patch {
            clock: Clock::new(),
            diffs: vec![Diff {
                obj: ObjId::Root,
                path: vec![PathSegment::Key("missing".into())],
                action: DiffAction::Remove { key: "x".into() },
            }],
        };
        let mut view = json!({});
        assert!(patch.apply(&mut view).is_err());
    }
}
