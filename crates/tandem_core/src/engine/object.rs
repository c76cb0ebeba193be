//! Object store: the materialized registers behind an op set.
//!
//! Map properties and list elements are last-writer-wins registers ordered by
//! [`OpId`]. List order follows RGA: a new element goes right after its
//! reference element, skipping any neighbours with a greater id.

use std::collections::HashMap;

use crate::change::{Op, OpAction};
use crate::patch::Node;
use crate::path::PathSegment;
use crate::types::{ElemRef, Key, ObjId, OpId, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ObjKind {
    Map,
    List,
}

#[derive(Debug, Clone)]
struct Register {
    winner: OpId,
    /// `None` is a tombstone.
    value: Option<Value>,
}

impl Register {
    fn new(id: &OpId, value: Option<Value>) -> Self {
        Self {
            winner: id.clone(),
            value,
        }
    }

    fn write(&mut self, id: &OpId, value: Option<Value>) {
        if *id > self.winner {
            self.winner = id.clone();
            self.value = value;
        }
    }

    fn visible(&self) -> Option<(&OpId, &Value)> {
        self.value.as_ref().map(|value| (&self.winner, value))
    }
}

#[derive(Debug, Clone)]
struct Element {
    id: OpId,
    register: Register,
}

#[derive(Debug, Clone)]
enum Object {
    Map(HashMap<String, Register>),
    List(Vec<Element>),
}

#[derive(Debug, Clone)]
pub(super) struct ObjectStore {
    objects: HashMap<ObjId, Object>,
}

impl Default for ObjectStore {
    fn default() -> Self {
        let mut objects = HashMap::new();
        objects.insert(ObjId::Root, Object::Map(HashMap::new()));
        Self { objects }
    }
}

impl ObjectStore {
    /// Apply one operation. On error the store is unchanged.
    pub(super) fn apply_op(&mut self, id: &OpId, op: &Op) -> Result<(), String> {
        let object = self
            .objects
            .get_mut(&op.obj)
            .ok_or_else(|| format!("unknown object {}", op.obj))?;

        let created = match (&op.action, &op.key, object) {
            (OpAction::Set(value), Key::Map(key), Object::Map(entries)) => {
                let value = Some(value.clone());
                match entries.get_mut(key) {
                    Some(register) => register.write(id, value.clone()),
                    None => {
                        entries.insert(key.clone(), Register::new(id, value.clone()));
                    }
                }
                value
            }
            (OpAction::Delete, Key::Map(key), Object::Map(entries)) => {
                match entries.get_mut(key) {
                    Some(register) => register.write(id, None),
                    None => {
                        entries.insert(key.clone(), Register::new(id, None));
                    }
                }
                None
            }
            (OpAction::Set(value), Key::Seq(ElemRef::Id(elem)), Object::List(elems)) => {
                let element = elems
                    .iter_mut()
                    .find(|e| e.id == *elem)
                    .ok_or_else(|| format!("unknown list element {elem}"))?;
                element.register.write(id, Some(value.clone()));
                Some(value.clone())
            }
            (OpAction::Delete, Key::Seq(ElemRef::Id(elem)), Object::List(elems)) => {
                let element = elems
                    .iter_mut()
                    .find(|e| e.id == *elem)
                    .ok_or_else(|| format!("unknown list element {elem}"))?;
                element.register.write(id, None);
                None
            }
            (OpAction::Insert(value), Key::Seq(after), Object::List(elems)) => {
                if elems.iter().any(|e| e.id == *id) {
                    return Err(format!("duplicate list element {id}"));
                }
                let mut index = match after {
                    ElemRef::Head => 0,
                    ElemRef::Id(elem) => {
                        elems
                            .iter()
                            .position(|e| e.id == *elem)
                            .ok_or_else(|| format!("unknown list element {elem}"))?
                            + 1
                    }
                };
                while index < elems.len() && elems[index].id > *id {
                    index += 1;
                }
                elems.insert(
                    index,
                    Element {
                        id: id.clone(),
                        register: Register::new(id, Some(value.clone())),
                    },
                );
                Some(value.clone())
            }
            (_, _, Object::Map(_)) => return Err(format!("{} is a map", op.obj)),
            (_, _, Object::List(_)) => return Err(format!("{} is a list", op.obj)),
        };

        match created {
            Some(Value::Map) => {
                self.objects
                    .insert(ObjId::Id(id.clone()), Object::Map(HashMap::new()));
            }
            Some(Value::List) => {
                self.objects
                    .insert(ObjId::Id(id.clone()), Object::List(Vec::new()));
            }
            _ => {}
        }
        Ok(())
    }

    pub(super) fn kind(&self, obj: &ObjId) -> Option<ObjKind> {
        self.objects.get(obj).map(|object| match object {
            Object::Map(_) => ObjKind::Map,
            Object::List(_) => ObjKind::List,
        })
    }

    /// Visible value at `segment` inside `obj`, with the id of the op that
    /// wrote it (which is also the id of the object it created, if any).
    fn visible(&self, obj: &ObjId, segment: &PathSegment) -> Option<(&OpId, &Value)> {
        match (self.objects.get(obj)?, segment) {
            (Object::Map(entries), PathSegment::Key(key)) => entries.get(key)?.visible(),
            (Object::List(elems), PathSegment::Index(index)) => elems
                .iter()
                .filter_map(|e| e.register.visible())
                .nth(*index),
            _ => None,
        }
    }

    /// Walk `path` from the root to an object.
    pub(super) fn resolve_object(&self, path: &[PathSegment]) -> Result<ObjId, String> {
        let mut obj = ObjId::Root;
        for (depth, segment) in path.iter().enumerate() {
            let (writer, value) = self
                .visible(&obj, segment)
                .ok_or_else(|| format!("nothing at segment {depth} ('{segment}')"))?;
            if !value.is_object() {
                return Err(format!("segment {depth} ('{segment}') is not an object"));
            }
            obj = ObjId::Id(writer.clone());
        }
        Ok(obj)
    }

    /// Element id of the `index`-th visible element of a list.
    pub(super) fn visible_elem(&self, obj: &ObjId, index: usize) -> Option<OpId> {
        match self.objects.get(obj)? {
            Object::List(elems) => elems
                .iter()
                .filter(|e| e.register.value.is_some())
                .nth(index)
                .map(|e| e.id.clone()),
            Object::Map(_) => None,
        }
    }

    /// Number of visible elements of a list.
    pub(super) fn visible_len(&self, obj: &ObjId) -> usize {
        match self.objects.get(obj) {
            Some(Object::List(elems)) => elems.iter().filter(|e| e.register.value.is_some()).count(),
            _ => 0,
        }
    }

    /// Whether a map property is currently present.
    pub(super) fn has_key(&self, obj: &ObjId, key: &str) -> bool {
        matches!(
            self.objects.get(obj),
            Some(Object::Map(entries)) if entries.get(key).is_some_and(|r| r.value.is_some())
        )
    }

    /// Materialize the tree below the root.
    pub(crate) fn to_node(&self) -> Node {
        self.object_node(&ObjId::Root)
    }

    fn object_node(&self, obj: &ObjId) -> Node {
        match self.objects.get(obj) {
            Some(Object::Map(entries)) => Node::Map {
                id: obj.clone(),
                entries: entries
                    .iter()
                    .filter_map(|(key, register)| {
                        let (writer, value) = register.visible()?;
                        Some((key.clone(), self.value_node(writer, value)))
                    })
                    .collect(),
            },
            Some(Object::List(elems)) => Node::List {
                id: obj.clone(),
                elems: elems
                    .iter()
                    .filter_map(|e| {
                        let (writer, value) = e.register.visible()?;
                        Some((e.id.clone(), self.value_node(writer, value)))
                    })
                    .collect(),
            },
            None => Node::Scalar(Value::Null),
        }
    }

    fn value_node(&self, writer: &OpId, value: &Value) -> Node {
        if value.is_object() {
            self.object_node(&ObjId::Id(writer.clone()))
        } else {
            Node::Scalar(value.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActorId;
    use serde_json::json;

    fn id(counter: u64, actor: &str) -> OpId {
        OpId::new(counter, ActorId::new(actor).unwrap())
    }

    fn set(obj: ObjId, key: &str, value: Value) -> Op {
        Op {
            obj,
            key: Key::Map(key.to_string()),
            action: OpAction::Set(value),
        }
    }

    fn insert(obj: ObjId, after: ElemRef, value: Value) -> Op {
        Op {
            obj,
            key: Key::Seq(after),
            action: OpAction::Insert(value),
        }
    }

    #[test]
    fn test_last_writer_wins_regardless_of_order() {
        let mut a = ObjectStore::default();
        let mut b = ObjectStore::default();
        let low = (id(1, "a"), set(ObjId::Root, "x", Value::Int(1)));
        let high = (id(1, "b"), set(ObjId::Root, "x", Value::Int(2)));

        a.apply_op(&low.0, &low.1).unwrap();
        a.apply_op(&high.0, &high.1).unwrap();
        b.apply_op(&high.0, &high.1).unwrap();
        b.apply_op(&low.0, &low.1).unwrap();

        assert_eq!(a.to_node().to_json(), json!({"x": 2}));
        assert_eq!(b.to_node().to_json(), json!({"x": 2}));
    }

    #[test]
    fn test_delete_tombstone_beats_older_write() {
        let mut store = ObjectStore::default();
        let delete = Op {
            obj: ObjId::Root,
            key: Key::Map("x".into()),
            action: OpAction::Delete,
        };
        store.apply_op(&id(5, "a"), &delete).unwrap();
        store
            .apply_op(&id(3, "b"), &set(ObjId::Root, "x", Value::Int(1)))
            .unwrap();
        assert_eq!(store.to_node().to_json(), json!({}));
        assert!(!store.has_key(&ObjId::Root, "x"));
    }

    #[test]
    fn test_nested_objects() {
        let mut store = ObjectStore::default();
        store
            .apply_op(&id(1, "a"), &set(ObjId::Root, "m", Value::Map))
            .unwrap();
        let inner = ObjId::Id(id(1, "a"));
        store
            .apply_op(&id(2, "a"), &set(inner.clone(), "k", Value::Str("v".into())))
            .unwrap();
        assert_eq!(store.to_node().to_json(), json!({"m": {"k": "v"}}));
        assert_eq!(store.resolve_object(&[PathSegment::Key("m".into())]).unwrap(), inner);
        assert_eq!(store.kind(&inner), Some(ObjKind::Map));
    }

    #[test]
    fn test_rga_concurrent_inserts_converge() {
        let list_id = id(1, "a");
        let list = ObjId::Id(list_id.clone());
        let make = set(ObjId::Root, "l", Value::List);
        let first = (id(2, "a"), insert(list.clone(), ElemRef::Head, Value::Int(1)));
        let x = (
            id(3, "a"),
            insert(list.clone(), ElemRef::Id(id(2, "a")), Value::Int(2)),
        );
        let y = (
            id(3, "b"),
            insert(list.clone(), ElemRef::Id(id(2, "a")), Value::Int(3)),
        );

        let mut s1 = ObjectStore::default();
        let mut s2 = ObjectStore::default();
        for store in [&mut s1, &mut s2] {
            store.apply_op(&list_id, &make).unwrap();
            store.apply_op(&first.0, &first.1).unwrap();
        }
        s1.apply_op(&x.0, &x.1).unwrap();
        s1.apply_op(&y.0, &y.1).unwrap();
        s2.apply_op(&y.0, &y.1).unwrap();
        s2.apply_op(&x.0, &x.1).unwrap();

        // Higher id (3@b) sorts first among siblings.
        assert_eq!(s1.to_node().to_json(), json!({"l": [1, 3, 2]}));
        assert_eq!(s2.to_node().to_json(), json!({"l": [1, 3, 2]}));
        assert_eq!(s1.visible_len(&list), 3);
        assert_eq!(s1.visible_elem(&list, 1), Some(id(3, "b")));
    }

    #[test]
    fn test_rejects_unknown_object_and_kind_mismatch() {
        let mut store = ObjectStore::default();
        let err = store
            .apply_op(&id(1, "a"), &set(ObjId::Id(id(9, "z")), "k", Value::Null))
            .unwrap_err();
        assert!(err.contains("unknown object"));

        let bad = insert(ObjId::Root, ElemRef::Head, Value::Null);
        let err = store.apply_op(&id(2, "a"), &bad).unwrap_err();
        assert!(err.contains("is a map"));
        assert_eq!(store.to_node().to_json(), json!({}));
    }
}
