//! Primitive operations and the log a transaction appends them to

use crate::ids::{Key, ObjectId};
use crate::value::{DataType, ObjectType, Primitive};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Action of a primitive operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OpAction {
    Set,
    Del,
    Inc,
    MakeMap,
    MakeList,
    MakeText,
    MakeTable,
}

impl OpAction {
    /// The creation action for a container kind
    pub fn make(kind: ObjectType) -> Self {
        match kind {
            ObjectType::Map => OpAction::MakeMap,
            ObjectType::List => OpAction::MakeList,
            ObjectType::Text => OpAction::MakeText,
            ObjectType::Table => OpAction::MakeTable,
        }
    }

    pub fn is_make(self) -> bool {
        matches!(
            self,
            OpAction::MakeMap | OpAction::MakeList | OpAction::MakeText | OpAction::MakeTable
        )
    }
}

/// One entry of the document's operation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Op {
    pub action: OpAction,
    pub obj: ObjectId,
    pub key: Key,
    /// Insert before `key` instead of overwriting it (sequences only)
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub insert: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Primitive>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<DataType>,
    /// Id of the object created by a make action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child: Option<ObjectId>,
}

impl Op {
    fn bare(action: OpAction, obj: ObjectId, key: Key) -> Self {
        Self {
            action,
            obj,
            key,
            insert: false,
            value: None,
            datatype: None,
            child: None,
        }
    }

    pub fn set(obj: ObjectId, key: impl Into<Key>, value: impl Into<Primitive>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::bare(OpAction::Set, obj, key.into())
        }
    }

    /// A `set` that inserts a new element before `index`
    pub fn insert(obj: ObjectId, index: usize, value: impl Into<Primitive>) -> Self {
        Self {
            insert: true,
            ..Self::set(obj, index, value)
        }
    }

    pub fn del(obj: ObjectId, key: impl Into<Key>) -> Self {
        Self::bare(OpAction::Del, obj, key.into())
    }

    pub fn inc(obj: ObjectId, key: impl Into<Key>, delta: i64) -> Self {
        Self {
            value: Some(Primitive::Number(delta as f64)),
            ..Self::bare(OpAction::Inc, obj, key.into())
        }
    }

    pub fn make(kind: ObjectType, obj: ObjectId, key: impl Into<Key>, child: ObjectId) -> Self {
        Self {
            child: Some(child),
            ..Self::bare(OpAction::make(kind), obj, key.into())
        }
    }

    pub fn with_insert(mut self, insert: bool) -> Self {
        self.insert = insert;
        self
    }

    pub fn with_datatype(mut self, datatype: DataType) -> Self {
        self.datatype = Some(datatype);
        self
    }
}

/// Ordered ops produced by one transaction.
///
/// Callers append a make op before any op addressed to the created child, so
/// the log is always in pre-order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpLog {
    ops: Vec<Op>,
}

impl OpLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: Op) {
        trace!(action = ?op.action, obj = %op.obj, key = %op.key, insert = op.insert, "Emitting op");
        self.ops.push(op);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn as_slice(&self) -> &[Op] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<Op> {
        self.ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_json_shape() {
        let op = Op::insert(ObjectId::new("list-1"), 0, "starling");
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "action": "set",
                "obj": "list-1",
                "key": 0,
                "insert": true,
                "value": "starling"
            })
        );
    }

    #[test]
    fn test_make_op_json_shape() {
        let op = Op::make(ObjectType::Table, ObjectId::root(), "books", ObjectId::new("t-1"));
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "action": "makeTable",
                "obj": "_root",
                "key": "books",
                "child": "t-1"
            })
        );
    }

    #[test]
    fn test_inc_carries_delta() {
        let op = Op::inc(ObjectId::root(), "counter", -2);
        assert_eq!(op.value, Some(Primitive::Number(-2.0)));
        assert_eq!(op.action, OpAction::Inc);
    }

    #[test]
    fn test_op_log_preserves_order() {
        let mut log = OpLog::new();
        log.push(Op::del(ObjectId::new("l"), 0));
        log.push(Op::del(ObjectId::new("l"), 0));
        assert_eq!(log.len(), 2);
        assert!(log.as_slice().iter().all(|op| op.action == OpAction::Del));
    }
}
