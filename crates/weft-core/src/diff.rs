//! Patch tree types and the builder that roots a mutation-site diff at the
//! document root

use crate::cache::View;
use crate::error::{Error, Result};
use crate::ids::{ActorId, Key, ObjectId};
use crate::object::Object;
use crate::path::ResolvedPath;
use crate::value::{timestamp_seconds, Cell, DataType, ObjectType, Primitive};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Values shown at one key of a diff, per attributed actor.
/// An empty set means the key was removed.
pub type DiffValues = BTreeMap<ActorId, DiffValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditAction {
    Insert,
    Remove,
}

/// A structural change to a list or text object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    pub action: EditAction,
    pub index: usize,
}

impl Edit {
    pub fn insert(index: usize) -> Self {
        Self {
            action: EditAction::Insert,
            index,
        }
    }

    pub fn remove(index: usize) -> Self {
        Self {
            action: EditAction::Remove,
            index,
        }
    }
}

/// A leaf value in a diff, tagged for counters and timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafDiff {
    pub value: Primitive,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<DataType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiffValue {
    Object(ObjectDiff),
    Value(LeafDiff),
}

impl DiffValue {
    pub fn leaf(value: impl Into<Primitive>) -> Self {
        DiffValue::Value(LeafDiff {
            value: value.into(),
            datatype: None,
        })
    }

    pub fn counter(value: f64) -> Self {
        DiffValue::Value(LeafDiff {
            value: Primitive::Number(value),
            datatype: Some(DataType::Counter),
        })
    }

    pub fn timestamp(seconds: f64) -> Self {
        DiffValue::Value(LeafDiff {
            value: Primitive::Number(seconds),
            datatype: Some(DataType::Timestamp),
        })
    }

    pub fn as_object(&self) -> Option<&ObjectDiff> {
        match self {
            DiffValue::Object(d) => Some(d),
            DiffValue::Value(_) => None,
        }
    }

    pub fn object_id(&self) -> Option<&ObjectId> {
        self.as_object().map(|d| &d.object_id)
    }
}

impl From<ObjectDiff> for DiffValue {
    fn from(v: ObjectDiff) -> Self {
        DiffValue::Object(v)
    }
}

/// Changes to one object, with nested diffs for changed children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDiff {
    pub object_id: ObjectId,
    #[serde(rename = "type")]
    pub kind: ObjectType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edits: Vec<Edit>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub props: BTreeMap<Key, DiffValues>,
}

impl ObjectDiff {
    pub fn new(object_id: ObjectId, kind: ObjectType) -> Self {
        Self {
            object_id,
            kind,
            edits: Vec::new(),
            props: BTreeMap::new(),
        }
    }

    /// Builder: attribute `value` at `key` to `actor`
    pub fn with_prop(
        mut self,
        key: impl Into<Key>,
        actor: impl Into<ActorId>,
        value: impl Into<DiffValue>,
    ) -> Self {
        self.props
            .entry(key.into())
            .or_default()
            .insert(actor.into(), value.into());
        self
    }

    /// Builder: replace the value set at `key` (empty marks a removal)
    pub fn with_values(mut self, key: impl Into<Key>, values: DiffValues) -> Self {
        self.props.insert(key.into(), values);
        self
    }

    pub fn with_edits(mut self, edits: impl IntoIterator<Item = Edit>) -> Self {
        self.edits.extend(edits);
        self
    }

    pub fn values(&self, key: impl Into<Key>) -> Option<&DiffValues> {
        self.props.get(&key.into())
    }

    /// Follow `key` then `actor` down to a nested object diff
    pub fn child(&self, key: impl Into<Key>, actor: impl Into<ActorId>) -> Option<&ObjectDiff> {
        self.values(key)?.get(&actor.into())?.as_object()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty() && self.props.is_empty()
    }
}

impl From<Primitive> for DiffValue {
    fn from(v: Primitive) -> Self {
        DiffValue::leaf(v)
    }
}

impl From<f64> for DiffValue {
    fn from(v: f64) -> Self {
        DiffValue::leaf(v)
    }
}

impl From<&str> for DiffValue {
    fn from(v: &str) -> Self {
        DiffValue::leaf(v)
    }
}

/// Shallow description of a slot entry: leaves verbatim, objects as an
/// empty diff carrying only id and type
pub fn describe(view: &View<'_>, cell: &Cell) -> Result<DiffValue> {
    Ok(match cell {
        Cell::Primitive(p) => DiffValue::leaf(p.clone()),
        Cell::Date(t) => DiffValue::timestamp(timestamp_seconds(*t)),
        Cell::Counter(n) => DiffValue::counter(*n as f64),
        Cell::Object(id) => DiffValue::Object(ObjectDiff::new(id.clone(), view.object_type(id)?)),
    })
}

/// Describe every conflict entry filed at `key` of `object`
fn describe_slot(view: &View<'_>, object: &Object, key: &Key, step: usize) -> Result<DiffValues> {
    let slot = match (object, key) {
        (Object::Map(map), Key::Map(k)) => map.get(k),
        (Object::List(list) | Object::Text(list), Key::Index(i)) => list.get(*i),
        (Object::Table(table), Key::Map(k)) => {
            return match table.row_by_key(k) {
                Some(row) => Ok(DiffValues::from([(
                    ActorId::from(row),
                    describe(view, &Cell::Object(row.clone()))?,
                )])),
                None => Ok(DiffValues::new()),
            };
        }
        _ => None,
    };

    let slot = slot.ok_or_else(|| {
        Error::broken_path(step, format!("no entry at {} of {}", key, object.object_id()))
    })?;
    slot.conflicts()
        .iter()
        .map(|(actor, cell)| Ok((actor.clone(), describe(view, cell)?)))
        .collect()
}

/// Wrap the diff of the mutated container in one diff per ancestor, up to
/// the root.
///
/// Each ancestor shows every conflict entry at the walked key; the entry the
/// path went through carries the nested diff, the others stay shallow.
pub fn root_diff(
    view: &View<'_>,
    resolved: &ResolvedPath,
    site: ObjectDiff,
) -> Result<ObjectDiff> {
    let mut diff = site;
    for (i, step) in resolved.steps.iter().enumerate().rev() {
        let parent = view.object(&step.parent)?;
        let mut values = describe_slot(view, parent, &step.key, i)?;
        values.insert(step.actor.clone(), DiffValue::Object(diff));
        diff = ObjectDiff::new(step.parent.clone(), parent.object_type())
            .with_values(step.key.clone(), values);
    }
    Ok(diff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ObjectCache;
    use crate::object::{Conflicts, List, Map, Slot};
    use crate::path::{resolve, PathElement};
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_describe_leaves() {
        let cache = ObjectCache::with_root();
        let view = cache.view();
        let at = UNIX_EPOCH + Duration::from_secs(10);

        assert_eq!(describe(&view, &Cell::Date(at)).unwrap(), DiffValue::timestamp(10.0));
        assert_eq!(describe(&view, &Cell::Counter(0)).unwrap(), DiffValue::counter(0.0));
        assert_eq!(
            describe(&view, &Cell::Primitive(Primitive::Null)).unwrap(),
            DiffValue::leaf(Primitive::Null)
        );
        assert_eq!(
            describe(&view, &Cell::Object(ObjectId::root())).unwrap(),
            DiffValue::Object(ObjectDiff::new(ObjectId::root(), ObjectType::Map))
        );
    }

    #[test]
    fn test_root_diff_keeps_sibling_branches_shallow() {
        let list_id = ObjectId::new("list-1");
        let mut conflicts = Conflicts::new();
        conflicts.insert("actor1".into(), Cell::from(&list_id));
        conflicts.insert("actor2".into(), Cell::from(42.0));

        let mut cache = ObjectCache::new();
        cache.insert(Object::List(List::new(list_id.clone())));
        cache.insert(Object::Map(Map::new(ObjectId::root()).with(
            "birds",
            Slot::with_conflicts(conflicts, "actor1").unwrap(),
        )));
        let view = cache.view();
        let resolved = resolve(&view, &[PathElement::new("birds", list_id.clone())]).unwrap();

        let site = ObjectDiff::new(list_id.clone(), ObjectType::List).with_edits([Edit::remove(0)]);
        let diff = root_diff(&view, &resolved, site.clone()).unwrap();

        assert_eq!(
            diff,
            ObjectDiff::new(ObjectId::root(), ObjectType::Map)
                .with_prop("birds", "actor1", site)
                .with_prop("birds", "actor2", 42.0)
        );
    }

    #[test]
    fn test_diff_json_shape() {
        let diff = ObjectDiff::new(ObjectId::root(), ObjectType::Map)
            .with_prop("counter", "actor1", DiffValue::counter(1.0));
        let json = serde_json::to_value(&diff).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "objectId": "_root",
                "type": "map",
                "props": {"counter": {"actor1": {"value": 1.0, "datatype": "counter"}}}
            })
        );

        let back: ObjectDiff = serde_json::from_value(json).unwrap();
        assert_eq!(back, diff);
    }
}
