//! Object cache: the arena of materialized containers, and the layered view a
//! transaction reads through (its own overlay first, then the shared snapshot)

use crate::error::{Error, Result};
use crate::ids::ObjectId;
use crate::object::{Map, Object};
use crate::value::{Cell, ObjectType, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Read-only cache shared with a transaction
pub type Snapshot = Arc<ObjectCache>;

/// Mapping from object id to the container materialized under it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectCache {
    objects: HashMap<ObjectId, Object>,
}

impl ObjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache holding only an empty root map
    pub fn with_root() -> Self {
        let mut cache = Self::new();
        cache.insert(Object::Map(Map::new(ObjectId::root())));
        cache
    }

    pub fn get(&self, id: &ObjectId) -> Option<&Object> {
        self.objects.get(id)
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    /// Insert an object under its own id, returning the previous one
    pub fn insert(&mut self, object: Object) -> Option<Object> {
        self.objects.insert(object.object_id().clone(), object)
    }

    pub fn remove(&mut self, id: &ObjectId) -> Option<Object> {
        self.objects.remove(id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ObjectId> {
        self.objects.keys()
    }

    pub fn view(&self) -> View<'_> {
        View {
            base: self,
            overlay: None,
        }
    }

    /// Merge an overlay produced by a transaction into this cache
    pub fn absorb(&mut self, overlay: ObjectCache) {
        self.objects.extend(overlay.objects);
    }

    /// Drop every object that cannot be reached from the root.
    ///
    /// Run after an authoritative patch has been applied: objects the patch
    /// replaced or deleted are no longer referenced. Returns the number of
    /// objects removed.
    pub fn retain_reachable(&mut self) -> usize {
        let mut reachable = HashSet::new();
        let mut stack = vec![ObjectId::root()];
        while let Some(id) = stack.pop() {
            if !reachable.insert(id.clone()) {
                continue;
            }
            if let Some(object) = self.objects.get(&id) {
                stack.extend(object.children());
            }
        }

        let before = self.objects.len();
        self.objects.retain(|id, _| reachable.contains(id));
        before - self.objects.len()
    }
}

/// A cache seen through an optional copy-on-write overlay
#[derive(Debug, Clone, Copy)]
pub struct View<'a> {
    base: &'a ObjectCache,
    overlay: Option<&'a ObjectCache>,
}

impl<'a> View<'a> {
    pub fn layered(base: &'a ObjectCache, overlay: &'a ObjectCache) -> Self {
        Self {
            base,
            overlay: Some(overlay),
        }
    }

    pub fn get(&self, id: &ObjectId) -> Option<&'a Object> {
        self.overlay
            .and_then(|o| o.get(id))
            .or_else(|| self.base.get(id))
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.get(id).is_some()
    }

    pub fn object(&self, id: &ObjectId) -> Result<&'a Object> {
        self.get(id).ok_or_else(|| Error::UnknownObject(id.clone()))
    }

    pub fn object_type(&self, id: &ObjectId) -> Result<ObjectType> {
        Ok(self.object(id)?.object_type())
    }

    /// Rebuild the value tree a slot currently shows (winners only)
    pub fn materialize(&self, cell: &Cell) -> Result<Value> {
        match cell {
            Cell::Primitive(p) => Ok(Value::Primitive(p.clone())),
            Cell::Date(t) => Ok(Value::Date(*t)),
            Cell::Counter(n) => Ok(Value::Counter(*n)),
            Cell::Object(id) => self.materialize_object(id),
        }
    }

    pub fn materialize_object(&self, id: &ObjectId) -> Result<Value> {
        match self.object(id)? {
            Object::Map(map) => {
                let mut entries = std::collections::BTreeMap::new();
                for (key, slot) in map.entries() {
                    entries.insert(key.clone(), self.materialize(slot.value())?);
                }
                Ok(Value::Map(entries))
            }
            Object::List(list) => list
                .elements()
                .iter()
                .map(|slot| self.materialize(slot.value()))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            Object::Text(list) => {
                let mut text = String::new();
                for slot in list.elements() {
                    if let Cell::Primitive(p) = slot.value() {
                        text.push_str(p.as_str().unwrap_or_default());
                    }
                }
                Ok(Value::Text(text))
            }
            Object::Table(table) => table
                .rows()
                .map(|row| self.materialize_object(row))
                .collect::<Result<Vec<_>>>()
                .map(Value::Table),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{List, Slot, Table};

    fn birds_cache() -> (ObjectCache, ObjectId) {
        let list_id = ObjectId::new("list-1");
        let mut cache = ObjectCache::new();
        cache.insert(Object::List(
            List::new(list_id.clone())
                .with(Slot::new("actor1", "swallow"))
                .with(Slot::new("actor1", "magpie")),
        ));
        cache.insert(Object::Map(
            Map::new(ObjectId::root()).with("birds", Slot::new("actor1", &list_id)),
        ));
        (cache, list_id)
    }

    #[test]
    fn test_overlay_shadows_base() {
        let (base, list_id) = birds_cache();
        let mut overlay = ObjectCache::new();
        overlay.insert(Object::List(List::new(list_id.clone())));

        let view = View::layered(&base, &overlay);
        assert_eq!(view.get(&list_id).unwrap().as_sequence().unwrap().len(), 0);
        assert_eq!(base.view().get(&list_id).unwrap().as_sequence().unwrap().len(), 2);
        assert!(view.contains(&ObjectId::root()));
    }

    #[test]
    fn test_materialize() {
        let (cache, _) = birds_cache();
        let value = cache.view().materialize_object(&ObjectId::root()).unwrap();
        assert_eq!(
            value,
            Value::map([("birds", Value::from(vec!["swallow", "magpie"]))])
        );
    }

    #[test]
    fn test_materialize_unknown_object() {
        let cache = ObjectCache::with_root();
        let err = cache
            .view()
            .materialize(&Cell::Object(ObjectId::new("missing")))
            .unwrap_err();
        assert_eq!(err, Error::UnknownObject(ObjectId::new("missing")));
    }

    #[test]
    fn test_retain_reachable_drops_orphans() {
        let (mut cache, list_id) = birds_cache();
        cache.insert(Object::Table(Table::new(ObjectId::new("orphan"))));

        assert_eq!(cache.retain_reachable(), 1);
        assert!(cache.contains(&list_id));
        assert!(!cache.contains(&ObjectId::new("orphan")));
    }

    #[test]
    fn test_absorb_replaces_objects() {
        let (mut cache, list_id) = birds_cache();
        let mut overlay = ObjectCache::new();
        overlay.insert(Object::List(List::new(list_id.clone())));

        cache.absorb(overlay);
        assert!(cache.get(&list_id).unwrap().as_sequence().unwrap().is_empty());
        assert_eq!(cache.len(), 2);
    }
}
