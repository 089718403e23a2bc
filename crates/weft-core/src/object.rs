//! Materialized container objects held by the cache

use crate::ids::{ActorId, ObjectId};
use crate::value::{Cell, ObjectType};
use std::collections::{BTreeMap, BTreeSet};

/// Concurrently visible values of one slot, keyed by the actor that wrote them
pub type Conflicts = BTreeMap<ActorId, Cell>;

/// One key or index of a container: its conflict set plus the winning entry
///
/// A slot always holds at least one entry and the winner is one of them.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    winner: ActorId,
    conflicts: Conflicts,
}

impl Slot {
    /// An uncontested slot
    pub fn new(actor: impl Into<ActorId>, cell: impl Into<Cell>) -> Self {
        let winner = actor.into();
        let mut conflicts = Conflicts::new();
        conflicts.insert(winner.clone(), cell.into());
        Self { winner, conflicts }
    }

    /// A contested slot; `None` when `winner` is not one of the entries
    pub fn with_conflicts(conflicts: Conflicts, winner: impl Into<ActorId>) -> Option<Self> {
        let winner = winner.into();
        if !conflicts.contains_key(&winner) {
            return None;
        }
        Some(Self { winner, conflicts })
    }

    pub fn value(&self) -> &Cell {
        // Constructors guarantee the winner is present
        &self.conflicts[&self.winner]
    }

    pub fn winner(&self) -> &ActorId {
        &self.winner
    }

    pub fn conflicts(&self) -> &Conflicts {
        &self.conflicts
    }

    pub fn is_contested(&self) -> bool {
        self.conflicts.len() > 1
    }

    /// Actor under which the entry referencing `id` is filed
    pub fn actor_of(&self, id: &ObjectId) -> Option<&ActorId> {
        self.conflicts
            .iter()
            .find(|(_, cell)| cell.object_id() == Some(id))
            .map(|(actor, _)| actor)
    }
}

/// A map object
#[derive(Debug, Clone, PartialEq)]
pub struct Map {
    object_id: ObjectId,
    entries: BTreeMap<String, Slot>,
}

impl Map {
    pub fn new(object_id: ObjectId) -> Self {
        Self {
            object_id,
            entries: BTreeMap::new(),
        }
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, slot: Slot) -> Self {
        self.entries.insert(key.into(), slot);
        self
    }

    pub fn object_id(&self) -> &ObjectId {
        &self.object_id
    }

    pub fn get(&self, key: &str) -> Option<&Slot> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, slot: Slot) -> Option<Slot> {
        self.entries.insert(key.into(), slot)
    }

    pub fn remove(&mut self, key: &str) -> Option<Slot> {
        self.entries.remove(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &Slot)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A list object; text objects share this representation with every element
/// a single-character string
#[derive(Debug, Clone, PartialEq)]
pub struct List {
    object_id: ObjectId,
    elements: Vec<Slot>,
}

impl List {
    pub fn new(object_id: ObjectId) -> Self {
        Self {
            object_id,
            elements: Vec::new(),
        }
    }

    pub fn with(mut self, slot: Slot) -> Self {
        self.elements.push(slot);
        self
    }

    pub fn object_id(&self) -> &ObjectId {
        &self.object_id
    }

    pub fn get(&self, index: usize) -> Option<&Slot> {
        self.elements.get(index)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn elements(&self) -> &[Slot] {
        &self.elements
    }

    /// Panics if `index > len`
    pub fn insert(&mut self, index: usize, slot: Slot) {
        self.elements.insert(index, slot);
    }

    /// Panics if `index >= len`
    pub fn set(&mut self, index: usize, slot: Slot) {
        self.elements[index] = slot;
    }

    /// Panics if `index >= len`
    pub fn remove(&mut self, index: usize) -> Slot {
        self.elements.remove(index)
    }
}

/// A table object: an unordered set of row maps identified by object id
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    object_id: ObjectId,
    rows: BTreeSet<ObjectId>,
}

impl Table {
    pub fn new(object_id: ObjectId) -> Self {
        Self {
            object_id,
            rows: BTreeSet::new(),
        }
    }

    pub fn with(mut self, row: ObjectId) -> Self {
        self.rows.insert(row);
        self
    }

    pub fn object_id(&self) -> &ObjectId {
        &self.object_id
    }

    pub fn contains(&self, row: &ObjectId) -> bool {
        self.rows.contains(row)
    }

    /// Row whose id renders as `key`
    pub fn row_by_key(&self, key: &str) -> Option<&ObjectId> {
        self.rows.iter().find(|id| id.as_str() == key)
    }

    pub fn insert(&mut self, row: ObjectId) -> bool {
        self.rows.insert(row)
    }

    pub fn remove(&mut self, row: &ObjectId) -> bool {
        self.rows.remove(row)
    }

    pub fn rows(&self) -> impl Iterator<Item = &ObjectId> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A container object stored in the cache
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Map(Map),
    List(List),
    Text(List),
    Table(Table),
}

impl Object {
    /// An empty container of the given kind
    pub fn empty(object_id: ObjectId, kind: ObjectType) -> Self {
        match kind {
            ObjectType::Map => Object::Map(Map::new(object_id)),
            ObjectType::List => Object::List(List::new(object_id)),
            ObjectType::Text => Object::Text(List::new(object_id)),
            ObjectType::Table => Object::Table(Table::new(object_id)),
        }
    }

    pub fn object_id(&self) -> &ObjectId {
        match self {
            Object::Map(m) => m.object_id(),
            Object::List(l) | Object::Text(l) => l.object_id(),
            Object::Table(t) => t.object_id(),
        }
    }

    pub fn object_type(&self) -> ObjectType {
        match self {
            Object::Map(_) => ObjectType::Map,
            Object::List(_) => ObjectType::List,
            Object::Text(_) => ObjectType::Text,
            Object::Table(_) => ObjectType::Table,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Object::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&List> {
        match self {
            Object::List(l) | Object::Text(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Object::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Ids of every object this one references, winners and conflicts alike
    pub fn children(&self) -> Vec<ObjectId> {
        let slots: Vec<&Slot> = match self {
            Object::Map(m) => m.entries.values().collect(),
            Object::List(l) | Object::Text(l) => l.elements.iter().collect(),
            Object::Table(t) => return t.rows.iter().cloned().collect(),
        };
        slots
            .into_iter()
            .flat_map(|slot| slot.conflicts.values())
            .filter_map(|cell| cell.object_id().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_winner_must_be_present() {
        let mut conflicts = Conflicts::new();
        conflicts.insert("actor1".into(), Cell::from(3.0));
        assert!(Slot::with_conflicts(conflicts.clone(), "actor2").is_none());

        let slot = Slot::with_conflicts(conflicts, "actor1").unwrap();
        assert_eq!(slot.value(), &Cell::from(3.0));
        assert!(!slot.is_contested());
    }

    #[test]
    fn test_slot_actor_of() {
        let a = ObjectId::new("a");
        let b = ObjectId::new("b");
        let mut conflicts = Conflicts::new();
        conflicts.insert("actor1".into(), Cell::from(&a));
        conflicts.insert("actor2".into(), Cell::from(&b));
        let slot = Slot::with_conflicts(conflicts, "actor2").unwrap();

        assert_eq!(slot.actor_of(&a), Some(&ActorId::from("actor1")));
        assert_eq!(slot.actor_of(&ObjectId::new("c")), None);
        assert!(slot.is_contested());
    }

    #[test]
    fn test_children_include_conflicts() {
        let map = Map::new(ObjectId::root()).with(
            "birds",
            Slot::with_conflicts(
                [
                    (ActorId::from("actor1"), Cell::from(&ObjectId::new("x"))),
                    (ActorId::from("actor2"), Cell::from(&ObjectId::new("y"))),
                ]
                .into_iter()
                .collect(),
                "actor2",
            )
            .unwrap(),
        );
        let children = Object::Map(map).children();
        assert_eq!(children, vec![ObjectId::new("x"), ObjectId::new("y")]);
    }

    #[test]
    fn test_table_row_by_key() {
        let table = Table::new(ObjectId::new("t")).with(ObjectId::new("row-1"));
        assert_eq!(table.row_by_key("row-1"), Some(&ObjectId::new("row-1")));
        assert_eq!(table.row_by_key("row-2"), None);
    }
}
