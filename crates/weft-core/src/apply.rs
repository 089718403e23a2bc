//! Materializes an `ObjectDiff` into a copy-on-write overlay

use crate::cache::ObjectCache;
use crate::diff::{DiffValue, DiffValues, EditAction, LeafDiff, ObjectDiff};
use crate::error::{Error, Result};
use crate::ids::{ActorId, Key, ObjectId};
use crate::object::{Conflicts, List, Map, Object, Slot, Table};
use crate::value::{from_timestamp_seconds, timestamp_seconds, Cell, DataType, Primitive};

/// Apply `diff` on top of `base`, writing every changed object into `updated`.
///
/// Objects unknown to both layers are created from the diff's type. Empty
/// diffs of existing objects leave `updated` untouched.
pub fn apply_diff(diff: &ObjectDiff, base: &ObjectCache, updated: &mut ObjectCache) -> Result<()> {
    let existing = updated
        .get(&diff.object_id)
        .or_else(|| base.get(&diff.object_id))
        .cloned();

    let mut object = match existing {
        Some(_) if diff.is_empty() => return Ok(()),
        Some(object) => object,
        None => Object::empty(diff.object_id.clone(), diff.kind),
    };
    if object.object_type() != diff.kind {
        return Err(Error::type_mismatch(
            diff.kind.to_string(),
            object.object_type().to_string(),
        ));
    }

    match &mut object {
        Object::Map(map) => apply_map(map, diff, base, updated)?,
        Object::List(list) | Object::Text(list) => apply_sequence(list, diff, base, updated)?,
        Object::Table(table) => apply_table(table, diff, base, updated)?,
    }
    updated.insert(object);
    Ok(())
}

fn apply_map(
    map: &mut Map,
    diff: &ObjectDiff,
    base: &ObjectCache,
    updated: &mut ObjectCache,
) -> Result<()> {
    for (key, values) in &diff.props {
        let key = key
            .as_map()
            .ok_or_else(|| Error::type_mismatch("map key", key.to_string()))?;
        if values.is_empty() {
            map.remove(key);
            continue;
        }
        let slot = resolve_slot(map.get(key), values, base, updated)?;
        map.insert(key, slot);
    }
    Ok(())
}

fn apply_sequence(
    list: &mut List,
    diff: &ObjectDiff,
    base: &ObjectCache,
    updated: &mut ObjectCache,
) -> Result<()> {
    for edit in &diff.edits {
        match edit.action {
            EditAction::Insert if edit.index <= list.len() => {
                list.insert(edit.index, Slot::new("", Primitive::Null));
            }
            EditAction::Remove if edit.index < list.len() => {
                list.remove(edit.index);
            }
            _ => {
                return Err(Error::IndexOutOfRange {
                    index: edit.index,
                    len: list.len(),
                })
            }
        }
    }

    for (key, values) in &diff.props {
        let index = sequence_index(key)?;
        if index >= list.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: list.len(),
            });
        }
        if values.is_empty() {
            continue;
        }
        let slot = resolve_slot(list.get(index), values, base, updated)?;
        list.set(index, slot);
    }
    Ok(())
}

fn apply_table(
    table: &mut Table,
    diff: &ObjectDiff,
    base: &ObjectCache,
    updated: &mut ObjectCache,
) -> Result<()> {
    for (key, values) in &diff.props {
        let key = key
            .as_map()
            .ok_or_else(|| Error::type_mismatch("row id", key.to_string()))?;
        if values.is_empty() {
            table.remove(&ObjectId::new(key));
            continue;
        }
        for value in values.values() {
            let row = value
                .as_object()
                .ok_or_else(|| Error::type_mismatch("row object", "leaf value"))?;
            apply_diff(row, base, updated)?;
            table.insert(row.object_id.clone());
        }
    }
    Ok(())
}

/// Patches from the merge engine render list indices as JSON object keys
fn sequence_index(key: &Key) -> Result<usize> {
    match key {
        Key::Index(i) => Ok(*i),
        Key::Map(s) => s
            .parse()
            .map_err(|_| Error::type_mismatch("sequence index", s.clone())),
    }
}

/// Build the new slot for a key from the diff's value set.
///
/// The winner is the single entry, else the entry equal to the previous
/// winner, else the greatest actor id.
fn resolve_slot(
    previous: Option<&Slot>,
    values: &DiffValues,
    base: &ObjectCache,
    updated: &mut ObjectCache,
) -> Result<Slot> {
    let mut conflicts = Conflicts::new();
    for (actor, value) in values {
        let prior = previous.and_then(|slot| slot.conflicts().get(actor));
        conflicts.insert(actor.clone(), cell_of(value, prior, base, updated)?);
    }

    let winner = previous
        .and_then(|slot| {
            conflicts
                .iter()
                .find(|(_, cell)| *cell == slot.value())
                .map(|(actor, _)| actor.clone())
        })
        .or_else(|| conflicts.keys().next_back().cloned())
        .unwrap_or_else(|| ActorId::new(""));

    Slot::with_conflicts(conflicts, winner)
        .ok_or_else(|| Error::type_mismatch("non-empty value set", "empty"))
}

fn cell_of(
    value: &DiffValue,
    prior: Option<&Cell>,
    base: &ObjectCache,
    updated: &mut ObjectCache,
) -> Result<Cell> {
    match value {
        DiffValue::Object(diff) => {
            apply_diff(diff, base, updated)?;
            Ok(Cell::Object(diff.object_id.clone()))
        }
        DiffValue::Value(leaf) => {
            // Keep the stored cell when the leaf only re-describes it, so
            // dates do not lose precision through the seconds round trip.
            if let Some(cell) = prior.filter(|cell| describes(leaf, cell)) {
                return Ok(cell.clone());
            }
            leaf_cell(leaf)
        }
    }
}

fn describes(leaf: &LeafDiff, cell: &Cell) -> bool {
    match (cell, leaf.datatype) {
        (Cell::Primitive(p), None) => *p == leaf.value,
        (Cell::Date(t), Some(DataType::Timestamp)) => {
            leaf.value == Primitive::Number(timestamp_seconds(*t))
        }
        (Cell::Counter(n), Some(DataType::Counter)) => leaf.value == Primitive::Number(*n as f64),
        _ => false,
    }
}

fn leaf_cell(leaf: &LeafDiff) -> Result<Cell> {
    match leaf.datatype {
        None => Ok(Cell::Primitive(leaf.value.clone())),
        Some(DataType::Timestamp) => leaf
            .value
            .as_f64()
            .and_then(from_timestamp_seconds)
            .map(Cell::Date)
            .ok_or_else(|| Error::type_mismatch("timestamp seconds", format!("{:?}", leaf.value))),
        Some(DataType::Counter) => leaf
            .value
            .as_f64()
            .filter(|n| n.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(n))
            .map(|n| Cell::Counter(n as i64))
            .ok_or_else(|| Error::type_mismatch("integral counter value", format!("{:?}", leaf.value))),
    }
}
