//! Mutation transaction: compiles one local edit into ops and a root patch

use crate::apply::apply_diff;
use crate::cache::{ObjectCache, View};
use crate::diff::{root_diff, DiffValue, DiffValues, Edit, ObjectDiff};
use crate::error::{Error, Result};
use crate::ids::{ActorId, Key, ObjectId};
use crate::object::{Object, Slot};
use crate::op::{Op, OpLog};
use crate::path::{resolve, PathElement, ResolvedPath};
use crate::value::{timestamp_seconds, DataType, ObjectType, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Receives the patch of a transaction, at most once
pub trait PatchObserver {
    /// `updated` already holds the materialized result of `diff`
    fn on_patch(&mut self, diff: &ObjectDiff, updated: &mut ObjectCache);
}

impl<F> PatchObserver for F
where
    F: FnMut(&ObjectDiff, &mut ObjectCache),
{
    fn on_patch(&mut self, diff: &ObjectDiff, updated: &mut ObjectCache) {
        self(diff, updated)
    }
}

/// Source of provisional object ids
pub trait IdAllocator {
    fn allocate(&mut self) -> ObjectId;
}

/// Allocates random uuid v4 ids
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidAllocator;

impl IdAllocator for UuidAllocator {
    fn allocate(&mut self) -> ObjectId {
        ObjectId::provisional()
    }
}

/// What an increment reports in the patch handed to the observer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CounterPatch {
    /// The counter's value after the increment
    #[default]
    Absolute,
    /// The raw delta
    Delta,
}

/// How rows inside an assigned table literal are treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TableLiterals {
    /// Create the table empty
    #[default]
    Ignore,
    /// Add every row under a fresh row id in the same transaction
    Populate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ContextOptions {
    pub counter_patch: CounterPatch,
    pub table_literals: TableLiterals,
}

/// Outcome of a transaction
#[derive(Debug)]
pub struct Change<T = ()> {
    /// Ops in emission order; empty when the edit was a no-op
    pub ops: Vec<Op>,
    /// New state of every object the edit touched
    pub updated: ObjectCache,
    /// Operation-specific result (the new row id for `add_table_row`)
    pub output: T,
}

impl<T> Change<T> {
    pub fn is_noop(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Change<U> {
        Change {
            ops: self.ops,
            updated: self.updated,
            output: f(self.output),
        }
    }
}

/// A single-use transaction compiling one local edit.
///
/// Reads through its overlay into a shared, read-only snapshot and never
/// writes to the snapshot. Every operation consumes the context; on error
/// nothing it emitted escapes.
pub struct Context<'a> {
    actor: ActorId,
    cache: &'a ObjectCache,
    updated: ObjectCache,
    ops: OpLog,
    observer: &'a mut dyn PatchObserver,
    options: ContextOptions,
    ids: Box<dyn IdAllocator + 'a>,
    allocated: HashSet<ObjectId>,
}

impl<'a> Context<'a> {
    pub fn new(
        actor: ActorId,
        cache: &'a ObjectCache,
        observer: &'a mut dyn PatchObserver,
    ) -> Self {
        Self {
            actor,
            cache,
            updated: ObjectCache::new(),
            ops: OpLog::new(),
            observer,
            options: ContextOptions::default(),
            ids: Box::new(UuidAllocator),
            allocated: HashSet::new(),
        }
    }

    /// Start from a non-empty overlay
    pub fn with_updated(mut self, updated: ObjectCache) -> Self {
        self.updated = updated;
        self
    }

    pub fn with_options(mut self, options: ContextOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_allocator(mut self, ids: impl IdAllocator + 'a) -> Self {
        self.ids = Box::new(ids);
        self
    }

    pub fn actor(&self) -> &ActorId {
        &self.actor
    }

    /// Overwrite or create a map entry; no-op when the value is unchanged
    pub fn set_map_key(mut self, path: &[PathElement], key: &str, value: Value) -> Result<Change> {
        check_literal(&value, self.options)?;
        let view = self.view();
        let resolved = resolve(&view, path)?;
        let map = expect_map(view.object(&resolved.target)?)?;
        if let Some(slot) = map.get(key) {
            if view.materialize(slot.value())?.same_as(&value) {
                debug!(obj = %resolved.target, key, "Assignment leaves value unchanged");
                return Ok(self.unchanged(()));
            }
        }

        let target = resolved.target.clone();
        let mut emitter = self.emitter();
        let value = emitter.set_value(&target, Key::from(key), value, false);
        let site = ObjectDiff::new(target, ObjectType::Map).with_prop(key, emitter.actor.clone(), value);
        self.finish(&resolved, site, None, ())
    }

    /// Remove a map entry; no-op when the key is absent
    pub fn delete_map_key(mut self, path: &[PathElement], key: &str) -> Result<Change> {
        let view = self.view();
        let resolved = resolve(&view, path)?;
        let map = expect_map(view.object(&resolved.target)?)?;
        if map.get(key).is_none() {
            return Ok(self.unchanged(()));
        }

        let target = resolved.target.clone();
        let mut emitter = self.emitter();
        emitter.ops.push(Op::del(target.clone(), key));
        let site = ObjectDiff::new(target, ObjectType::Map).with_values(key, DiffValues::new());
        self.finish(&resolved, site, None, ())
    }

    /// Overwrite an existing list or text element; never inserts
    pub fn set_list_index(mut self, path: &[PathElement], index: usize, value: Value) -> Result<Change> {
        check_literal(&value, self.options)?;
        let view = self.view();
        let resolved = resolve(&view, path)?;
        let object = view.object(&resolved.target)?;
        let list = expect_sequence(object)?;
        if index >= list.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: list.len(),
            });
        }
        let kind = object.object_type();
        if kind == ObjectType::Text {
            check_text_element(&value)?;
        }
        if let Some(slot) = list.get(index) {
            if view.materialize(slot.value())?.same_as(&value) {
                debug!(obj = %resolved.target, index, "Assignment leaves element unchanged");
                return Ok(self.unchanged(()));
            }
        }

        let target = resolved.target.clone();
        let mut emitter = self.emitter();
        let value = emitter.set_value(&target, Key::Index(index), value, false);
        let site = ObjectDiff::new(target, kind).with_prop(index, emitter.actor.clone(), value);
        self.finish(&resolved, site, None, ())
    }

    /// Delete `deletions` elements at `start`, then insert `insertions` there
    pub fn splice(
        mut self,
        path: &[PathElement],
        start: usize,
        deletions: usize,
        insertions: Vec<Value>,
    ) -> Result<Change> {
        let view = self.view();
        let resolved = resolve(&view, path)?;
        let object = view.object(&resolved.target)?;
        let len = expect_sequence(object)?.len();
        if start > len {
            return Err(Error::IndexOutOfRange { index: start, len });
        }
        if deletions > len - start {
            return Err(Error::IndexOutOfRange {
                index: start.saturating_add(deletions - 1),
                len,
            });
        }
        let kind = object.object_type();
        for value in &insertions {
            check_literal(value, self.options)?;
            if kind == ObjectType::Text {
                check_text_element(value)?;
            }
        }
        if deletions == 0 && insertions.is_empty() {
            return Ok(self.unchanged(()));
        }

        let target = resolved.target.clone();
        let mut site = ObjectDiff::new(target.clone(), kind);
        let mut emitter = self.emitter();
        for _ in 0..deletions {
            emitter.ops.push(Op::del(target.clone(), start));
            site.edits.push(Edit::remove(start));
        }
        emitter.insert_items(&mut site, start, insertions);
        self.finish(&resolved, site, None, ())
    }

    /// Add a row (a map literal) to a table, returning its new id
    pub fn add_table_row(mut self, path: &[PathElement], row: Value) -> Result<Change<ObjectId>> {
        let entries = match row {
            Value::Map(entries) => entries,
            other => return Err(Error::type_mismatch("map", other.type_name())),
        };
        for value in entries.values() {
            check_literal(value, self.options)?;
        }
        let view = self.view();
        let resolved = resolve(&view, path)?;
        expect_table(view.object(&resolved.target)?)?;

        let target = resolved.target.clone();
        let mut emitter = self.emitter();
        let (row_id, row_diff) = emitter.add_row(&target, entries);
        let site = ObjectDiff::new(target, ObjectType::Table).with_prop(&row_id, &row_id, row_diff);
        self.finish(&resolved, site, None, row_id)
    }

    /// Remove a table row by id
    pub fn delete_table_row(mut self, path: &[PathElement], row_id: &ObjectId) -> Result<Change> {
        let view = self.view();
        let resolved = resolve(&view, path)?;
        if !expect_table(view.object(&resolved.target)?)?.contains(row_id) {
            return Err(Error::RowNotFound(row_id.clone()));
        }

        let target = resolved.target.clone();
        let mut emitter = self.emitter();
        emitter.ops.push(Op::del(target.clone(), row_id));
        let site = ObjectDiff::new(target, ObjectType::Table).with_values(row_id, DiffValues::new());
        self.finish(&resolved, site, None, ())
    }

    /// Add `delta` to the counter at `key` (a map key or list index)
    pub fn increment(mut self, path: &[PathElement], key: impl Into<Key>, delta: i64) -> Result<Change> {
        let key = key.into();
        let view = self.view();
        let resolved = resolve(&view, path)?;
        let object = view.object(&resolved.target)?;
        let slot = counter_slot(object, &key)?;
        let current = slot
            .value()
            .as_counter()
            .ok_or_else(|| Error::type_mismatch("counter", slot.value().type_name()))?;
        let kind = object.object_type();
        let absolute = current
            .checked_add(delta)
            .ok_or(Error::CounterOverflow { current, delta })?;

        let target = resolved.target.clone();
        let mut emitter = self.emitter();
        emitter.ops.push(Op::inc(target.clone(), key.clone(), delta));
        let actor = emitter.actor.clone();
        let site = ObjectDiff::new(target.clone(), kind).with_prop(
            key.clone(),
            actor.clone(),
            DiffValue::counter(absolute as f64),
        );
        let reported = match self.options.counter_patch {
            CounterPatch::Absolute => None,
            CounterPatch::Delta => Some(
                ObjectDiff::new(target, kind).with_prop(key, actor, DiffValue::counter(delta as f64)),
            ),
        };
        self.finish(&resolved, site, reported, ())
    }

    fn view(&self) -> View<'_> {
        View::layered(self.cache, &self.updated)
    }

    fn emitter(&mut self) -> Emitter<'_> {
        Emitter {
            actor: &self.actor,
            view: View::layered(self.cache, &self.updated),
            ops: &mut self.ops,
            ids: self.ids.as_mut(),
            allocated: &mut self.allocated,
            options: self.options,
        }
    }

    fn unchanged<T>(self, output: T) -> Change<T> {
        Change {
            ops: Vec::new(),
            updated: self.updated,
            output,
        }
    }

    /// Root the site diff, materialize it into the overlay, then notify the
    /// observer. `reported` replaces the site diff in what the observer sees.
    fn finish<T>(
        mut self,
        resolved: &ResolvedPath,
        site: ObjectDiff,
        reported: Option<ObjectDiff>,
        output: T,
    ) -> Result<Change<T>> {
        let (diff, reported) = {
            let view = self.view();
            let diff = root_diff(&view, resolved, site)?;
            let reported = reported
                .map(|site| root_diff(&view, resolved, site))
                .transpose()?;
            (diff, reported)
        };

        apply_diff(&diff, self.cache, &mut self.updated)?;
        self.observer
            .on_patch(reported.as_ref().unwrap_or(&diff), &mut self.updated);

        debug!(
            actor = %self.actor,
            obj = %resolved.target,
            ops = self.ops.len(),
            touched = self.updated.len(),
            "Compiled local change"
        );
        Ok(Change {
            ops: self.ops.into_ops(),
            updated: self.updated,
            output,
        })
    }
}

/// Appends ops for new values and builds their diffs
struct Emitter<'b> {
    actor: &'b ActorId,
    view: View<'b>,
    ops: &'b mut OpLog,
    ids: &'b mut dyn IdAllocator,
    allocated: &'b mut HashSet<ObjectId>,
    options: ContextOptions,
}

impl Emitter<'_> {
    /// A provisional id unused by the snapshot, the overlay and this transaction
    fn fresh_id(&mut self) -> ObjectId {
        loop {
            let id = self.ids.allocate();
            if !id.is_root() && !self.view.contains(&id) && self.allocated.insert(id.clone()) {
                return id;
            }
            debug!(id = %id, "Allocated id already in use; retrying");
        }
    }

    fn set_value(&mut self, obj: &ObjectId, key: Key, value: Value, insert: bool) -> DiffValue {
        match value {
            Value::Primitive(p) => {
                self.ops
                    .push(Op::set(obj.clone(), key, p.clone()).with_insert(insert));
                DiffValue::leaf(p)
            }
            Value::Date(t) => {
                let seconds = timestamp_seconds(t);
                self.ops.push(
                    Op::set(obj.clone(), key, seconds)
                        .with_insert(insert)
                        .with_datatype(DataType::Timestamp),
                );
                DiffValue::timestamp(seconds)
            }
            Value::Counter(n) => {
                self.ops.push(
                    Op::set(obj.clone(), key, n as f64)
                        .with_insert(insert)
                        .with_datatype(DataType::Counter),
                );
                DiffValue::counter(n as f64)
            }
            Value::Map(entries) => {
                let child = self.make(ObjectType::Map, obj, key, insert);
                DiffValue::Object(self.fill_map(child, entries))
            }
            Value::List(items) => {
                let child = self.make(ObjectType::List, obj, key, insert);
                let mut diff = ObjectDiff::new(child, ObjectType::List);
                self.insert_items(&mut diff, 0, items);
                DiffValue::Object(diff)
            }
            Value::Text(text) => {
                let child = self.make(ObjectType::Text, obj, key, insert);
                let mut diff = ObjectDiff::new(child, ObjectType::Text);
                let chars = text.chars().map(|c| Value::from(c.to_string())).collect();
                self.insert_items(&mut diff, 0, chars);
                DiffValue::Object(diff)
            }
            Value::Table(rows) => {
                let child = self.make(ObjectType::Table, obj, key, insert);
                DiffValue::Object(self.fill_table(child, rows))
            }
        }
    }

    fn make(&mut self, kind: ObjectType, obj: &ObjectId, key: Key, insert: bool) -> ObjectId {
        let child = self.fresh_id();
        self.ops
            .push(Op::make(kind, obj.clone(), key, child.clone()).with_insert(insert));
        child
    }

    fn fill_map(&mut self, id: ObjectId, entries: BTreeMap<String, Value>) -> ObjectDiff {
        let mut diff = ObjectDiff::new(id.clone(), ObjectType::Map);
        for (key, value) in entries {
            let value = self.set_value(&id, Key::from(key.as_str()), value, false);
            diff = diff.with_prop(key, self.actor.clone(), value);
        }
        diff
    }

    fn fill_table(&mut self, id: ObjectId, rows: Vec<Value>) -> ObjectDiff {
        let mut diff = ObjectDiff::new(id.clone(), ObjectType::Table);
        if rows.is_empty() {
            return diff;
        }
        if self.options.table_literals == TableLiterals::Ignore {
            warn!(table = %id, rows = rows.len(), "Table literal rows ignored; table created empty");
            return diff;
        }
        for row in rows {
            // check_literal guarantees every row is a map
            if let Value::Map(entries) = row {
                let (row_id, row_diff) = self.add_row(&id, entries);
                diff = diff.with_prop(&row_id, &row_id, row_diff);
            }
        }
        diff
    }

    fn add_row(&mut self, table: &ObjectId, entries: BTreeMap<String, Value>) -> (ObjectId, ObjectDiff) {
        let row_id = self.fresh_id();
        self.ops.push(Op::make(
            ObjectType::Map,
            table.clone(),
            &row_id,
            row_id.clone(),
        ));
        let diff = self.fill_map(row_id.clone(), entries);
        (row_id, diff)
    }

    /// Insert `items` at `start`, one op, edit and prop per element
    fn insert_items(&mut self, diff: &mut ObjectDiff, start: usize, items: Vec<Value>) {
        let obj = diff.object_id.clone();
        for (offset, item) in items.into_iter().enumerate() {
            let index = start + offset;
            let value = self.set_value(&obj, Key::Index(index), item, true);
            diff.edits.push(Edit::insert(index));
            diff.props
                .entry(Key::Index(index))
                .or_default()
                .insert(self.actor.clone(), value);
        }
    }
}

fn expect_map(object: &Object) -> Result<&crate::object::Map> {
    object
        .as_map()
        .ok_or_else(|| Error::type_mismatch("map", object.object_type().to_string()))
}

fn expect_sequence(object: &Object) -> Result<&crate::object::List> {
    object
        .as_sequence()
        .ok_or_else(|| Error::type_mismatch("list or text", object.object_type().to_string()))
}

fn expect_table(object: &Object) -> Result<&crate::object::Table> {
    object
        .as_table()
        .ok_or_else(|| Error::type_mismatch("table", object.object_type().to_string()))
}

fn counter_slot<'o>(object: &'o Object, key: &Key) -> Result<&'o Slot> {
    match (object, key) {
        (Object::Map(map), Key::Map(k)) => map
            .get(k)
            .ok_or_else(|| Error::type_mismatch("counter", "nothing")),
        (Object::List(list) | Object::Text(list), Key::Index(i)) => {
            list.get(*i).ok_or(Error::IndexOutOfRange {
                index: *i,
                len: list.len(),
            })
        }
        _ => Err(Error::type_mismatch(
            format!("counter container keyed by {}", key),
            object.object_type().to_string(),
        )),
    }
}

fn check_text_element(value: &Value) -> Result<()> {
    match value.as_primitive() {
        Some(p) if p.is_char() => Ok(()),
        _ => Err(Error::type_mismatch("single character", value.type_name())),
    }
}

/// Reject literals that cannot be written without partial output
fn check_literal(value: &Value, options: ContextOptions) -> Result<()> {
    match value {
        Value::Map(entries) => entries.values().try_for_each(|v| check_literal(v, options)),
        Value::List(items) => items.iter().try_for_each(|v| check_literal(v, options)),
        Value::Table(rows) if options.table_literals == TableLiterals::Populate => {
            rows.iter().try_for_each(|row| match row {
                Value::Map(_) => check_literal(row, options),
                other => Err(Error::type_mismatch("map", other.type_name())),
            })
        }
        _ => Ok(()),
    }
}
