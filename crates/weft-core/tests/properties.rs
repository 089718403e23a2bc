//! Property-based tests for the mutation transaction.

use proptest::prelude::*;
use weft_core::{
    ActorId, Cell, Conflicts, Context, DiffValue, Edit, IdAllocator, List, Map, Object,
    ObjectCache, ObjectDiff, ObjectId, OpAction, PatchObserver, PathElement, Primitive, Slot,
    Table, Value,
};

// =============================================================================
// Test helpers
// =============================================================================

#[derive(Default)]
struct Spy {
    patches: Vec<ObjectDiff>,
}

impl PatchObserver for Spy {
    fn on_patch(&mut self, diff: &ObjectDiff, _updated: &mut ObjectCache) {
        self.patches.push(diff.clone());
    }
}

/// Returns ids from a pool, cycling, then unique ones
struct Colliding {
    pool: Vec<ObjectId>,
    calls: usize,
}

impl IdAllocator for Colliding {
    fn allocate(&mut self) -> ObjectId {
        self.calls += 1;
        match self.pool.get(self.calls - 1) {
            Some(id) => id.clone(),
            None => ObjectId::new(format!("fresh-{}", self.calls)),
        }
    }
}

fn primitive() -> impl Strategy<Value = Primitive> {
    prop_oneof![
        Just(Primitive::Null),
        any::<bool>().prop_map(Primitive::Bool),
        (-1000i32..1000).prop_map(|n| Primitive::Number(f64::from(n))),
        "[a-z]{0,6}".prop_map(Primitive::String),
    ]
}

/// Literal trees of bounded depth without tables
fn literal() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        primitive().prop_map(Value::Primitive),
        (-50i64..50).prop_map(Value::Counter),
        "[a-z]{0,4}".prop_map(Value::Text),
    ];
    leaf.prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
            prop::collection::btree_map("[a-z]{1,3}", inner, 0..4).prop_map(Value::Map),
        ]
    })
}

fn conflicts(values: &[Primitive]) -> Conflicts {
    values
        .iter()
        .enumerate()
        .map(|(i, p)| (ActorId::new(format!("actor{}", i)), Cell::Primitive(p.clone())))
        .collect()
}

/// Snapshot with `value` committed at root key "k"
fn committed(value: Value) -> ObjectCache {
    let cache = ObjectCache::with_root();
    let mut spy = Spy::default();
    let change = Context::new(ActorId::new("writer"), &cache, &mut spy)
        .set_map_key(&[], "k", value)
        .expect("assignment to empty root");
    let mut snapshot = cache;
    snapshot.absorb(change.updated);
    snapshot
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Re-assigning the value a key already shows emits nothing
    #[test]
    fn assignment_of_current_value_is_noop(value in literal()) {
        let snapshot = committed(value.clone());
        let mut spy = Spy::default();

        let change = Context::new(ActorId::random(), &snapshot, &mut spy)
            .set_map_key(&[], "k", value)
            .unwrap();

        prop_assert!(change.ops.is_empty());
        prop_assert!(spy.patches.is_empty());
    }

    /// Idempotence holds whatever the conflicts behind the winner
    #[test]
    fn contested_assignment_of_winner_is_noop(
        values in prop::collection::vec(primitive(), 1..6),
        pick in any::<prop::sample::Index>(),
    ) {
        let winner = pick.index(values.len());
        let slot = Slot::with_conflicts(conflicts(&values), format!("actor{}", winner)).unwrap();
        let mut cache = ObjectCache::new();
        cache.insert(Object::Map(Map::new(ObjectId::root()).with("k", slot)));
        let mut spy = Spy::default();

        let change = Context::new(ActorId::random(), &cache, &mut spy)
            .set_map_key(&[], "k", Value::Primitive(values[winner].clone()))
            .unwrap();

        prop_assert!(change.ops.is_empty());
        prop_assert!(spy.patches.is_empty());
    }

    /// Any successful assignment leaves exactly one entry, the acting actor's
    #[test]
    fn assignment_collapses_conflicts(
        values in prop::collection::vec(primitive(), 1..6),
        value in literal(),
    ) {
        let slot = Slot::with_conflicts(conflicts(&values), "actor0").unwrap();
        let mut cache = ObjectCache::new();
        cache.insert(Object::Map(Map::new(ObjectId::root()).with("k", slot)));
        let actor = ActorId::new("local");
        let mut spy = Spy::default();

        let change = Context::new(actor.clone(), &cache, &mut spy)
            .set_map_key(&[], "k", value.clone())
            .unwrap();

        if change.ops.is_empty() {
            prop_assert_eq!(Value::Primitive(values[0].clone()), value);
        } else {
            let entry = spy.patches[0].values("k").unwrap();
            prop_assert_eq!(entry.len(), 1);
            prop_assert!(entry.contains_key(&actor));
            let root = change.updated.get(&ObjectId::root()).unwrap().as_map().unwrap();
            prop_assert!(!root.get("k").unwrap().is_contested());
        }
    }

    /// Composite assignments open with one make op whose child the rest build on
    #[test]
    fn creation_starts_with_make(value in literal()) {
        prop_assume!(value.is_composite());
        let cache = ObjectCache::with_root();
        let mut spy = Spy::default();

        let change = Context::new(ActorId::random(), &cache, &mut spy)
            .set_map_key(&[], "k", value)
            .unwrap();

        let first = &change.ops[0];
        prop_assert!(first.action.is_make());
        prop_assert_eq!(&first.obj, &ObjectId::root());
        let mut known = vec![first.child.clone().unwrap()];
        for op in &change.ops[1..] {
            prop_assert!(known.contains(&op.obj));
            if let Some(child) = &op.child {
                known.push(child.clone());
            }
        }
        prop_assert_eq!(spy.patches.len(), 1);
    }

    /// Op count and edit shape of a splice follow from its arguments alone
    #[test]
    fn splice_arithmetic(
        len in 0usize..8,
        start_pick in any::<prop::sample::Index>(),
        deletion_pick in any::<prop::sample::Index>(),
        insertions in prop::collection::vec("[a-z]{1,5}", 0..5),
    ) {
        let start = start_pick.index(len + 1);
        let deletions = deletion_pick.index(len - start + 1);
        let list_id = ObjectId::new("list");
        let mut list = List::new(list_id.clone());
        for i in 0..len {
            list = list.with(Slot::new("actor1", format!("item{}", i).as_str()));
        }
        let mut cache = ObjectCache::new();
        cache.insert(Object::List(list));
        cache.insert(Object::Map(
            Map::new(ObjectId::root()).with("list", Slot::new("actor1", &list_id)),
        ));
        let insert_count = insertions.len();
        let mut spy = Spy::default();

        let change = Context::new(ActorId::random(), &cache, &mut spy)
            .splice(
                &[PathElement::new("list", list_id.clone())],
                start,
                deletions,
                insertions.into_iter().map(Value::from).collect(),
            )
            .unwrap();

        prop_assert_eq!(change.ops.len(), deletions + insert_count);
        prop_assert!(change.ops[..deletions].iter().all(|op| op.action == OpAction::Del));
        if change.ops.is_empty() {
            prop_assert!(spy.patches.is_empty());
        } else {
            let site = spy.patches[0].child("list", "actor1").unwrap();
            let expected: Vec<Edit> = std::iter::repeat(Edit::remove(start))
                .take(deletions)
                .chain((0..insert_count).map(|i| Edit::insert(start + i)))
                .collect();
            prop_assert_eq!(&site.edits, &expected);
            let updated = change.updated.get(&list_id).unwrap().as_sequence().unwrap();
            prop_assert_eq!(updated.len(), len - deletions + insert_count);
        }
    }

    /// Nested edits attribute to the walked branch at the ancestor
    #[test]
    fn nested_edits_attribute_to_branch(branches in 1usize..5, pick in any::<prop::sample::Index>()) {
        let walked = pick.index(branches);
        let mut cache = ObjectCache::new();
        let mut entries = Conflicts::new();
        for i in 0..branches {
            let id = ObjectId::new(format!("child{}", i));
            cache.insert(Object::Map(Map::new(id.clone())));
            entries.insert(ActorId::new(format!("actor{}", i)), Cell::from(&id));
        }
        let slot = Slot::with_conflicts(entries, "actor0").unwrap();
        cache.insert(Object::Map(Map::new(ObjectId::root()).with("birds", slot)));
        let actor = ActorId::new("local");
        let target = ObjectId::new(format!("child{}", walked));
        let mut spy = Spy::default();

        Context::new(actor.clone(), &cache, &mut spy)
            .set_map_key(&[PathElement::new("birds", target.clone())], "k", Value::from(1.0))
            .unwrap();

        let level = spy.patches[0].values("birds").unwrap();
        prop_assert_eq!(level.len(), branches);
        let branch = level[&ActorId::new(format!("actor{}", walked))].as_object().unwrap();
        prop_assert_eq!(&branch.object_id, &target);
        prop_assert_eq!(
            branch.values("k").unwrap().get(&actor),
            Some(&DiffValue::from(1.0))
        );
    }

    /// New row ids never collide with anything already cached or allocated
    #[test]
    fn row_ids_are_fresh(existing in 0usize..6, collisions in 0usize..6) {
        let table_id = ObjectId::new("table");
        let mut cache = ObjectCache::new();
        let mut table = Table::new(table_id.clone());
        let mut pool = vec![ObjectId::root(), table_id.clone()];
        for i in 0..existing {
            let row = ObjectId::new(format!("row{}", i));
            cache.insert(Object::Map(Map::new(row.clone())));
            table = table.with(row.clone());
            pool.push(row);
        }
        pool.truncate(collisions.min(pool.len()));
        cache.insert(Object::Table(table));
        cache.insert(Object::Map(
            Map::new(ObjectId::root()).with("books", Slot::new("actor1", &table_id)),
        ));
        let before: Vec<ObjectId> = cache.ids().cloned().collect();
        let mut spy = Spy::default();

        let change = Context::new(ActorId::random(), &cache, &mut spy)
            .with_allocator(Colliding { pool, calls: 0 })
            .add_table_row(
                &[PathElement::new("books", table_id)],
                Value::map([("title", Value::from("Frankenstein"))]),
            )
            .unwrap();

        prop_assert!(!before.contains(&change.output));
        prop_assert!(!change.output.is_root());
    }
}
