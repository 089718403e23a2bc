//! Path resolution from the document root down to a mutation target

use crate::cache::View;
use crate::error::{Error, Result};
use crate::ids::{ActorId, Key, ObjectId};
use crate::object::Object;
use serde::{Deserialize, Serialize};

/// One step of a path: the key in the parent and the object found there
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathElement {
    pub key: Key,
    pub object_id: ObjectId,
}

impl PathElement {
    pub fn new(key: impl Into<Key>, object_id: ObjectId) -> Self {
        Self {
            key: key.into(),
            object_id,
        }
    }
}

/// A path step after resolution, with the conflict branch it walked through
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub parent: ObjectId,
    pub key: Key,
    /// Actor the walked branch is filed under in the parent's conflicts
    pub actor: ActorId,
    pub object_id: ObjectId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPath {
    pub steps: Vec<Step>,
    pub target: ObjectId,
}

/// Resolve `path` (root exclusive) against a cache view.
///
/// Fails with `BrokenPath` when a key is missing, when no conflict entry at
/// that key references the step's object, or when the object itself is gone.
pub fn resolve(view: &View<'_>, path: &[PathElement]) -> Result<ResolvedPath> {
    let mut current = ObjectId::root();
    let mut steps = Vec::with_capacity(path.len());

    for (i, element) in path.iter().enumerate() {
        let parent = view
            .get(&current)
            .ok_or_else(|| Error::broken_path(i, format!("object {} is not cached", current)))?;

        let actor = branch_actor(parent, element).ok_or_else(|| {
            Error::broken_path(
                i,
                format!(
                    "no entry at {} of {} references {}",
                    element.key, current, element.object_id
                ),
            )
        })?;

        if !view.contains(&element.object_id) {
            return Err(Error::broken_path(
                i,
                format!("object {} is not cached", element.object_id),
            ));
        }

        steps.push(Step {
            parent: current,
            key: element.key.clone(),
            actor,
            object_id: element.object_id.clone(),
        });
        current = element.object_id.clone();
    }

    Ok(ResolvedPath {
        steps,
        target: current,
    })
}

fn branch_actor(parent: &Object, element: &PathElement) -> Option<ActorId> {
    match (parent, &element.key) {
        (Object::Map(map), Key::Map(key)) => {
            map.get(key)?.actor_of(&element.object_id).cloned()
        }
        (Object::List(list) | Object::Text(list), Key::Index(index)) => {
            list.get(*index)?.actor_of(&element.object_id).cloned()
        }
        (Object::Table(table), Key::Map(key)) => table
            .row_by_key(key)
            .filter(|row| **row == element.object_id)
            .map(ActorId::from),
        _ => None,
    }
}
