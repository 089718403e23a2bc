//! Identifiers: objects, actors and the keys that address container slots

use serde::{Deserialize, Serialize};
use std::fmt;

/// Object ID of the document root map
pub const ROOT_ID: &str = "_root";

/// Identifier of a container object (map, list, text or table)
///
/// Ids allocated by a local edit are provisional until the merge engine's
/// patch confirms them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The reserved id of the document root
    pub fn root() -> Self {
        Self(ROOT_ID.to_string())
    }

    /// A fresh, locally allocated id
    pub fn provisional() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT_ID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(v: &str) -> Self {
        Self(v.to_string())
    }
}

impl From<String> for ObjectId {
    fn from(v: String) -> Self {
        Self(v)
    }
}

/// Identifier of a replica/session that produced a value
///
/// Only ever compared for equality and used for attribution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ActorId {
    fn from(v: &str) -> Self {
        Self(v.to_string())
    }
}

impl From<String> for ActorId {
    fn from(v: String) -> Self {
        Self(v)
    }
}

/// Table diffs file a row under its own id in the actor slot
impl From<&ObjectId> for ActorId {
    fn from(v: &ObjectId) -> Self {
        Self(v.as_str().to_string())
    }
}

/// Address of a slot inside a container: a map key (or table row id) or a
/// sequence index
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Map(String),
    Index(usize),
}

impl Key {
    pub fn as_map(&self) -> Option<&str> {
        match self {
            Key::Map(k) => Some(k),
            Key::Index(_) => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Map(k) => write!(f, "{}", k),
            Key::Index(i) => write!(f, "[{}]", i),
        }
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key::Map(v.to_string())
    }
}

impl From<String> for Key {
    fn from(v: String) -> Self {
        Key::Map(v)
    }
}

impl From<usize> for Key {
    fn from(v: usize) -> Self {
        Key::Index(v)
    }
}

impl From<&ObjectId> for Key {
    fn from(v: &ObjectId) -> Self {
        Key::Map(v.as_str().to_string())
    }
}
