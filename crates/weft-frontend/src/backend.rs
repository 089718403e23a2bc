//! The merge engine seam: requests out, authoritative patches back

use serde::{Deserialize, Serialize};
use weft_core::{ActorId, ObjectDiff, ObjectId, ObjectType, Op};

/// External merge engine holding the document's operation history
pub trait Backend {
    /// Submit one local change; the returned patch describes it relative to
    /// the state the request was compiled against
    fn apply_local_change(&mut self, request: &Request) -> Result<Patch, BackendError>;

    /// Patch from the empty document to the current state
    fn get_patch(&self) -> Result<Patch, BackendError>;

    /// Opaque binary form of the whole document
    fn save(&self) -> Result<Vec<u8>, BackendError>;

    /// Every change so far, each as an opaque binary blob
    fn get_changes(&self) -> Result<Vec<Vec<u8>>, BackendError>;

    /// Restore an engine from the output of `save`
    fn load(data: &[u8]) -> Result<Self, BackendError>
    where
        Self: Sized;

    /// Rebuild an engine by replaying blobs from `get_changes`, in order
    fn load_changes(changes: &[Vec<u8>]) -> Result<Self, BackendError>
    where
        Self: Sized;
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("Change rejected: {0}")]
    Rejected(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Merge engine error: {0}")]
    Engine(String),
}

/// A batch of ops from one local edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub actor: ActorId,
    /// Per-actor sequence number, starting at 1
    pub seq: u64,
    pub ops: Vec<Op>,
}

impl Request {
    pub fn new(actor: ActorId, seq: u64, ops: Vec<Op>) -> Self {
        Self { actor, seq, ops }
    }

    pub fn to_json(&self) -> Result<String, BackendError> {
        serde_json::to_string(self).map_err(|e| BackendError::Serialization(e.to_string()))
    }
}

/// Root-anchored changes from the merge engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    /// Actor and seq of the local request this patch answers, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<ActorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    pub diffs: ObjectDiff,
}

impl Patch {
    pub fn new(diffs: ObjectDiff) -> Self {
        Self {
            actor: None,
            seq: None,
            diffs,
        }
    }

    /// A patch that changes nothing
    pub fn empty() -> Self {
        Self::new(ObjectDiff::new(ObjectId::root(), ObjectType::Map))
    }

    /// Builder: mark the patch as the answer to `actor`'s request `seq`
    pub fn answering(mut self, actor: ActorId, seq: u64) -> Self {
        self.actor = Some(actor);
        self.seq = Some(seq);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, BackendError> {
        serde_json::from_str(json).map_err(|e| BackendError::Serialization(e.to_string()))
    }
}
