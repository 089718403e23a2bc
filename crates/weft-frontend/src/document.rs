//! A document frontend: local edits in, authoritative state out

use crate::backend::{Backend, Patch, Request};
use crate::config::FrontendConfig;
use crate::error::Result;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};
use weft_core::{
    apply_diff, resolve, ActorId, Change, Context, ContextOptions, Key, ObjectCache, ObjectDiff,
    ObjectId, Op, PathElement, Snapshot, Value, View,
};

/// One local edit, addressed by a path from the root
#[derive(Debug, Clone, PartialEq)]
pub enum LocalChange {
    SetMapKey {
        path: Vec<PathElement>,
        key: String,
        value: Value,
    },
    DeleteMapKey {
        path: Vec<PathElement>,
        key: String,
    },
    SetListIndex {
        path: Vec<PathElement>,
        index: usize,
        value: Value,
    },
    Splice {
        path: Vec<PathElement>,
        start: usize,
        deletions: usize,
        insertions: Vec<Value>,
    },
    AddTableRow {
        path: Vec<PathElement>,
        row: Value,
    },
    DeleteTableRow {
        path: Vec<PathElement>,
        row_id: ObjectId,
    },
    Increment {
        path: Vec<PathElement>,
        key: Key,
        delta: i64,
    },
}

impl LocalChange {
    /// Run the matching transaction operation; the output is the new row id
    /// for `AddTableRow`
    fn run(self, context: Context<'_>) -> weft_core::Result<Change<Option<ObjectId>>> {
        match self {
            LocalChange::SetMapKey { path, key, value } => context
                .set_map_key(&path, &key, value)
                .map(|c| c.map(|()| None)),
            LocalChange::DeleteMapKey { path, key } => context
                .delete_map_key(&path, &key)
                .map(|c| c.map(|()| None)),
            LocalChange::SetListIndex { path, index, value } => context
                .set_list_index(&path, index, value)
                .map(|c| c.map(|()| None)),
            LocalChange::Splice {
                path,
                start,
                deletions,
                insertions,
            } => context
                .splice(&path, start, deletions, insertions)
                .map(|c| c.map(|()| None)),
            LocalChange::AddTableRow { path, row } => context
                .add_table_row(&path, row)
                .map(|c| c.map(Some)),
            LocalChange::DeleteTableRow { path, row_id } => context
                .delete_table_row(&path, &row_id)
                .map(|c| c.map(|()| None)),
            LocalChange::Increment { path, key, delta } => context
                .increment(&path, key, delta)
                .map(|c| c.map(|()| None)),
        }
    }
}

/// Result of a submitted edit
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    /// Sequence number of the request sent; `None` when the edit was a no-op
    /// and nothing was sent
    pub seq: Option<u64>,
    /// Id of the row created by `AddTableRow`
    pub row_id: Option<ObjectId>,
}

/// What an edit would do, without submitting it
#[derive(Debug, Clone, PartialEq)]
pub struct Preview {
    pub ops: Vec<Op>,
    /// The optimistic root patch; `None` for a no-op
    pub patch: Option<ObjectDiff>,
    /// The document as it would look after the edit
    pub root: Value,
    pub row_id: Option<ObjectId>,
}

/// Owns a document's authoritative cache and serialises local edits
/// against it: one transaction at a time, each merged or discarded before
/// the next starts.
pub struct Frontend<B> {
    backend: B,
    actor: ActorId,
    seq: u64,
    cache: Snapshot,
    options: ContextOptions,
}

impl<B: Backend> Frontend<B> {
    /// An empty document with a random actor id
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, &FrontendConfig::default())
    }

    /// An empty document
    pub fn with_config(backend: B, config: &FrontendConfig) -> Self {
        Self {
            backend,
            actor: config.actor_id(),
            seq: 0,
            cache: Arc::new(ObjectCache::with_root()),
            options: config.context,
        }
    }

    /// The backend's current document
    pub fn load(backend: B, config: &FrontendConfig) -> Result<Self> {
        let mut frontend = Self::with_config(backend, config);
        let patch = frontend.backend.get_patch()?;
        frontend.apply_patch(&patch)?;
        info!(
            actor = %frontend.actor,
            objects = frontend.cache.len(),
            "Loaded document"
        );
        Ok(frontend)
    }

    /// Restore a document from a backend's saved form
    pub fn from_saved(data: &[u8], config: &FrontendConfig) -> Result<Self> {
        let backend = B::load(data)?;
        debug!(bytes = data.len(), "Restored backend from saved document");
        Self::load(backend, config)
    }

    /// Rebuild a document by replaying a change history
    pub fn from_changes(changes: &[Vec<u8>], config: &FrontendConfig) -> Result<Self> {
        let backend = B::load_changes(changes)?;
        debug!(changes = changes.len(), "Replayed change history");
        Self::load(backend, config)
    }

    pub fn actor(&self) -> &ActorId {
        &self.actor
    }

    /// Sequence number of the last accepted local request
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// The current authoritative cache, shareable with readers
    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.cache)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Materialize the object at `path`
    pub fn get(&self, path: &[PathElement]) -> Result<Value> {
        let view = self.cache.view();
        let resolved = resolve(&view, path)?;
        Ok(view.materialize_object(&resolved.target)?)
    }

    pub fn root(&self) -> Result<Value> {
        self.get(&[])
    }

    pub fn preview(&self, change: LocalChange) -> Result<Preview> {
        let (compiled, patch) = self.compile(change)?;
        let root = View::layered(&self.cache, &compiled.updated).materialize_object(&ObjectId::root())?;
        Ok(Preview {
            ops: compiled.ops,
            patch,
            root,
            row_id: compiled.output,
        })
    }

    /// Compile `change`, submit it and merge the engine's answer.
    ///
    /// On rejection the edit leaves no trace: the cache and `seq` are
    /// unchanged.
    pub fn apply(&mut self, change: LocalChange) -> Result<Applied> {
        let (compiled, _) = self.compile(change)?;
        if compiled.is_noop() {
            debug!(actor = %self.actor, "Edit is a no-op; nothing submitted");
            return Ok(Applied {
                seq: None,
                row_id: compiled.output,
            });
        }

        let request = Request::new(self.actor.clone(), self.seq + 1, compiled.ops);
        let patch = match self.backend.apply_local_change(&request) {
            Ok(patch) => patch,
            Err(e) => {
                warn!(
                    actor = %self.actor,
                    seq = request.seq,
                    error = %e,
                    "Backend rejected local change; discarding overlay"
                );
                return Err(e.into());
            }
        };

        self.seq = request.seq;
        let pruned = self.merge(&patch.diffs)?;
        debug!(
            actor = %self.actor,
            seq = self.seq,
            ops = request.ops.len(),
            pruned,
            "Local change accepted"
        );
        Ok(Applied {
            seq: Some(self.seq),
            row_id: compiled.output,
        })
    }

    /// Apply a patch from the engine (a remote change, or a full reload)
    pub fn apply_patch(&mut self, patch: &Patch) -> Result<()> {
        let pruned = self.merge(&patch.diffs)?;
        if let (Some(actor), Some(seq)) = (&patch.actor, patch.seq) {
            if *actor == self.actor && seq > self.seq {
                self.seq = seq;
            }
        }
        debug!(pruned, objects = self.cache.len(), "Applied patch");
        Ok(())
    }

    pub fn save(&self) -> Result<Vec<u8>> {
        Ok(self.backend.save()?)
    }

    pub fn get_changes(&self) -> Result<Vec<Vec<u8>>> {
        Ok(self.backend.get_changes()?)
    }

    fn compile(&self, change: LocalChange) -> Result<(Change<Option<ObjectId>>, Option<ObjectDiff>)> {
        let mut local = None;
        let mut observer = |diff: &ObjectDiff, _: &mut ObjectCache| {
            trace!(obj = %diff.object_id, "Local patch");
            local = Some(diff.clone());
        };
        let context = Context::new(self.actor.clone(), &self.cache, &mut observer)
            .with_options(self.options);
        let compiled = change.run(context)?;
        Ok((compiled, local))
    }

    /// Apply `diff` to the cache without touching it on failure, then drop
    /// whatever became unreachable. Returns the number of objects dropped.
    fn merge(&mut self, diff: &ObjectDiff) -> Result<usize> {
        let mut overlay = ObjectCache::new();
        apply_diff(diff, &self.cache, &mut overlay)?;
        let cache = Arc::make_mut(&mut self.cache);
        cache.absorb(overlay);
        Ok(cache.retain_reachable())
    }
}
