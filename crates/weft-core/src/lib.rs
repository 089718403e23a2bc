//! Weft Core - local change compiler for a CRDT document frontend
//!
//! This crate turns local edits into CRDT operations and patches:
//! - Value model and cached CRDT objects with per-actor conflicts
//! - Copy-on-write overlay over a read-only snapshot
//! - Path resolution, op emission and root-anchored diffs

pub mod apply;
pub mod cache;
pub mod context;
pub mod diff;
pub mod error;
pub mod ids;
pub mod object;
pub mod op;
pub mod path;
pub mod value;

pub use apply::apply_diff;
pub use cache::{ObjectCache, Snapshot, View};
pub use context::{
    Change, Context, ContextOptions, CounterPatch, IdAllocator, PatchObserver, TableLiterals,
    UuidAllocator,
};
pub use diff::{DiffValue, DiffValues, Edit, EditAction, LeafDiff, ObjectDiff};
pub use error::{Error, Result};
pub use ids::{ActorId, Key, ObjectId, ROOT_ID};
pub use object::{Conflicts, List, Map, Object, Slot, Table};
pub use op::{Op, OpAction, OpLog};
pub use path::{resolve, PathElement, ResolvedPath, Step};
pub use value::{Cell, DataType, ObjectType, Primitive, Value};
