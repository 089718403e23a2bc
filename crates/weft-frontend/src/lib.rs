//! Weft Frontend - document state driven by local edits and a merge engine
//!
//! This crate owns the authoritative object cache of one document:
//! - Compiles each local edit with a single `weft_core::Context`
//! - Submits the resulting ops to a pluggable `Backend`
//! - Applies authoritative patches and prunes detached objects

pub mod backend;
pub mod config;
pub mod document;
pub mod error;

pub use backend::{Backend, BackendError, Patch, Request};
pub use config::FrontendConfig;
pub use document::{Applied, Frontend, LocalChange, Preview};
pub use error::{FrontendError, Result};
