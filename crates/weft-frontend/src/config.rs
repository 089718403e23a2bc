//! Frontend configuration, loaded from TOML

use crate::error::{FrontendError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use weft_core::{ActorId, ContextOptions};

/// Frontend settings
///
/// ```toml
/// actor = "b5a1c7e2"
///
/// [context]
/// counter-patch = "delta"
/// table-literals = "populate"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontendConfig {
    /// Actor id for local edits; a random one is generated when absent
    pub actor: Option<String>,
    /// Options handed to every transaction
    pub context: ContextOptions,
}

impl FrontendConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| FrontendError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| FrontendError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn actor_id(&self) -> ActorId {
        match &self.actor {
            Some(actor) => ActorId::from(actor.as_str()),
            None => ActorId::random(),
        }
    }
}
