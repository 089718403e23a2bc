//! Error types for the Weft frontend

use crate::backend::BackendError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrontendError {
    #[error(transparent)]
    Core(#[from] weft_core::Error),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for frontend operations
pub type Result<T> = std::result::Result<T, FrontendError>;
