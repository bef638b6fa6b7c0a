//! Error types for the watermark pipeline.

use std::fmt;
use thiserror::Error;

/// Which storage operation a [`PipelineError::Storage`] failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoragePhase {
    Download,
    Upload,
}

impl fmt::Display for StoragePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoragePhase::Download => write!(f, "download"),
            StoragePhase::Upload => write!(f, "upload"),
        }
    }
}

/// Centralized error type for the watermark pipeline.
///
/// Only `Resize` is recovered locally (the pipeline falls back to the
/// unresized logo); every other variant aborts the current request and is
/// surfaced to the caller. `Config` is fatal at startup - the process must
/// not serve requests with incomplete configuration.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Missing or invalid configuration (environment variables)
    #[error("configuration error: {0}")]
    Config(String),

    /// Request failed validation before any work started
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The per-invocation scratch directory could not be created
    #[error("workspace error: {0}")]
    Workspace(String),

    /// An input image could not be read or decoded
    #[error("failed to load asset {path}: {reason}")]
    AssetLoad { path: String, reason: String },

    /// Caption rendering or output encoding failed
    #[error("failed to render caption: {0}")]
    Render(String),

    /// Logo resizing failed (recoverable: caller degrades to the unresized logo)
    #[error("failed to resize logo: {0}")]
    Resize(String),

    /// The external compositing tool failed; carries its diagnostic output
    #[error("compositing failed: {diagnostic}")]
    Composite { diagnostic: String },

    /// An object storage transfer failed
    #[error("storage {phase} failed for {key}: {reason}")]
    Storage {
        phase: StoragePhase,
        key: String,
        reason: String,
    },
}

impl PipelineError {
    pub fn storage(phase: StoragePhase, key: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Storage {
            phase,
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    pub fn asset_load(path: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self::AssetLoad {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}
