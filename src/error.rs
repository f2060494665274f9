//! Engine error types.

use std::io;
use thiserror::Error;

/// Errors surfaced by the recovery engine.
///
/// Per-file problems inside a scan (rejected candidates, duplicate content,
/// hash mismatches) are counted in statistics instead of being raised here;
/// only device- and job-level failures use this type.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("unsupported device: {0}")]
    UnsupportedDevice(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("read error at offset {offset}: {message}")]
    ReadError { offset: u64, message: String },

    #[error("no recognizable filesystem on {0}")]
    FilesystemUnrecognized(String),

    #[error("{strategy} requires raw device access, but {device} is open in mounted mode")]
    RawAccessRequired {
        strategy: &'static str,
        device: String,
    },

    #[error("no carvable signatures selected")]
    EmptySignatureSet,

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("scan cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, EngineError>;
