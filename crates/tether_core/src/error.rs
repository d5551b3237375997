use thiserror::Error;

use crate::status::FileStatus;

/// Unified error type for tether operations
#[derive(Debug, Error)]
pub enum TetherError {
    // Content errors
    #[error("File content is not valid UTF-8")]
    InvalidEncoding,

    // Lifecycle errors
    #[error("File is not ready to save (status: {status})")]
    NotReady { status: FileStatus },

    #[error("File does not accept edits (status: {status})")]
    EditRejected { status: FileStatus },

    #[error("File cannot be opened from status {status}")]
    AlreadyOpen { status: FileStatus },
}

/// Result type alias for tether operations
pub type Result<T> = std::result::Result<T, TetherError>;
