use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StowageError>;

/// Process-level failures: configuration, startup, and one-shot commands.
///
/// Stage failures inside a fire never surface as this type; they are
/// recorded in the fire's outcome instead.
#[derive(Debug, Error)]
pub enum StowageError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] stowage_storage::StorageError),

    #[error("{0}")]
    List(#[from] stowage_storage::ListError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("archive command timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("archive command exited with {code}: {stderr}")]
    Exit { code: String, stderr: String },

    #[error("archive '{}' was not written: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot prepare staging directory '{}': {source}", path.display())]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid mail address '{address}': {message}")]
    Address { address: String, message: String },

    #[error("failed to build message: {0}")]
    Message(String),

    #[error("SMTP relay error: {0}")]
    Transport(String),
}
