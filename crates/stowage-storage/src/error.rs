use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

/// Failure to construct a backend from its configuration.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Error)]
pub enum ListError {
    #[error("LIST '{prefix}' failed: {message}")]
    Request { prefix: String, message: String },

    #[error("LIST '{prefix}': malformed response: {message}")]
    Malformed { prefix: String, message: String },
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("cannot read local file '{}': {source}", path.display())]
    LocalFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("PUT '{key}' failed: {message}")]
    Request { key: String, message: String },
}

#[derive(Debug, Error)]
pub enum DeleteError {
    #[error("batch DELETE of {count} key(s) failed: {message}")]
    Request { count: usize, message: String },

    #[error("batch DELETE: malformed response: {0}")]
    Malformed(String),
}
