//! Error types for RO-Crate handling

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RoCrateError {
    #[error("'{0}' not found")]
    NotFound(PathBuf),

    #[error("invalid crate: {0}")]
    InvalidCrate(String),

    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("cannot set or delete '{0}'")]
    InvalidKey(String),

    #[error("if provided, dest_path must be relative: {0}")]
    InvalidPath(PathBuf),

    #[error("'{base}': part '{part}' is not a relative path")]
    InvalidPartReference { base: String, part: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
}
