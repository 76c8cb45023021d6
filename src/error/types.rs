//! Dispatch error types
//!
//! Expected "no result" outcomes (no candidates, every key cooling down) are
//! plain `Option`s and never show up here.

use std::path::PathBuf;
use thiserror::Error;

/// Failure while reading or mutating endpoint configuration
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read endpoint file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid endpoint file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Duplicate endpoint id: {0}")]
    DuplicateId(String),

    #[error("Unknown endpoint id: {0}")]
    UnknownId(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Failure surfaced by the dispatch engine
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Configuration store error: {0}")]
    Store(#[from] StoreError),
}
