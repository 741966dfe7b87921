//! Error taxonomy for the pipelines.
//!
//! - [`MaterializeError`]: clone/checkout failures. Fatal, never retried.
//! - [`ServiceError`]: any external collaborator (chat, document store, blob
//!   store, secret store, hosting API). Retried by the whole-repository engine,
//!   fatal in the commit pipeline.
//! - [`FileError`]: why a single attempt at a single file failed.
//! - [`IngestError`] / [`DiffError`]: whole-run failures.

use std::path::PathBuf;

use thiserror::Error;

/// Failure reported by an external service behind one of the trait seams in
/// [`crate::contract`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{service} unavailable: {message}")]
    Unavailable { service: String, message: String },
    #[error("{service} rejected the request with status {status}: {message}")]
    Rejected {
        service: String,
        status: u16,
        message: String,
    },
    #[error("{service} returned a malformed response: {message}")]
    Malformed { service: String, message: String },
    #[error("{0} not found")]
    NotFound(String),
}

impl ServiceError {
    pub fn unavailable(service: impl Into<String>, message: impl ToString) -> Self {
        ServiceError::Unavailable {
            service: service.into(),
            message: message.to_string(),
        }
    }

    pub fn malformed(service: impl Into<String>, message: impl ToString) -> Self {
        ServiceError::Malformed {
            service: service.into(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("failed to clone {url}: {message}")]
    Clone { url: String, message: String },
    #[error("commit {commit} is not available on {reference}: {message}")]
    Checkout {
        reference: String,
        commit: String,
        message: String,
    },
    #[error("failed to obtain ssh key {name}: {source}")]
    Secret {
        name: String,
        #[source]
        source: ServiceError,
    },
    #[error("i/o error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why one attempt at documenting one file failed.
#[derive(Debug, Error)]
pub enum FileError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{relative} is not valid UTF-8 text")]
    NotText { relative: String },
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Materialize(#[from] MaterializeError),
    #[error("failed to walk {}: {message}", path.display())]
    Walk { path: PathBuf, message: String },
    #[error("ingestion cancelled")]
    Cancelled,
    #[error("worker task failed: {0}")]
    Worker(String),
}

#[derive(Debug, Error)]
pub enum DiffError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("{0} is not a repository this host can address")]
    UnknownRepository(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("prompt configuration {name} is not a JSON array of prompts: {source}")]
    Prompts {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("prompt configuration {0} contains no prompts")]
    EmptyPrompts(String),
    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
    #[error(transparent)]
    Service(#[from] ServiceError),
}
