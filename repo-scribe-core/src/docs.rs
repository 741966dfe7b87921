//! Rendered documentation in blob storage.
//!
//! Key scheme:
//! - whole repository: `documentation/<repo-name>/<relative path>.out`
//! - one commit: `documentation/whole/<sha>/<relative path>.out` for whole-file
//!   documentation and `documentation/commit/<sha>/<relative path>.out` for the
//!   diff summary.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::contract::BlobStore;
use crate::error::ServiceError;
use crate::qa::Answer;

const PREFIX: &str = "documentation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitDocKind {
    WholeFile,
    DiffSummary,
}

impl CommitDocKind {
    fn segment(self) -> &'static str {
        match self {
            CommitDocKind::WholeFile => "whole",
            CommitDocKind::DiffSummary => "commit",
        }
    }
}

pub fn repository_key(repo_name: &str, relative: &str) -> String {
    format!("{PREFIX}/{repo_name}/{}.out", relative.trim_start_matches('/'))
}

pub fn commit_key(kind: CommitDocKind, commit: &str, relative: &str) -> String {
    format!(
        "{PREFIX}/{}/{commit}/{}.out",
        kind.segment(),
        relative.trim_start_matches('/')
    )
}

/// Answers accumulated for one file within one attempt.
#[derive(Debug, Default, Clone)]
pub struct DocBuffer {
    text: String,
    answers: usize,
}

impl DocBuffer {
    pub fn push(&mut self, answer: &Answer) {
        self.text.push_str(&answer.render());
        self.answers += 1;
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.answers == 0
    }

    pub fn len(&self) -> usize {
        self.answers
    }
}

#[derive(Clone)]
pub struct DocumentationWriter {
    blobs: Arc<dyn BlobStore>,
    bucket: String,
}

impl DocumentationWriter {
    pub fn new(blobs: Arc<dyn BlobStore>, bucket: impl Into<String>) -> Self {
        Self {
            blobs,
            bucket: bucket.into(),
        }
    }

    pub async fn write(&self, key: &str, body: &str) -> Result<(), ServiceError> {
        debug!(bucket = %self.bucket, key, bytes = body.len(), "Writing documentation");
        self.blobs
            .put_object(&self.bucket, key, body.as_bytes().to_vec())
            .await
    }
}

/// [`BlobStore`] over a local directory: objects land in `<root>/<bucket>/<key>`.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(key)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), ServiceError> {
        if key.split('/').any(|segment| segment == "..") {
            return Err(ServiceError::Rejected {
                service: "blob store".into(),
                status: 400,
                message: format!("key {key} escapes the bucket"),
            });
        }
        let path = self.object_path(bucket, key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ServiceError::unavailable("blob store", e))?;
        }
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| ServiceError::unavailable("blob store", e))?;
        info!(path = %path.display(), "Stored object");
        Ok(())
    }
}
