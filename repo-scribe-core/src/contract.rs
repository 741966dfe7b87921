//! # contract: seams to every external collaborator
//!
//! The pipelines never talk to a network service directly. Each collaborator is a
//! trait defined here and implemented by the CLI crate's HTTP clients, by the
//! filesystem helpers in this crate, or by `mockall` mocks in tests.
//!
//! ## Mocking & Testing
//! - Every trait is annotated for `mockall`; the generated `Mock*` types are
//!   exported with the `test-export-mocks` feature so dependent crates can use them.
//!
//! ## Error Handling
//! - All service calls return [`ServiceError`]. Whether an error is retried is
//!   decided by the calling pipeline, never by the implementor.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use serde::Serialize;

use crate::error::{MaterializeError, ServiceError};
use crate::repository::RepositoryRef;

/// Content attached to a chat request so the answer is grounded in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Identifier shown to the service, usually the repository-relative path.
    pub name: String,
    pub data: Vec<u8>,
}

/// A single searchable record in the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentRecord {
    /// Deterministic id, see [`crate::identity`].
    pub id: String,
    pub title: String,
    pub content: String,
    /// Filterable attributes (`url`, and `commit_sha` for commit-scoped records).
    pub attributes: BTreeMap<String, String>,
}

/// How a file changed in a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeStatus {
    Added,
    Modified,
    Removed,
    Renamed,
    Other,
}

impl From<&str> for ChangeStatus {
    fn from(s: &str) -> Self {
        match s {
            "added" => ChangeStatus::Added,
            "modified" | "changed" => ChangeStatus::Modified,
            "removed" | "deleted" => ChangeStatus::Removed,
            "renamed" => ChangeStatus::Renamed,
            _ => ChangeStatus::Other,
        }
    }
}

/// A file touched by a commit, with its unified diff when the host provides one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedFile {
    pub filename: String,
    pub status: ChangeStatus,
    /// Absent for binary files and for diffs too large for the host to render.
    pub patch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPullRequest {
    pub title: String,
    pub head: String,
    pub base: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequest {
    pub number: u64,
    pub url: String,
}

/// Attachment-grounded chat / question answering.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Ask `prompt` about `attachment`, returning the service's answer verbatim.
    async fn chat_with_attachment(
        &self,
        prompt: &str,
        attachment: Attachment,
    ) -> Result<String, ServiceError>;
}

/// Searchable document index. `put_document` must overwrite an existing record
/// with the same id.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn put_document(&self, document: DocumentRecord) -> Result<(), ServiceError>;
}

/// Object storage for rendered documentation.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), ServiceError>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, name: &str) -> Result<String, ServiceError>;
}

/// Configuration parameters, e.g. prompt sets stored as JSON.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ParameterStore: Send + Sync {
    async fn get_parameter(&self, name: &str) -> Result<String, ServiceError>;
}

/// The slice of a code-hosting API the commit pipeline needs. `slug` is the
/// `owner/name` pair of the repository.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait HostingApi: Send + Sync {
    async fn commit_files(&self, slug: &str, commit: &str) -> Result<Vec<ChangedFile>, ServiceError>;

    async fn file_content(&self, slug: &str, path: &str, commit: &str) -> Result<String, ServiceError>;

    async fn create_pull_request(
        &self,
        slug: &str,
        request: NewPullRequest,
    ) -> Result<PullRequest, ServiceError>;
}

/// Result of a materialization: a plain tree without version-control metadata.
#[derive(Debug, Clone)]
pub struct MaterializedTree {
    pub root: PathBuf,
    pub files_copied: usize,
}

/// Produces a local working tree for a repository revision.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Materializer: Send + Sync {
    async fn materialize(
        &self,
        repository: &RepositoryRef,
        destination: &Path,
    ) -> Result<MaterializedTree, MaterializeError>;
}

/// The services a pipeline run talks to, built once and shared by every worker.
#[derive(Clone)]
pub struct Services {
    pub chat: Arc<dyn ChatService>,
    pub documents: Arc<dyn DocumentStore>,
    pub blobs: Arc<dyn BlobStore>,
}
