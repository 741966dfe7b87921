#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use repo_scribe_core::config::{PipelineConfig, RetryPolicy};
use repo_scribe_core::contract::{BlobStore, ChatService, DocumentRecord, DocumentStore, Services};
use repo_scribe_core::error::ServiceError;
use repo_scribe_core::prompts::PromptSpec;
use repo_scribe_core::repository::RepositoryRef;

pub const REPO_URL: &str = "https://host/org/repo.git";
pub const BUCKET: &str = "docs-bucket";

/// Document store keyed by id, overwriting on upsert like the real index.
#[derive(Default)]
pub struct MemoryDocumentStore {
    pub documents: Mutex<BTreeMap<String, DocumentRecord>>,
    pub writes: Mutex<usize>,
}

impl MemoryDocumentStore {
    pub fn get(&self, id: &str) -> Option<DocumentRecord> {
        self.documents.lock().unwrap().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.documents.lock().unwrap().len()
    }

    pub fn writes(&self) -> usize {
        *self.writes.lock().unwrap()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn put_document(&self, document: DocumentRecord) -> Result<(), ServiceError> {
        *self.writes.lock().unwrap() += 1;
        self.documents
            .lock()
            .unwrap()
            .insert(document.id.clone(), document);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryBlobStore {
    pub objects: Mutex<BTreeMap<(String, String), String>>,
}

impl MemoryBlobStore {
    pub fn get(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(&(BUCKET.to_string(), key.to_string()))
            .cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .map(|(_, key)| key.clone())
            .collect()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), ServiceError> {
        let body = String::from_utf8(body).map_err(|e| ServiceError::malformed("blob", e))?;
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }
}

pub fn config(prompts: Vec<PromptSpec>) -> PipelineConfig {
    let repository = RepositoryRef::https(REPO_URL)
        .at(Some("refs/heads/main".into()), Some("abc123".into()));
    let mut config = PipelineConfig::new(repository, BUCKET);
    config.prompts = prompts;
    config.retry = RetryPolicy::default();
    config
}

pub fn services(
    chat: impl ChatService + 'static,
    documents: Arc<MemoryDocumentStore>,
    blobs: Arc<MemoryBlobStore>,
) -> Services {
    Services {
        chat: Arc::new(chat),
        documents,
        blobs,
    }
}

pub fn write_file(root: &Path, relative: &str, content: &[u8]) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}
