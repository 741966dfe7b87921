#![doc = "HTTP and local implementations of the core service seams."]
//
//! # Service clients (CLI <-> Core)
//!
//! This module wires the traits in [`repo_scribe_core::contract`] to real
//! transports:
//!
//! - [`HttpChatClient`]: attachment-grounded chat (`POST .../conversations`).
//! - [`HttpDocumentStore`]: batch document upsert into a search index.
//! - [`HttpBlobStore`]: object `PUT` with a content digest header.
//! - [`EnvSecretStore`] / [`FileParameterStore`]: secrets and prompt sets from
//!   the environment or a directory of files.
//!
//! Every transport failure becomes a [`ServiceError`]; whether it is retried is
//! the calling pipeline's decision.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use repo_scribe_core::contract::{
    Attachment, BlobStore, ChatService, DocumentRecord, DocumentStore, ParameterStore, SecretStore,
};
use repo_scribe_core::error::ServiceError;

pub fn http_client(timeout: Duration) -> Result<reqwest::Client, ServiceError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("repo-scribe/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ServiceError::unavailable("http client", e))
}

fn endpoint_url(endpoint: &str, path: &str) -> String {
    format!("{}/{}", endpoint.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Turn a non-success response into [`ServiceError::Rejected`].
pub(crate) async fn check_status(
    service: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    tracing::warn!(service, status = status.as_u16(), %message, "Request rejected");
    Err(ServiceError::Rejected {
        service: service.to_string(),
        status: status.as_u16(),
        message,
    })
}

pub struct HttpChatClient {
    http: reqwest::Client,
    endpoint: String,
    app_id: String,
    user_id: String,
}

impl HttpChatClient {
    const SERVICE: &'static str = "chat service";

    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        app_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            app_id: app_id.into(),
            user_id: user_id.into(),
        }
    }

    pub fn conversation_url(&self) -> String {
        endpoint_url(
            &self.endpoint,
            &format!("applications/{}/conversations", self.app_id),
        )
    }

    pub fn request_body(&self, prompt: &str, attachment: &Attachment) -> Value {
        json!({
            "userId": self.user_id,
            "userMessage": prompt,
            "attachments": [{
                "name": attachment.name,
                "data": STANDARD.encode(&attachment.data),
            }],
        })
    }
}

/// Pull the answer text out of a conversation response.
pub fn system_message(response: &Value) -> Result<String, ServiceError> {
    response
        .get("systemMessage")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ServiceError::malformed(HttpChatClient::SERVICE, "missing systemMessage"))
}

#[async_trait]
impl ChatService for HttpChatClient {
    async fn chat_with_attachment(
        &self,
        prompt: &str,
        attachment: Attachment,
    ) -> Result<String, ServiceError> {
        tracing::debug!(
            attachment = %attachment.name,
            bytes = attachment.data.len(),
            "Sending chat request"
        );
        let response = self
            .http
            .post(self.conversation_url())
            .json(&self.request_body(prompt, &attachment))
            .send()
            .await
            .map_err(|e| ServiceError::unavailable(Self::SERVICE, e))?;
        let body: Value = check_status(Self::SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| ServiceError::malformed(Self::SERVICE, e))?;
        system_message(&body)
    }
}

pub struct HttpDocumentStore {
    http: reqwest::Client,
    endpoint: String,
    app_id: String,
    index_id: String,
    role_arn: String,
}

impl HttpDocumentStore {
    const SERVICE: &'static str = "document store";

    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        app_id: impl Into<String>,
        index_id: impl Into<String>,
        role_arn: impl Into<String>,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            app_id: app_id.into(),
            index_id: index_id.into(),
            role_arn: role_arn.into(),
        }
    }

    pub fn documents_url(&self) -> String {
        endpoint_url(
            &self.endpoint,
            &format!(
                "applications/{}/indices/{}/documents",
                self.app_id, self.index_id
            ),
        )
    }

    pub fn request_body(&self, document: &DocumentRecord) -> Value {
        let attributes: Vec<Value> = document
            .attributes
            .iter()
            .map(|(name, value)| json!({ "name": name, "value": { "stringValue": value } }))
            .collect();
        json!({
            "roleArn": self.role_arn,
            "documents": [{
                "id": document.id,
                "title": document.title,
                "content": { "blob": STANDARD.encode(document.content.as_bytes()) },
                "contentType": "PLAIN_TEXT",
                "attributes": attributes,
            }],
        })
    }
}

/// Batch upserts report per-document failures in the body of a successful response.
pub fn check_failed_documents(response: &Value) -> Result<(), ServiceError> {
    let Some(first) = response
        .get("failedDocuments")
        .and_then(Value::as_array)
        .and_then(|failed| failed.first())
    else {
        return Ok(());
    };
    let id = first.get("id").and_then(Value::as_str).unwrap_or("<unknown>");
    let reason = first
        .pointer("/error/errorMessage")
        .or_else(|| first.get("errorMessage"))
        .and_then(Value::as_str)
        .unwrap_or("no reason given");
    Err(ServiceError::Rejected {
        service: HttpDocumentStore::SERVICE.to_string(),
        status: 200,
        message: format!("document {id} failed: {reason}"),
    })
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn put_document(&self, document: DocumentRecord) -> Result<(), ServiceError> {
        let response = self
            .http
            .post(self.documents_url())
            .json(&self.request_body(&document))
            .send()
            .await
            .map_err(|e| ServiceError::unavailable(Self::SERVICE, e))?;
        let body: Value = check_status(Self::SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| ServiceError::malformed(Self::SERVICE, e))?;
        check_failed_documents(&body)?;
        tracing::debug!(id = %document.id, "Document indexed");
        Ok(())
    }
}

pub struct HttpBlobStore {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpBlobStore {
    const SERVICE: &'static str = "blob store";

    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    pub fn object_url(&self, bucket: &str, key: &str) -> String {
        endpoint_url(&self.endpoint, &format!("{bucket}/{}", key.trim_start_matches('/')))
    }
}

pub fn content_sha256(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    format!("{:x}", hasher.finalize())
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), ServiceError> {
        let url = self.object_url(bucket, key);
        tracing::info!(bucket, key, bytes = body.len(), "Uploading object");
        let response = self
            .http
            .put(&url)
            .header("x-content-sha256", content_sha256(&body))
            .header("content-type", "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| ServiceError::unavailable(Self::SERVICE, e))?;
        check_status(Self::SERVICE, response).await?;
        Ok(())
    }
}

/// Environment variable a parameter or secret name maps to:
/// `/repo-scribe/prompts` -> `REPO_SCRIBE_PROMPTS`.
pub fn env_key(name: &str) -> String {
    name.trim_start_matches('/')
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

/// Secrets from environment variables, looked up by exact name first.
#[derive(Debug, Default)]
pub struct EnvSecretStore;

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get_secret(&self, name: &str) -> Result<String, ServiceError> {
        env::var(name)
            .or_else(|_| env::var(env_key(name)))
            .map_err(|_| ServiceError::NotFound(format!("secret {name}")))
    }
}

/// Parameters stored as files under `dir`, falling back to the environment.
#[derive(Debug, Default)]
pub struct FileParameterStore {
    dir: Option<PathBuf>,
}

impl FileParameterStore {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl ParameterStore for FileParameterStore {
    async fn get_parameter(&self, name: &str) -> Result<String, ServiceError> {
        if let Some(dir) = &self.dir {
            let path = dir.join(name.trim_start_matches('/'));
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => return Ok(content),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(path = %path.display(), "Parameter file not found, trying environment");
                }
                Err(e) => return Err(ServiceError::unavailable("parameter store", e)),
            }
        }
        env::var(env_key(name)).map_err(|_| ServiceError::NotFound(format!("parameter {name}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn client() -> reqwest::Client {
        http_client(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn chat_request_carries_base64_attachment() {
        let chat = HttpChatClient::new(client(), "https://chat.example/", "app-1", "user-1");
        assert_eq!(
            chat.conversation_url(),
            "https://chat.example/applications/app-1/conversations"
        );
        let body = chat.request_body(
            "Explain",
            &Attachment {
                name: "a.py".into(),
                data: b"print(1)".to_vec(),
            },
        );
        assert_eq!(body["userId"], "user-1");
        assert_eq!(body["userMessage"], "Explain");
        assert_eq!(body["attachments"][0]["name"], "a.py");
        assert_eq!(body["attachments"][0]["data"], "cHJpbnQoMSk=");
    }

    #[test]
    fn chat_response_needs_a_system_message() {
        assert_eq!(
            system_message(&json!({"systemMessage": "It prints."})).unwrap(),
            "It prints."
        );
        assert!(matches!(
            system_message(&json!({"conversationId": "c"})),
            Err(ServiceError::Malformed { .. })
        ));
    }

    #[test]
    fn document_request_layout() {
        let store = HttpDocumentStore::new(client(), "https://index.example", "app", "idx", "arn:role");
        assert_eq!(
            store.documents_url(),
            "https://index.example/applications/app/indices/idx/documents"
        );
        let mut attributes = BTreeMap::new();
        attributes.insert("url".to_string(), "https://host/org/repo/a.py".to_string());
        let body = store.request_body(&DocumentRecord {
            id: "id-1".into(),
            title: "t".into(),
            content: "c".into(),
            attributes,
        });
        assert_eq!(body["roleArn"], "arn:role");
        assert_eq!(body["documents"][0]["id"], "id-1");
        assert_eq!(body["documents"][0]["content"]["blob"], "Yw==");
        assert_eq!(body["documents"][0]["attributes"][0]["name"], "url");
    }

    #[test]
    fn failed_documents_are_rejections() {
        assert!(check_failed_documents(&json!({"failedDocuments": []})).is_ok());
        assert!(check_failed_documents(&json!({})).is_ok());
        let err = check_failed_documents(&json!({
            "failedDocuments": [{"id": "id-1", "error": {"errorMessage": "too large"}}]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("document id-1 failed: too large"));
    }

    #[test]
    fn blob_urls_and_digest() {
        let blobs = HttpBlobStore::new(client(), "http://blobs:9000/");
        assert_eq!(
            blobs.object_url("bucket", "documentation/org-repo/a.py.out"),
            "http://blobs:9000/bucket/documentation/org-repo/a.py.out"
        );
        assert_eq!(
            content_sha256(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn names_map_to_env_keys() {
        assert_eq!(env_key("/repo-scribe/prompts"), "REPO_SCRIBE_PROMPTS");
        assert_eq!(env_key("deploy-key"), "DEPLOY_KEY");
    }

    #[tokio::test]
    async fn parameters_come_from_files_first() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("prompts")).unwrap();
        std::fs::write(dir.path().join("prompts/whole"), "[]").unwrap();
        let store = FileParameterStore::new(Some(dir.path().to_path_buf()));

        assert_eq!(store.get_parameter("/prompts/whole").await.unwrap(), "[]");
        assert!(matches!(
            store.get_parameter("/repo-scribe-test/definitely-unset").await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
