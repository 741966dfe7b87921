//! Push payload normalization.
//!
//! Two payload shapes are understood:
//!
//! - webhook deliveries: `ref`, `after` (or `head_commit.id`),
//!   `repository.clone_url`, `repository.ssh_url`, `head_commit.committer`,
//!   `pusher.name`;
//! - events API entries: `type: "PushEvent"`, `repository.url`, `payload.head`,
//!   `payload.ref`, `actor.login`.
//!
//! Both become a [`PushInput`]. Validation is structural only.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::repository::RepositoryRef;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PushError {
    #[error("Not a push event")]
    NotPushEvent,
    #[error("Missing repository")]
    MissingRepository,
    #[error("Missing head")]
    MissingHead,
    #[error("Missing ref")]
    MissingRef,
    #[error("Malformed payload: {0}")]
    Malformed(String),
}

/// What the pipelines need to know about a push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushInput {
    pub repo_url: String,
    #[serde(rename = "ref")]
    pub reference: String,
    pub commit_sha: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_key_secret_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committer: Option<String>,
}

impl PushInput {
    /// The materialization target of this push. SSH is used when both an SSH URL
    /// and a key secret are known.
    pub fn repository_ref(&self) -> RepositoryRef {
        let repository = RepositoryRef::https(&self.repo_url)
            .at(Some(self.reference.clone()), Some(self.commit_sha.clone()));
        match (&self.ssh_url, &self.ssh_key_secret_name) {
            (Some(url), Some(secret)) => repository.over_ssh(url, secret),
            _ => repository,
        }
    }

    pub fn with_ssh_key(mut self, secret_name: impl Into<String>) -> Self {
        self.ssh_key_secret_name = Some(secret_name.into());
        self
    }
}

fn text<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn first_text(value: &Value, pointers: &[&str]) -> Option<String> {
    pointers
        .iter()
        .find_map(|p| text(value, p))
        .map(str::to_string)
}

pub fn normalize(event: &Value) -> Result<PushInput, PushError> {
    if !event.is_object() {
        return Err(PushError::Malformed("payload is not a JSON object".into()));
    }
    let kind = first_text(event, &["/eventType", "/type"]);
    if let Some(kind) = &kind {
        if !matches!(kind.as_str(), "PushEvent" | "push" | "Push") {
            return Err(PushError::NotPushEvent);
        }
    }

    let repository = event.get("repository").ok_or(PushError::MissingRepository)?;
    let repo_url = first_text(repository, &["/clone_url", "/cloneUrl", "/html_url", "/url"])
        .ok_or(PushError::MissingRepository)?;

    let commit_sha = first_text(
        event,
        &["/after", "/headCommit", "/head_commit/id", "/headCommit/id", "/payload/head"],
    )
    .ok_or(PushError::MissingHead)?;
    // Branch deletions report an all-zero `after`.
    if commit_sha.chars().all(|c| c == '0') {
        return Err(PushError::MissingHead);
    }

    let reference = first_text(event, &["/ref", "/payload/ref"]).ok_or(PushError::MissingRef)?;

    Ok(PushInput {
        repo_url,
        reference,
        commit_sha,
        ssh_url: first_text(repository, &["/ssh_url", "/sshUrl"]),
        ssh_key_secret_name: None,
        committer: first_text(
            event,
            &[
                "/head_commit/committer/username",
                "/head_commit/committer/name",
                "/pusher/name",
                "/actor/login",
                "/sender/login",
            ],
        ),
    })
}

pub fn parse(raw: &str) -> Result<PushInput, PushError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| PushError::Malformed(e.to_string()))?;
    normalize(&value)
}
