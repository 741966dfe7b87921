//! GitHub REST implementation of [`HostingApi`].

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use repo_scribe_core::contract::{ChangeStatus, ChangedFile, HostingApi, NewPullRequest, PullRequest};
use repo_scribe_core::error::ServiceError;

use crate::clients::check_status;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const SERVICE: &str = "hosting api";

#[derive(Debug, Deserialize)]
struct CommitResponse {
    #[serde(default)]
    files: Vec<FileResponse>,
}

#[derive(Debug, Deserialize)]
struct FileResponse {
    filename: String,
    #[serde(default)]
    status: String,
    patch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    number: u64,
    html_url: String,
}

/// Changed files of a `GET /repos/{slug}/commits/{sha}` response.
pub fn parse_commit_files(body: &str) -> Result<Vec<ChangedFile>, ServiceError> {
    let commit: CommitResponse =
        serde_json::from_str(body).map_err(|e| ServiceError::malformed(SERVICE, e))?;
    Ok(commit
        .files
        .into_iter()
        .map(|f| ChangedFile {
            status: ChangeStatus::from(f.status.as_str()),
            filename: f.filename,
            patch: f.patch,
        })
        .collect())
}

pub fn parse_pull_request(body: &str) -> Result<PullRequest, ServiceError> {
    let pull: PullResponse =
        serde_json::from_str(body).map_err(|e| ServiceError::malformed(SERVICE, e))?;
    Ok(PullRequest {
        number: pull.number,
        url: pull.html_url,
    })
}

pub struct GithubClient {
    http: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(http: reqwest::Client, api_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn commit_url(&self, slug: &str, commit: &str) -> String {
        format!("{}/repos/{slug}/commits/{commit}", self.api_url)
    }

    pub fn contents_url(&self, slug: &str, path: &str, commit: &str) -> String {
        format!(
            "{}/repos/{slug}/contents/{}?ref={commit}",
            self.api_url,
            path.trim_start_matches('/')
        )
    }

    pub fn pulls_url(&self, slug: &str) -> String {
        format!("{}/repos/{slug}/pulls", self.api_url)
    }

    fn request(&self, builder: reqwest::RequestBuilder, accept: &str) -> reqwest::RequestBuilder {
        let builder = builder
            .header("Accept", accept)
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.token {
            Some(token) => builder.header("Authorization", format!("Bearer {token}")),
            None => builder,
        }
    }

    async fn send_text(&self, builder: reqwest::RequestBuilder, what: String) -> Result<String, ServiceError> {
        let response = builder
            .send()
            .await
            .map_err(|e| ServiceError::unavailable(SERVICE, e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(what));
        }
        check_status(SERVICE, response)
            .await?
            .text()
            .await
            .map_err(|e| ServiceError::malformed(SERVICE, e))
    }
}

#[async_trait]
impl HostingApi for GithubClient {
    async fn commit_files(&self, slug: &str, commit: &str) -> Result<Vec<ChangedFile>, ServiceError> {
        tracing::info!(slug, commit, "Fetching commit");
        let request = self.request(
            self.http.get(self.commit_url(slug, commit)),
            "application/vnd.github+json",
        );
        let body = self.send_text(request, format!("commit {slug}@{commit}")).await?;
        let files = parse_commit_files(&body)?;
        tracing::info!(slug, commit, files = files.len(), "Fetched changed files");
        Ok(files)
    }

    async fn file_content(&self, slug: &str, path: &str, commit: &str) -> Result<String, ServiceError> {
        tracing::debug!(slug, path, commit, "Fetching file content");
        let request = self.request(
            self.http.get(self.contents_url(slug, path, commit)),
            "application/vnd.github.raw+json",
        );
        self.send_text(request, format!("{slug}/{path}@{commit}")).await
    }

    async fn create_pull_request(
        &self,
        slug: &str,
        request: NewPullRequest,
    ) -> Result<PullRequest, ServiceError> {
        tracing::info!(slug, head = %request.head, base = %request.base, "Creating pull request");
        let builder = self
            .request(self.http.post(self.pulls_url(slug)), "application/vnd.github+json")
            .json(&json!({
                "title": request.title,
                "head": request.head,
                "base": request.base,
                "body": request.body,
            }));
        let body = self.send_text(builder, format!("repository {slug}")).await?;
        parse_pull_request(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_files_map_status_and_patch() {
        let files = parse_commit_files(
            r#"{"sha": "abc123", "files": [
                {"filename": "x.py", "status": "modified", "patch": "@@ -1 +1 @@"},
                {"filename": "y.png", "status": "added"},
                {"filename": "old.py", "status": "removed", "patch": "-x"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(files.len(), 3);
        assert_eq!(files[0].status, ChangeStatus::Modified);
        assert_eq!(files[0].patch.as_deref(), Some("@@ -1 +1 @@"));
        assert_eq!(files[1].patch, None);
        assert_eq!(files[2].status, ChangeStatus::Removed);
    }

    #[test]
    fn commit_without_files_is_empty() {
        assert!(parse_commit_files(r#"{"sha": "abc"}"#).unwrap().is_empty());
        assert!(matches!(
            parse_commit_files("<html>"),
            Err(ServiceError::Malformed { .. })
        ));
    }

    #[test]
    fn pull_request_response() {
        let pr = parse_pull_request(r#"{"number": 12, "html_url": "https://github.com/o/r/pull/12"}"#)
            .unwrap();
        assert_eq!(pr.number, 12);
        assert_eq!(pr.url, "https://github.com/o/r/pull/12");
    }

    #[test]
    fn urls() {
        let client = GithubClient::new(reqwest::Client::new(), "https://api.github.com/", None);
        assert_eq!(
            client.commit_url("org/repo", "abc"),
            "https://api.github.com/repos/org/repo/commits/abc"
        );
        assert_eq!(
            client.contents_url("org/repo", "src/a.py", "abc"),
            "https://api.github.com/repos/org/repo/contents/src/a.py?ref=abc"
        );
        assert_eq!(client.pulls_url("org/repo"), "https://api.github.com/repos/org/repo/pulls");
    }
}
