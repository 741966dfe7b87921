//! Commit-scoped pipeline: document the files a commit touched, summarize each
//! diff and open one pull request carrying the summaries.
//!
//! Unlike [`crate::ingest`] there is no retry loop. The first error aborts the
//! whole commit and no pull request is opened; re-running the job is the
//! scheduler's business. Files are processed in the hosting API's order so the
//! pull request body follows it.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::contract::{ChangeStatus, ChangedFile, HostingApi, NewPullRequest, PullRequest, Services};
use crate::docs::{commit_key, CommitDocKind, DocBuffer, DocumentationWriter};
use crate::error::DiffError;
use crate::filter;
use crate::indexer::Indexer;
use crate::prompts::PromptSpec;
use crate::qa::{Answer, AttachmentQa, QaAnswer};
use crate::repository::{cleaned_path, hosting_slug};

/// The commit a run documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitTarget {
    /// `owner/name` on the hosting service.
    pub slug: String,
    pub commit: String,
    /// Account the pull request head belongs to.
    pub committer: String,
    pub branch: String,
}

impl CommitTarget {
    /// Derive the target from a repository URL, failing when the URL does not
    /// name an `owner/name` pair.
    pub fn from_url(
        url: &str,
        commit: impl Into<String>,
        committer: impl Into<String>,
        branch: impl Into<String>,
    ) -> Result<Self, DiffError> {
        let slug = hosting_slug(url).ok_or_else(|| DiffError::UnknownRepository(url.to_string()))?;
        Ok(Self {
            slug,
            commit: commit.into(),
            committer: committer.into(),
            branch: branch.into(),
        })
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct CommitReport {
    /// Files the commit touched, as reported by the hosting API.
    pub changed: usize,
    pub documented: Vec<String>,
    pub filtered: Vec<String>,
    /// Pull request body assembled from the per-file summaries.
    pub body: String,
    pub pull_request: Option<PullRequest>,
}

/// `<committer>:<branch>@{<sha>}`
pub fn pull_request_head(target: &CommitTarget) -> String {
    format!("{}:{}@{{{}}}", target.committer, target.branch, target.commit)
}

pub fn pull_request_title(commit: &str) -> String {
    format!("PR request for {commit}")
}

fn summary_section(filename: &str, summary: &str) -> String {
    format!("## {filename}\n{summary}\n")
}

pub struct DiffIngestionEngine {
    qa: AttachmentQa,
    indexer: Indexer,
    writer: DocumentationWriter,
    hosting: Arc<dyn HostingApi>,
    prompts: Vec<PromptSpec>,
    diff_prompts: Vec<PromptSpec>,
    repo_url: String,
    base_branch: String,
}

impl DiffIngestionEngine {
    pub fn new(config: &PipelineConfig, services: &Services, hosting: Arc<dyn HostingApi>) -> Self {
        Self {
            qa: AttachmentQa::new(services.chat.clone(), config.sentinel.clone()),
            indexer: Indexer::new(services.documents.clone()),
            writer: DocumentationWriter::new(services.blobs.clone(), config.bucket.clone()),
            hosting,
            prompts: config.prompts.clone(),
            diff_prompts: config.diff_prompts.clone(),
            repo_url: config.repository.url.clone(),
            base_branch: config.pr_base_branch.clone(),
        }
    }

    pub async fn run(&self, target: &CommitTarget) -> Result<CommitReport, DiffError> {
        info!(slug = %target.slug, commit = %target.commit, "Documenting commit");
        let files = self.hosting.commit_files(&target.slug, &target.commit).await?;
        let mut report = CommitReport {
            changed: files.len(),
            ..CommitReport::default()
        };

        for file in &files {
            if file.status == ChangeStatus::Removed {
                debug!(path = %file.filename, "Skipping removed file");
                continue;
            }
            if filter::is_excluded_file(Path::new(&file.filename)) {
                debug!(path = %file.filename, "Skipping filtered file");
                report.filtered.push(file.filename.clone());
                continue;
            }
            self.document_file(target, file).await?;
            if let Some(summary) = self.summarize(target, file).await? {
                report.body.push_str(&summary_section(&file.filename, &summary));
            }
            report.documented.push(file.filename.clone());
        }

        if report.documented.is_empty() {
            info!(commit = %target.commit, "No documentable files, not opening a pull request");
            return Ok(report);
        }

        let request = NewPullRequest {
            title: pull_request_title(&target.commit),
            head: pull_request_head(target),
            base: self.base_branch.clone(),
            body: report.body.clone(),
        };
        let pull_request = self.hosting.create_pull_request(&target.slug, request).await?;
        info!(number = pull_request.number, url = %pull_request.url, "Opened pull request");
        report.pull_request = Some(pull_request);
        Ok(report)
    }

    /// Whole-file documentation at the commit, indexed with the commit sha.
    async fn document_file(&self, target: &CommitTarget, file: &ChangedFile) -> Result<(), DiffError> {
        let content = self
            .hosting
            .file_content(&target.slug, &file.filename, &target.commit)
            .await?;
        let cleaned = cleaned_path(&self.repo_url, &file.filename);

        let mut buffer = DocBuffer::default();
        for spec in &self.prompts {
            if let QaAnswer::Text(text) =
                self.qa.ask(&spec.prompt, &file.filename, content.as_bytes()).await?
            {
                let answer = Answer::new(spec, text);
                self.indexer
                    .index_answer(&cleaned, &answer, Some(&target.commit))
                    .await?;
                buffer.push(&answer);
            }
        }
        self.writer
            .write(
                &commit_key(CommitDocKind::WholeFile, &target.commit, &file.filename),
                buffer.as_str(),
            )
            .await?;
        Ok(())
    }

    /// Summary of the patch alone. Not indexed. `None` when the host gave no
    /// patch or every summary prompt came back empty.
    async fn summarize(
        &self,
        target: &CommitTarget,
        file: &ChangedFile,
    ) -> Result<Option<String>, DiffError> {
        let Some(patch) = &file.patch else {
            debug!(path = %file.filename, "No patch available, skipping summary");
            return Ok(None);
        };
        let answers = self
            .qa
            .ask_all(&self.diff_prompts, &file.filename, patch.as_bytes())
            .await?;
        if answers.is_empty() {
            debug!(path = %file.filename, "No summary for patch");
            return Ok(None);
        }
        let summary = answers
            .iter()
            .map(|a| a.text.trim())
            .collect::<Vec<_>>()
            .join("\n\n");
        let mut buffer = DocBuffer::default();
        for answer in &answers {
            buffer.push(answer);
        }
        self.writer
            .write(
                &commit_key(CommitDocKind::DiffSummary, &target.commit, &file.filename),
                buffer.as_str(),
            )
            .await?;
        Ok(Some(summary))
    }
}
