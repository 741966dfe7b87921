use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info};

use crate::materialize::HostKeyChecking;
use crate::prompts::{default_diff_prompts, default_prompts, PromptSpec};
use crate::qa::DEFAULT_NO_INFORMATION;
use crate::repository::RepositoryRef;

/// Per-file retry budget for the whole-repository pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait between a failed attempt and the next one.
    pub cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            cooldown: Duration::from_secs(15),
        }
    }
}

/// Everything a pipeline run needs to know, constructed once and passed by
/// reference to every component.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub repository: RepositoryRef,
    /// Blob storage bucket for rendered documentation.
    pub bucket: String,
    /// Whole-file documentation prompts.
    pub prompts: Vec<PromptSpec>,
    /// Diff-summary prompts of the commit pipeline.
    pub diff_prompts: Vec<PromptSpec>,
    /// The QA service's literal "no relevant information" reply.
    pub sentinel: String,
    pub retry: RetryPolicy,
    /// Files documented at once by the whole-repository pipeline.
    pub concurrency: usize,
    /// Parent of run-unique materialization directories.
    pub work_dir: PathBuf,
    /// Fixed materialization root. When unset, every run gets its own
    /// directory under `work_dir`, removed after the run.
    pub destination: Option<PathBuf>,
    pub host_key_checking: HostKeyChecking,
    /// Base branch of summary pull requests.
    pub pr_base_branch: String,
}

impl PipelineConfig {
    pub fn new(repository: RepositoryRef, bucket: impl Into<String>) -> Self {
        Self {
            repository,
            bucket: bucket.into(),
            prompts: default_prompts(),
            diff_prompts: default_diff_prompts(),
            sentinel: DEFAULT_NO_INFORMATION.to_string(),
            retry: RetryPolicy::default(),
            concurrency: 4,
            work_dir: std::env::temp_dir(),
            destination: None,
            host_key_checking: HostKeyChecking::Strict,
            pr_base_branch: "main".to_string(),
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            repo_url = %self.repository.url,
            reference = self.repository.reference.as_deref().unwrap_or("<default>"),
            commit = self.repository.commit.as_deref().unwrap_or("<head>"),
            bucket = %self.bucket,
            prompts = self.prompts.len(),
            diff_prompts = self.diff_prompts.len(),
            max_attempts = self.retry.max_attempts,
            cooldown_secs = self.retry.cooldown.as_secs_f64(),
            concurrency = self.concurrency,
            "Loaded pipeline config"
        );
        debug!(?self, "Pipeline config loaded (full debug)");
    }
}
