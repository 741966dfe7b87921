/// `load_config` module: builds the job settings from an optional YAML file
/// overlaid by environment variables.
///
/// The YAML file carries non-secret settings only. Anything set in the
/// environment (or a `.env` file loaded at startup) wins over the file, so a
/// scheduler can run the same file against different repositories.
///
/// # Errors
/// All errors use `anyhow::Error` with context and are surfaced at the CLI
/// boundary.
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

use repo_scribe_core::config::{PipelineConfig, RetryPolicy};
use repo_scribe_core::materialize::HostKeyChecking;
use repo_scribe_core::repository::RepositoryRef;

use crate::github::DEFAULT_API_URL;

/// Every setting a job can receive. YAML keys are the snake_case field names.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobConfig {
    pub repo_url: Option<String>,
    pub repo_ref: Option<String>,
    pub commit_sha: Option<String>,
    pub ssh_url: Option<String>,
    pub ssh_key_name: Option<String>,
    pub app_id: Option<String>,
    pub user_id: Option<String>,
    pub index_id: Option<String>,
    pub role_arn: Option<String>,
    pub bucket: Option<String>,
    pub prompt_config_param: Option<String>,
    pub diff_prompt_config_param: Option<String>,
    pub parameter_dir: Option<PathBuf>,
    pub chat_endpoint: Option<String>,
    pub index_endpoint: Option<String>,
    pub blob_endpoint: Option<String>,
    pub blob_dir: Option<PathBuf>,
    pub github_token_secret: Option<String>,
    pub github_api_url: Option<String>,
    pub pr_base_branch: Option<String>,
    pub max_attempts: Option<u32>,
    pub cooldown_secs: Option<u64>,
    pub concurrency: Option<usize>,
    pub ssh_host_key_checking: Option<String>,
    pub work_dir: Option<PathBuf>,
    pub request_timeout_secs: Option<u64>,
}

fn parsed<T>(key: &str, raw: String) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow!("Invalid value for {key}: {e}"))
}

impl JobConfig {
    /// Overlay environment-style settings; `lookup` returns the value of a variable.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let text = |key: &str, slot: &mut Option<String>| {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *slot = Some(value);
            }
        };
        text("REPO_URL", &mut self.repo_url);
        text("REPO_REF", &mut self.repo_ref);
        text("COMMIT_SHA", &mut self.commit_sha);
        text("SSH_URL", &mut self.ssh_url);
        text("SSH_KEY_NAME", &mut self.ssh_key_name);
        text("AMAZON_Q_APP_ID", &mut self.app_id);
        text("AMAZON_Q_USER_ID", &mut self.user_id);
        text("Q_APP_INDEX", &mut self.index_id);
        text("Q_APP_ROLE_ARN", &mut self.role_arn);
        text("S3_BUCKET", &mut self.bucket);
        text("PROMPT_CONFIG_PARAM", &mut self.prompt_config_param);
        text("DIFF_PROMPT_CONFIG_PARAM", &mut self.diff_prompt_config_param);
        text("CHAT_ENDPOINT", &mut self.chat_endpoint);
        text("INDEX_ENDPOINT", &mut self.index_endpoint);
        text("BLOB_ENDPOINT", &mut self.blob_endpoint);
        text("GITHUB_TOKEN_SECRET", &mut self.github_token_secret);
        text("GITHUB_API_URL", &mut self.github_api_url);
        text("PR_BASE_BRANCH", &mut self.pr_base_branch);
        text("SSH_HOST_KEY_CHECKING", &mut self.ssh_host_key_checking);

        let present = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(dir) = present("BLOB_DIR") {
            self.blob_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = present("PARAMETER_DIR") {
            self.parameter_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = present("WORK_DIR") {
            self.work_dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = present("MAX_ATTEMPTS") {
            self.max_attempts = Some(parsed("MAX_ATTEMPTS", raw)?);
        }
        if let Some(raw) = present("COOLDOWN_SECS") {
            self.cooldown_secs = Some(parsed("COOLDOWN_SECS", raw)?);
        }
        if let Some(raw) = present("CONCURRENCY") {
            self.concurrency = Some(parsed("CONCURRENCY", raw)?);
        }
        if let Some(raw) = present("REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = Some(parsed("REQUEST_TIMEOUT_SECS", raw)?);
        }
        Ok(())
    }

    pub fn require<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str> {
        value
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow!("Missing required setting {key}"))
    }

    /// The materialization target described by `REPO_URL`, `REPO_REF`,
    /// `COMMIT_SHA` and, when both are set, `SSH_URL` + `SSH_KEY_NAME`.
    pub fn repository(&self) -> Result<RepositoryRef> {
        let url = Self::require(&self.repo_url, "REPO_URL")?;
        let repository = RepositoryRef::https(url).at(self.repo_ref.clone(), self.commit_sha.clone());
        Ok(match (&self.ssh_url, &self.ssh_key_name) {
            (Some(ssh_url), Some(key)) => repository.over_ssh(ssh_url, key),
            _ => repository,
        })
    }

    pub fn host_key_checking(&self) -> Result<HostKeyChecking> {
        match &self.ssh_host_key_checking {
            Some(raw) => raw
                .parse::<HostKeyChecking>()
                .context("Invalid SSH_HOST_KEY_CHECKING"),
            None => Ok(HostKeyChecking::default()),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(60))
    }

    pub fn github_api_url(&self) -> &str {
        self.github_api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    /// Pipeline settings for `repository`. Prompt sets keep their defaults;
    /// the caller loads configured ones.
    pub fn pipeline_config(&self, repository: RepositoryRef) -> Result<PipelineConfig> {
        let bucket = Self::require(&self.bucket, "S3_BUCKET")?;
        let mut config = PipelineConfig::new(repository, bucket);
        let defaults = RetryPolicy::default();
        config.retry = RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts).max(1),
            cooldown: self
                .cooldown_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.cooldown),
        };
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency.max(1);
        }
        if let Some(work_dir) = &self.work_dir {
            config.work_dir = work_dir.clone();
        }
        config.host_key_checking = self.host_key_checking()?;
        if let Some(branch) = &self.pr_base_branch {
            config.pr_base_branch = branch.clone();
        }
        Ok(config)
    }
}

/// Read the optional YAML file at `path`.
pub fn load_config_file<P: AsRef<Path>>(path: P) -> Result<JobConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow!("Failed to read config file {:?}: {}", path_ref, e));
        }
    };

    match serde_yaml::from_str::<Option<JobConfig>>(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            Ok(conf.unwrap_or_default())
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            Err(anyhow!("Failed to parse config YAML: {e}"))
        }
    }
}

/// File settings (if any) overlaid by the process environment.
pub fn load_config(path: Option<&Path>) -> Result<JobConfig> {
    let mut config = match path {
        Some(path) => load_config_file(path)?,
        None => JobConfig::default(),
    };
    config.apply_env(|key| std::env::var(key).ok())?;
    Ok(config)
}
