///
/// This module implements the CLI interface for repo-scribe: command parsing,
/// wiring of service clients, and user-visible invocations.
///
/// All pipeline logic lives in the [`repo-scribe-core`] crate. This module is
/// strictly CLI glue: it reads settings, builds the [`Services`] bundle once and
/// hands it to a core pipeline.
///
/// ## Features
/// - [`Cli`] defines all user-facing options and subcommands.
/// - `ingest` documents a whole repository revision.
/// - `ingest-commit` documents a single commit and opens a pull request.
/// - `parse-push` validates a push payload and prints its normalized form.
/// - Ctrl-C cancels a running pipeline between attempts.
///
/// ## How To Use
/// - For command-line users: use the installed `repo-scribe` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`repo-scribe-core`]: ../../repo-scribe-core/
use crate::clients::{
    http_client, EnvSecretStore, FileParameterStore, HttpBlobStore, HttpChatClient,
    HttpDocumentStore,
};
use crate::github::GithubClient;
use crate::load_config::{load_config, JobConfig};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use repo_scribe_core::config::PipelineConfig;
use repo_scribe_core::contract::{BlobStore, ParameterStore, SecretStore, Services};
use repo_scribe_core::diff_ingest::{CommitTarget, DiffIngestionEngine};
use repo_scribe_core::docs::FsBlobStore;
use repo_scribe_core::ingest::run_repository;
use repo_scribe_core::materialize::GitMaterializer;
use repo_scribe_core::prompts::{load_prompts, PromptSpec};
use repo_scribe_core::push::{self, PushInput};
use repo_scribe_core::repository::branch_name;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// CLI for repo-scribe: generate, index and publish documentation for a repository.
#[derive(Parser)]
#[clap(
    name = "repo-scribe",
    version,
    about = "Document a repository or a single commit with an attachment-grounded QA service"
)]
pub struct Cli {
    /// Optional YAML file with non-secret settings; the environment overrides it
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Materialize a repository revision and document every file
    Ingest {
        /// Repository URL (overrides REPO_URL)
        #[clap(long)]
        repo_url: Option<String>,
        /// Ref to check out, e.g. refs/heads/main (overrides REPO_REF)
        #[clap(long = "ref")]
        reference: Option<String>,
        /// Commit to pin (overrides COMMIT_SHA)
        #[clap(long)]
        commit: Option<String>,
        /// Materialize into this directory instead of a run-unique one
        #[clap(long)]
        destination: Option<PathBuf>,
    },
    /// Document the files one commit changed and open a summary pull request
    IngestCommit {
        /// Push payload to take repository, ref, commit and committer from
        #[clap(long)]
        push_event: Option<PathBuf>,
        /// Account the pull request head belongs to
        #[clap(long)]
        committer: Option<String>,
    },
    /// Validate a push payload and print the normalized input as JSON
    ParsePush {
        #[clap(long)]
        payload: PathBuf,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_push(path: &Path) -> Result<PushInput> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read push payload {}", path.display()))?;
    push::parse(&raw).map_err(|e| anyhow!("Invalid push payload: {e}"))
}

/// A token cancelled on Ctrl-C.
fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling");
            on_signal.cancel();
        }
    });
    cancel
}

fn build_services(job: &JobConfig, http: &reqwest::Client) -> Result<Services> {
    let chat_endpoint = JobConfig::require(&job.chat_endpoint, "CHAT_ENDPOINT")?;
    let app_id = JobConfig::require(&job.app_id, "AMAZON_Q_APP_ID")?;
    let chat = HttpChatClient::new(
        http.clone(),
        chat_endpoint,
        app_id,
        JobConfig::require(&job.user_id, "AMAZON_Q_USER_ID")?,
    );
    let documents = HttpDocumentStore::new(
        http.clone(),
        job.index_endpoint.as_deref().unwrap_or(chat_endpoint),
        app_id,
        JobConfig::require(&job.index_id, "Q_APP_INDEX")?,
        JobConfig::require(&job.role_arn, "Q_APP_ROLE_ARN")?,
    );
    let blobs: Arc<dyn BlobStore> = match (&job.blob_dir, &job.blob_endpoint) {
        (Some(dir), _) => Arc::new(FsBlobStore::new(dir)),
        (None, Some(endpoint)) => Arc::new(HttpBlobStore::new(http.clone(), endpoint)),
        (None, None) => return Err(anyhow!("Missing required setting BLOB_ENDPOINT or BLOB_DIR")),
    };
    Ok(Services {
        chat: Arc::new(chat),
        documents: Arc::new(documents),
        blobs,
    })
}

async fn prompt_set(
    store: &dyn ParameterStore,
    parameter: Option<&str>,
    defaults: Vec<PromptSpec>,
) -> Result<Vec<PromptSpec>> {
    match parameter {
        Some(name) => load_prompts(store, name)
            .await
            .with_context(|| format!("Failed to load prompts from {name}")),
        None => Ok(defaults),
    }
}

async fn with_prompts(job: &JobConfig, mut config: PipelineConfig) -> Result<PipelineConfig> {
    let parameters = FileParameterStore::new(job.parameter_dir.clone());
    config.prompts = prompt_set(&parameters, job.prompt_config_param.as_deref(), config.prompts).await?;
    config.diff_prompts = prompt_set(
        &parameters,
        job.diff_prompt_config_param.as_deref(),
        config.diff_prompts,
    )
    .await?;
    Ok(config)
}

async fn ingest(
    mut job: JobConfig,
    repo_url: Option<String>,
    reference: Option<String>,
    commit: Option<String>,
    destination: Option<PathBuf>,
) -> Result<()> {
    job.repo_url = repo_url.or(job.repo_url);
    job.repo_ref = reference.or(job.repo_ref);
    job.commit_sha = commit.or(job.commit_sha);

    let mut config = job.pipeline_config(job.repository()?)?;
    config.destination = destination;
    let config = with_prompts(&job, config).await?;
    config.trace_loaded();

    let http = http_client(job.request_timeout())?;
    let services = build_services(&job, &http)?;
    let materializer = GitMaterializer::new(config.host_key_checking)
        .with_secrets(Arc::new(EnvSecretStore));

    tracing::info!(command = "ingest", "Starting repository ingestion");
    let report = run_repository(&config, &materializer, &services, &interrupt_token())
        .await
        .context("Repository ingestion failed")?;
    tracing::info!(
        command = "ingest",
        processed = report.processed.len(),
        failed = report.failed.len(),
        "Ingestion complete"
    );
    print_json(&report)
}

async fn ingest_commit(
    mut job: JobConfig,
    push_event: Option<PathBuf>,
    committer: Option<String>,
) -> Result<()> {
    let mut committer = committer;
    if let Some(path) = push_event {
        let push = read_push(&path)?;
        job.repo_url = Some(push.repo_url);
        job.repo_ref = Some(push.reference);
        job.commit_sha = Some(push.commit_sha);
        committer = committer.or(push.committer);
    }
    let commit = JobConfig::require(&job.commit_sha, "COMMIT_SHA")?.to_string();
    let committer = committer.ok_or_else(|| anyhow!("Missing committer: pass --committer or --push-event"))?;
    let branch = branch_name(JobConfig::require(&job.repo_ref, "REPO_REF")?).to_string();
    let repository = job.repository()?;
    let target = CommitTarget::from_url(&repository.url, commit, committer, branch)?;

    let config = with_prompts(&job, job.pipeline_config(repository)?).await?;
    config.trace_loaded();

    let http = http_client(job.request_timeout())?;
    let services = build_services(&job, &http)?;
    let token = match &job.github_token_secret {
        Some(name) => Some(
            EnvSecretStore
                .get_secret(name)
                .await
                .with_context(|| format!("Failed to read token secret {name}"))?,
        ),
        None => None,
    };
    let hosting = Arc::new(GithubClient::new(http, job.github_api_url(), token));

    tracing::info!(command = "ingest-commit", commit = %target.commit, "Starting commit ingestion");
    let report = DiffIngestionEngine::new(&config, &services, hosting)
        .run(&target)
        .await
        .context("Commit ingestion failed")?;
    print_json(&report)
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::ParsePush { payload } => {
            let input = read_push(&payload)?;
            tracing::info!(command = "parse-push", repo_url = %input.repo_url, "Push payload accepted");
            print_json(&input)
        }
        Commands::Ingest {
            repo_url,
            reference,
            commit,
            destination,
        } => {
            let job = load_config(cli.config.as_deref())?;
            ingest(job, repo_url, reference, commit, destination).await
        }
        Commands::IngestCommit {
            push_event,
            committer,
        } => {
            let job = load_config(cli.config.as_deref())?;
            ingest_commit(job, push_event, committer).await
        }
    }
}
