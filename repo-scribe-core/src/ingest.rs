//! Whole-repository pipeline: materialize → walk → document → index → persist.
//!
//! Every file that survives the [`crate::filter`] runs through a small state
//! machine with a bounded attempt budget:
//!
//! 1. Each attempt asks every configured prompt about the file. Only once all of
//!    them have answered are the real answers upserted, followed by the raw
//!    source under the `code` category and the blob with the rendered answers.
//! 2. Any failure ends the attempt. A chat failure leaves no records behind;
//!    the worker waits for the cool-down and starts over with a fresh buffer.
//! 3. After `max_attempts` failures the file is recorded as failed and nothing
//!    is written to blob storage for it.
//!
//! Files are processed by a bounded pool of tokio tasks. Per-file failures never
//! fail the run; the [`IngestReport`] partitions every discovered file into
//! processed and failed. Only materialization errors and cancellation abort.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::{PipelineConfig, RetryPolicy};
use crate::contract::{Materializer, Services};
use crate::docs::{repository_key, DocBuffer, DocumentationWriter};
use crate::error::{FileError, IngestError, MaterializeError};
use crate::filter;
use crate::indexer::Indexer;
use crate::prompts::PromptSpec;
use crate::qa::AttachmentQa;
use crate::repository::cleaned_path;

/// A file found by the walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub path: PathBuf,
    /// Path below the repository root, `/`-separated.
    pub relative: String,
}

impl FileEntry {
    pub fn new(root: &Path, path: &Path) -> Option<Self> {
        let relative = path.strip_prefix(root).ok()?;
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        Some(Self {
            path: path.to_path_buf(),
            relative,
        })
    }
}

/// Terminal state of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum FileState {
    Processed { attempts: u32 },
    Failed { attempts: u32, last_error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOutcome {
    pub relative: String,
    #[serde(flatten)]
    pub state: FileState,
}

impl FileOutcome {
    pub fn attempts(&self) -> u32 {
        match self.state {
            FileState::Processed { attempts } | FileState::Failed { attempts, .. } => attempts,
        }
    }

    pub fn is_processed(&self) -> bool {
        matches!(self.state, FileState::Processed { .. })
    }
}

/// Partition of all discovered files into processed and failed.
#[derive(Debug, Default, Clone, Serialize)]
pub struct IngestReport {
    pub processed: Vec<FileOutcome>,
    pub failed: Vec<FileOutcome>,
}

impl IngestReport {
    fn record(&mut self, outcome: FileOutcome) {
        if outcome.is_processed() {
            self.processed.push(outcome);
        } else {
            self.failed.push(outcome);
        }
    }

    fn sort(&mut self) {
        self.processed.sort_by(|a, b| a.relative.cmp(&b.relative));
        self.failed.sort_by(|a, b| a.relative.cmp(&b.relative));
    }

    pub fn total(&self) -> usize {
        self.processed.len() + self.failed.len()
    }

    pub fn processed_paths(&self) -> Vec<&str> {
        self.processed.iter().map(|o| o.relative.as_str()).collect()
    }

    pub fn failed_paths(&self) -> Vec<&str> {
        self.failed.iter().map(|o| o.relative.as_str()).collect()
    }
}

/// Walk `root` in filesystem order, pruning excluded directories before
/// descending and dropping excluded files.
pub fn discover_files(root: &Path) -> Result<Vec<FileEntry>, IngestError> {
    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        entry.depth() == 0
            || !entry.file_type().is_dir()
            || !filter::is_excluded_component(&entry.file_name().to_string_lossy())
    });

    let mut entries = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| IngestError::Walk {
            path: e.path().unwrap_or(root).to_path_buf(),
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(file) = FileEntry::new(root, entry.path()) else {
            continue;
        };
        if filter::is_excluded_file(Path::new(&file.relative)) {
            debug!(path = %file.relative, "Skipping filtered file");
            continue;
        }
        entries.push(file);
    }
    info!(root = %root.display(), files = entries.len(), "Discovered files");
    Ok(entries)
}

struct EngineShared {
    qa: AttachmentQa,
    indexer: Indexer,
    writer: DocumentationWriter,
    prompts: Vec<PromptSpec>,
    retry: RetryPolicy,
    concurrency: usize,
    repo_url: String,
    repo_name: String,
}

#[derive(Clone)]
pub struct IngestionEngine {
    shared: Arc<EngineShared>,
}

impl IngestionEngine {
    pub fn new(config: &PipelineConfig, services: &Services) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                qa: AttachmentQa::new(services.chat.clone(), config.sentinel.clone()),
                indexer: Indexer::new(services.documents.clone()),
                writer: DocumentationWriter::new(services.blobs.clone(), config.bucket.clone()),
                prompts: config.prompts.clone(),
                retry: config.retry,
                concurrency: config.concurrency.max(1),
                repo_url: config.repository.url.clone(),
                repo_name: config.repository.name(),
            }),
        }
    }

    /// Document every entry, at most `concurrency` files at a time.
    pub async fn run(
        &self,
        entries: Vec<FileEntry>,
        cancel: &CancellationToken,
    ) -> Result<IngestReport, IngestError> {
        info!(
            files = entries.len(),
            workers = self.shared.concurrency,
            "Starting ingestion"
        );
        let permits = Arc::new(Semaphore::new(self.shared.concurrency));
        let mut tasks: JoinSet<Result<FileOutcome, IngestError>> = JoinSet::new();
        let mut report = IngestReport::default();

        for entry in entries {
            let permit = tokio::select! {
                permit = permits.clone().acquire_owned() => {
                    permit.map_err(|e| IngestError::Worker(e.to_string()))?
                }
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    return Err(IngestError::Cancelled);
                }
            };
            let engine = self.clone();
            let worker_cancel = cancel.clone();
            tasks.spawn(async move {
                let _permit = permit;
                engine.process_file(&entry, &worker_cancel).await
            });
            // Reap finished workers while queueing so errors surface early.
            while let Some(joined) = tasks.try_join_next() {
                Self::collect(joined, &mut report, cancel, &mut tasks)?;
            }
        }
        while let Some(joined) = tasks.join_next().await {
            Self::collect(joined, &mut report, cancel, &mut tasks)?;
        }

        report.sort();
        info!(
            processed = report.processed.len(),
            failed = report.failed.len(),
            "Ingestion finished"
        );
        if !report.failed.is_empty() {
            warn!(failed = ?report.failed_paths(), "Some files could not be documented");
        }
        Ok(report)
    }

    fn collect(
        joined: Result<Result<FileOutcome, IngestError>, tokio::task::JoinError>,
        report: &mut IngestReport,
        cancel: &CancellationToken,
        tasks: &mut JoinSet<Result<FileOutcome, IngestError>>,
    ) -> Result<(), IngestError> {
        let failure = match joined {
            Ok(Ok(outcome)) => {
                report.record(outcome);
                return Ok(());
            }
            Ok(Err(e)) => e,
            Err(e) => IngestError::Worker(e.to_string()),
        };
        cancel.cancel();
        tasks.abort_all();
        Err(failure)
    }

    /// Drive one file to a terminal state.
    pub async fn process_file(
        &self,
        entry: &FileEntry,
        cancel: &CancellationToken,
    ) -> Result<FileOutcome, IngestError> {
        let max_attempts = self.shared.retry.max_attempts.max(1);
        let mut attempts = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(IngestError::Cancelled);
            }
            attempts += 1;
            info!(path = %entry.relative, attempt = attempts, "Processing file");
            let error = match self.attempt(entry).await {
                Ok(answers) => {
                    info!(path = %entry.relative, attempts, answers, "Processed file");
                    return Ok(FileOutcome {
                        relative: entry.relative.clone(),
                        state: FileState::Processed { attempts },
                    });
                }
                Err(e) => e,
            };
            if attempts >= max_attempts {
                error!(path = %entry.relative, attempts, error = %error, "Skipping file");
                return Ok(FileOutcome {
                    relative: entry.relative.clone(),
                    state: FileState::Failed {
                        attempts,
                        last_error: error.to_string(),
                    },
                });
            }
            warn!(
                path = %entry.relative,
                attempt = attempts,
                error = %error,
                cooldown_secs = self.shared.retry.cooldown.as_secs_f64(),
                "Attempt failed, retrying after cool-down"
            );
            tokio::select! {
                _ = tokio::time::sleep(self.shared.retry.cooldown) => {}
                _ = cancel.cancelled() => return Err(IngestError::Cancelled),
            }
        }
    }

    /// One all-or-nothing attempt. Returns the number of answers written.
    async fn attempt(&self, entry: &FileEntry) -> Result<usize, FileError> {
        let shared = &self.shared;
        let content = tokio::fs::read(&entry.path)
            .await
            .map_err(|source| FileError::Read {
                path: entry.path.clone(),
                source,
            })?;
        let source = std::str::from_utf8(&content).map_err(|_| FileError::NotText {
            relative: entry.relative.clone(),
        })?;
        let cleaned = cleaned_path(&shared.repo_url, &entry.relative);

        // Nothing is indexed until every prompt has answered.
        let answers = shared
            .qa
            .ask_all(&shared.prompts, &entry.relative, &content)
            .await?;
        debug!(
            path = %entry.relative,
            answers = answers.len(),
            skipped = shared.prompts.len() - answers.len(),
            "Prompts answered"
        );

        let mut buffer = DocBuffer::default();
        for answer in &answers {
            shared.indexer.index_answer(&cleaned, answer, None).await?;
            buffer.push(answer);
        }

        shared.indexer.index_source(&cleaned, source).await?;
        shared
            .writer
            .write(&repository_key(&shared.repo_name, &entry.relative), buffer.as_str())
            .await?;
        Ok(buffer.len())
    }
}

/// Where a run materializes the repository.
enum Staging {
    Fixed(PathBuf),
    Run(TempDir),
}

impl Staging {
    async fn for_run(config: &PipelineConfig) -> Result<Self, MaterializeError> {
        if let Some(destination) = &config.destination {
            return Ok(Staging::Fixed(destination.clone()));
        }
        let work_dir = config.work_dir.clone();
        let io = |source: std::io::Error| MaterializeError::Io {
            path: config.work_dir.clone(),
            source,
        };
        tokio::fs::create_dir_all(&work_dir).await.map_err(io)?;
        let prefix = format!(
            "{}-{}-",
            config.repository.name(),
            chrono::Utc::now().format("%Y%m%d%H%M%S")
        );
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(&prefix)
                .tempdir_in(&work_dir)
        })
        .await
        .map_err(|e| io(std::io::Error::other(e)))?
        .map_err(io)?;
        Ok(Staging::Run(dir))
    }

    fn path(&self) -> &Path {
        match self {
            Staging::Fixed(path) => path,
            Staging::Run(dir) => dir.path(),
        }
    }
}

/// Run the whole pipeline for `config.repository`.
///
/// A materialization failure cancels `cancel` (so any sibling work sharing the
/// token stops) and aborts the run. The run-unique staging directory is removed
/// when the run ends.
pub async fn run_repository(
    config: &PipelineConfig,
    materializer: &dyn Materializer,
    services: &Services,
    cancel: &CancellationToken,
) -> Result<IngestReport, IngestError> {
    let staging = Staging::for_run(config).await?;
    info!(
        repo_url = %config.repository.url,
        staging = %staging.path().display(),
        "Materializing repository"
    );
    let tree = match materializer
        .materialize(&config.repository, staging.path())
        .await
    {
        Ok(tree) => tree,
        Err(e) => {
            error!(error = %e, "Materialization failed");
            cancel.cancel();
            return Err(e.into());
        }
    };

    let entries = discover_files(&tree.root)?;
    let engine = IngestionEngine::new(config, services);
    let report = engine.run(entries, cancel).await;

    if let Staging::Run(dir) = staging {
        let path = dir.path().to_path_buf();
        if let Err(e) = dir.close() {
            warn!(error = ?e, path = %path.display(), "Failed to remove staging directory");
        }
    }
    report
}
