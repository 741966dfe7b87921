//! Materialize a repository revision as a plain file tree.
//!
//! [`GitMaterializer`] clones into a run-unique temporary directory, pins the
//! requested revision, copies every regular file (minus `.git`) into the
//! destination and removes the clone again, whatever the copy outcome.
//!
//! SSH clones fetch the private key from the [`SecretStore`], write it to an
//! owner-only temporary file and pass it through `GIT_SSH_COMMAND`. Whether the
//! host key is verified is an explicit [`HostKeyChecking`] decision of the caller.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use tempfile::{NamedTempFile, TempDir};
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::contract::{MaterializedTree, Materializer, SecretStore};
use crate::error::{ConfigError, MaterializeError, ServiceError};
use crate::repository::{branch_name, RepositoryRef, Transport};

/// Trust decision for SSH host keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostKeyChecking {
    /// Only hosts already in `known_hosts` are accepted.
    #[default]
    Strict,
    /// Any host key is accepted and nothing is recorded. Only acceptable in
    /// ephemeral, network-isolated job containers.
    Insecure,
}

impl FromStr for HostKeyChecking {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" | "yes" => Ok(HostKeyChecking::Strict),
            "insecure" | "no" | "off" => Ok(HostKeyChecking::Insecure),
            other => Err(ConfigError::Invalid {
                key: "ssh_host_key_checking".into(),
                message: format!("expected `strict` or `insecure`, got `{other}`"),
            }),
        }
    }
}

/// `GIT_SSH_COMMAND` for a private key file.
pub fn ssh_command(key_file: &Path, checking: HostKeyChecking) -> String {
    let mut command = format!("ssh -i '{}' -o IdentitiesOnly=yes", key_file.display());
    match checking {
        HostKeyChecking::Strict => command.push_str(" -o StrictHostKeyChecking=yes"),
        HostKeyChecking::Insecure => {
            command.push_str(" -o UserKnownHostsFile=/dev/null -o StrictHostKeyChecking=no")
        }
    }
    command
}

/// Strip credentials from a URL before it reaches a log line or an error.
pub fn redact_url(url: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"://[^@/]+@").expect("static regex"))
        .replace(url, "://***@")
        .into_owned()
}

/// Write key material to a private temporary file, newline-terminated as ssh expects.
pub fn write_private_key(key: &str) -> Result<NamedTempFile, MaterializeError> {
    let dir = std::env::temp_dir();
    let io = |source: std::io::Error| MaterializeError::Io {
        path: dir.clone(),
        source,
    };
    let mut file = tempfile::Builder::new()
        .prefix("repo-scribe-key-")
        .tempfile()
        .map_err(io)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(io)?;
    }
    file.write_all(key.trim().as_bytes()).map_err(io)?;
    file.write_all(b"\n").map_err(io)?;
    file.flush().map_err(io)?;
    Ok(file)
}

pub struct GitMaterializer {
    secrets: Option<Arc<dyn SecretStore>>,
    host_key_checking: HostKeyChecking,
}

impl GitMaterializer {
    pub fn new(host_key_checking: HostKeyChecking) -> Self {
        Self {
            secrets: None,
            host_key_checking,
        }
    }

    pub fn with_secrets(mut self, secrets: Arc<dyn SecretStore>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    async fn ssh_key_file(&self, key_secret: &str) -> Result<NamedTempFile, MaterializeError> {
        let secret_error = |source: ServiceError| MaterializeError::Secret {
            name: key_secret.to_string(),
            source,
        };
        let secrets = self
            .secrets
            .as_ref()
            .ok_or_else(|| secret_error(ServiceError::NotFound("secret store".into())))?;
        let key = secrets.get_secret(key_secret).await.map_err(secret_error)?;
        write_private_key(&key)
    }
}

fn git(ssh_command: Option<&str>) -> Command {
    let mut command = Command::new("git");
    command.env("GIT_TERMINAL_PROMPT", "0");
    if let Some(ssh) = ssh_command {
        command.env("GIT_SSH_COMMAND", ssh);
    }
    command
}

/// Run git, returning its trimmed stderr on failure.
async fn run_git(mut command: Command) -> Result<(), String> {
    let output = command
        .output()
        .await
        .map_err(|e| format!("failed to launch git: {e}"))?;
    if output.status.success() {
        Ok(())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
    }
}

/// Pin the clone in `dir` to the requested revision.
async fn checkout(dir: &Path, repository: &RepositoryRef) -> Result<(), MaterializeError> {
    let (reference, commit) = match (repository.reference.as_deref(), repository.commit.as_deref()) {
        (None, None) => return Ok(()),
        (reference, Some(commit)) => (reference, commit),
        (Some(reference), None) => {
            let mut cmd = git(None);
            cmd.arg("-C").arg(dir).args(["checkout", "--quiet", branch_name(reference)]);
            return run_git(cmd).await.map_err(|message| MaterializeError::Checkout {
                reference: reference.to_string(),
                commit: "HEAD".to_string(),
                message,
            });
        }
    };
    let checkout_error = |message: String| MaterializeError::Checkout {
        reference: reference.unwrap_or("<default>").to_string(),
        commit: commit.to_string(),
        message,
    };

    let mut cmd = git(None);
    cmd.arg("-C").arg(dir);
    match reference {
        Some(reference) if !reference.starts_with("refs/") || reference.starts_with("refs/heads/") => {
            let branch = branch_name(reference);
            let mut ancestry = git(None);
            ancestry
                .arg("-C")
                .arg(dir)
                .args(["merge-base", "--is-ancestor", commit])
                .arg(format!("origin/{branch}"));
            run_git(ancestry).await.map_err(|stderr| {
                checkout_error(if stderr.is_empty() {
                    format!("commit is not reachable from origin/{branch}")
                } else {
                    stderr
                })
            })?;
            cmd.args(["checkout", "--quiet", "-B", branch, commit]);
        }
        Some(reference) => {
            let mut ancestry = git(None);
            ancestry
                .arg("-C")
                .arg(dir)
                .args(["merge-base", "--is-ancestor", commit, reference]);
            run_git(ancestry).await.map_err(|stderr| {
                checkout_error(if stderr.is_empty() {
                    format!("commit is not reachable from {reference}")
                } else {
                    stderr
                })
            })?;
            cmd.args(["checkout", "--quiet", "--detach", commit]);
        }
        None => {
            cmd.args(["checkout", "--quiet", "--detach", commit]);
        }
    }
    run_git(cmd).await.map_err(checkout_error)
}

/// Copy every regular file below `source` (except the top-level `.git`) into
/// `destination`, replacing files that already exist there.
pub fn copy_tree(source: &Path, destination: &Path) -> Result<usize, MaterializeError> {
    fs::create_dir_all(destination).map_err(|source| MaterializeError::Io {
        path: destination.to_path_buf(),
        source,
    })?;
    let walker = WalkDir::new(source)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| !(entry.depth() == 1 && entry.file_name() == ".git"));

    let mut copied = 0;
    for entry in walker {
        let entry = entry.map_err(|e| MaterializeError::Io {
            path: e.path().unwrap_or(source).to_path_buf(),
            source: e.into(),
        })?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let target = destination.join(relative);
        let io = |source: std::io::Error| MaterializeError::Io {
            path: target.clone(),
            source,
        };
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(io)?;
            continue;
        }
        if !file_type.is_file() {
            debug!(path = %entry.path().display(), "Skipping non-regular file");
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io)?;
        }
        if target.exists() {
            fs::remove_file(&target).map_err(io)?;
        }
        fs::copy(entry.path(), &target).map_err(io)?;
        copied += 1;
    }
    Ok(copied)
}

fn clone_dir() -> Result<TempDir, MaterializeError> {
    let prefix = format!("repo-scribe-{}-", Utc::now().format("%Y-%m-%d-%H-%M-%S"));
    tempfile::Builder::new()
        .prefix(&prefix)
        .tempdir()
        .map_err(|source| MaterializeError::Io {
            path: std::env::temp_dir(),
            source,
        })
}

#[async_trait]
impl Materializer for GitMaterializer {
    async fn materialize(
        &self,
        repository: &RepositoryRef,
        destination: &Path,
    ) -> Result<MaterializedTree, MaterializeError> {
        let key_file = match &repository.transport {
            Transport::Ssh { key_secret, .. } => Some(self.ssh_key_file(key_secret).await?),
            Transport::Https => None,
        };
        let ssh = key_file
            .as_ref()
            .map(|file| ssh_command(file.path(), self.host_key_checking));
        if ssh.is_some() && self.host_key_checking == HostKeyChecking::Insecure {
            warn!("SSH host key verification is disabled for this clone");
        }

        let url = repository.clone_url();
        let clone = clone_dir()?;
        info!(
            repo_url = %redact_url(url),
            path = %clone.path().display(),
            "Cloning repository"
        );
        let mut cmd = git(ssh.as_deref());
        cmd.args(["clone", "--quiet", url]).arg(clone.path());
        run_git(cmd).await.map_err(|message| MaterializeError::Clone {
            url: redact_url(url),
            message,
        })?;

        checkout(clone.path(), repository).await?;
        info!(
            reference = repository.reference.as_deref().unwrap_or("<default>"),
            commit = repository.commit.as_deref().unwrap_or("<head>"),
            "Checked out revision"
        );

        let source = clone.path().to_path_buf();
        let target = destination.to_path_buf();
        let copied = tokio::task::spawn_blocking(move || copy_tree(&source, &target))
            .await
            .map_err(|e| MaterializeError::Io {
                path: destination.to_path_buf(),
                source: std::io::Error::other(e),
            })?;

        let clone_path = clone.path().to_path_buf();
        if let Err(e) = clone.close() {
            warn!(error = ?e, path = %clone_path.display(), "Failed to remove temporary clone");
        }
        let files_copied = copied?;
        info!(
            files = files_copied,
            destination = %destination.display(),
            "Materialized working tree"
        );
        Ok(MaterializedTree {
            root: destination.to_path_buf(),
            files_copied,
        })
    }
}
