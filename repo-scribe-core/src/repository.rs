//! Repository identity: which repository, over which transport, at which revision,
//! and the names derived from its URL (blob prefix, hosting slug, document paths).

use std::sync::OnceLock;

use regex::Regex;

/// How the repository is cloned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// Anonymous or credential-in-URL HTTPS clone of [`RepositoryRef::url`].
    Https,
    /// SSH clone of `url`, authenticated with the private key stored under
    /// `key_secret` in the secret store.
    Ssh { url: String, key_secret: String },
}

/// Exactly one materialization target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRef {
    /// Canonical (HTTPS) URL; document paths and blob names derive from it.
    pub url: String,
    pub transport: Transport,
    /// Full ref name such as `refs/heads/main`, or a bare branch name.
    pub reference: Option<String>,
    pub commit: Option<String>,
}

impl RepositoryRef {
    pub fn https(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            transport: Transport::Https,
            reference: None,
            commit: None,
        }
    }

    pub fn at(mut self, reference: Option<String>, commit: Option<String>) -> Self {
        self.reference = reference;
        self.commit = commit;
        self
    }

    pub fn over_ssh(mut self, ssh_url: impl Into<String>, key_secret: impl Into<String>) -> Self {
        self.transport = Transport::Ssh {
            url: ssh_url.into(),
            key_secret: key_secret.into(),
        };
        self
    }

    /// The URL handed to `git clone`.
    pub fn clone_url(&self) -> &str {
        match &self.transport {
            Transport::Https => &self.url,
            Transport::Ssh { url, .. } => url,
        }
    }

    /// Branch name of the ref, with `refs/heads/` stripped.
    pub fn branch(&self) -> Option<&str> {
        self.reference.as_deref().map(branch_name)
    }

    /// Name used in blob keys, e.g. `org-repo`.
    pub fn name(&self) -> String {
        repo_name(&self.url)
    }
}

pub fn branch_name(reference: &str) -> &str {
    reference.strip_prefix("refs/heads/").unwrap_or(reference)
}

fn path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // scheme://[user@]host[:port]/path  or  user@host:path
        Regex::new(r"^(?:[A-Za-z][A-Za-z0-9+.-]*://(?:[^@/]+@)?[^/]+/|[^@/\s]+@[^:/\s]+:)(?P<path>.+)$")
            .expect("static regex")
    })
}

/// Path segments of the repository inside its host, without a trailing `.git`.
fn repo_segments(url: &str) -> Vec<&str> {
    let trimmed = url.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    let path = path_regex()
        .captures(trimmed)
        .and_then(|c| c.name("path"))
        .map(|m| m.as_str())
        .unwrap_or(trimmed);
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// `https://host/org/repo.git` -> `org-repo`.
pub fn repo_name(url: &str) -> String {
    repo_segments(url).join("-")
}

/// `https://host/org/repo.git` -> `org/repo`, the owner/name pair hosting APIs address.
pub fn hosting_slug(url: &str) -> Option<String> {
    let segments = repo_segments(url);
    if segments.len() < 2 {
        return None;
    }
    Some(segments.join("/"))
}

/// Repository URL joined with a repository-relative path, the stable public
/// name of a file in the document store: `https://host/org/repo/src/a.py`.
pub fn cleaned_path(url: &str, relative: &str) -> String {
    let base = url.trim().trim_end_matches('/');
    let base = base.strip_suffix(".git").unwrap_or(base);
    format!("{}/{}", base, relative.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_from_https_and_ssh_urls() {
        assert_eq!(repo_name("https://host/org/repo.git"), "org-repo");
        assert_eq!(repo_name("git@github.com:org/repo.git"), "org-repo");
        assert_eq!(repo_name("ssh://git@host:2222/org/repo"), "org-repo");
        assert_eq!(repo_name("https://gitlab.example/group/sub/repo/"), "group-sub-repo");
        assert_eq!(hosting_slug("https://github.com/org/repo.git").as_deref(), Some("org/repo"));
        assert_eq!(hosting_slug("https://github.com/lonely"), None);
    }

    #[test]
    fn cleaned_path_drops_git_suffix() {
        assert_eq!(
            cleaned_path("https://host/org/repo.git", "src/a.py"),
            "https://host/org/repo/src/a.py"
        );
        assert_eq!(cleaned_path("https://host/org/repo/", "/a.py"), "https://host/org/repo/a.py");
    }

    #[test]
    fn clone_url_follows_transport() {
        let repo = RepositoryRef::https("https://host/org/repo.git")
            .at(Some("refs/heads/main".into()), Some("abc123".into()));
        assert_eq!(repo.clone_url(), "https://host/org/repo.git");
        assert_eq!(repo.branch(), Some("main"));

        let repo = repo.over_ssh("git@host:org/repo.git", "deploy-key");
        assert_eq!(repo.clone_url(), "git@host:org/repo.git");
        assert_eq!(repo.name(), "org-repo");
    }
}
