// Materializes local git repositories created with the git binary.

use std::path::Path;
use std::process::Command;

use tempfile::tempdir;

use repo_scribe_core::contract::Materializer;
use repo_scribe_core::error::MaterializeError;
use repo_scribe_core::materialize::{GitMaterializer, HostKeyChecking};
use repo_scribe_core::repository::RepositoryRef;

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["-c", "user.name=Test", "-c", "user.email=test@example.com"])
        .args(args)
        .output()
        .expect("git should be installed");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Repository with two commits on `main`; returns the sha of the first.
fn origin(dir: &Path) -> String {
    git(dir, &["init", "--quiet", "-b", "main"]);
    std::fs::write(dir.join("a.py"), "print('v1')\n").unwrap();
    git(dir, &["add", "."]);
    git(dir, &["commit", "--quiet", "-m", "first"]);
    let first = git(dir, &["rev-parse", "HEAD"]);

    std::fs::write(dir.join("a.py"), "print('v2')\n").unwrap();
    std::fs::create_dir_all(dir.join("src")).unwrap();
    std::fs::write(dir.join("src/b.py"), "b = 2\n").unwrap();
    git(dir, &["add", "."]);
    git(dir, &["commit", "--quiet", "-m", "second"]);
    first
}

#[tokio::test]
async fn test_materialize_pins_the_requested_commit() {
    let upstream = tempdir().unwrap();
    let first = origin(upstream.path());
    let destination = tempdir().unwrap();

    let repository = RepositoryRef::https(upstream.path().to_string_lossy())
        .at(Some("refs/heads/main".into()), Some(first));
    let tree = GitMaterializer::new(HostKeyChecking::Strict)
        .materialize(&repository, destination.path())
        .await
        .expect("materialization should succeed");

    assert_eq!(tree.root, destination.path());
    assert_eq!(tree.files_copied, 1);
    assert_eq!(
        std::fs::read_to_string(destination.path().join("a.py")).unwrap(),
        "print('v1')\n"
    );
    assert!(!destination.path().join("src/b.py").exists());
    assert!(!destination.path().join(".git").exists(), "no git metadata in the tree");
}

#[tokio::test]
async fn test_materialize_defaults_to_the_branch_head() {
    let upstream = tempdir().unwrap();
    origin(upstream.path());
    let destination = tempdir().unwrap();

    let repository = RepositoryRef::https(upstream.path().to_string_lossy())
        .at(Some("main".into()), None);
    let tree = GitMaterializer::new(HostKeyChecking::Strict)
        .materialize(&repository, destination.path())
        .await
        .unwrap();

    assert_eq!(tree.files_copied, 2);
    assert_eq!(
        std::fs::read_to_string(destination.path().join("src/b.py")).unwrap(),
        "b = 2\n"
    );
}

#[tokio::test]
async fn test_unknown_commit_is_a_checkout_error() {
    let upstream = tempdir().unwrap();
    origin(upstream.path());
    let destination = tempdir().unwrap();

    let repository = RepositoryRef::https(upstream.path().to_string_lossy()).at(
        Some("refs/heads/main".into()),
        Some("0123456789abcdef0123456789abcdef01234567".into()),
    );
    let result = GitMaterializer::new(HostKeyChecking::Strict)
        .materialize(&repository, destination.path())
        .await;

    assert!(
        matches!(result, Err(MaterializeError::Checkout { .. })),
        "expected checkout error, got {result:?}"
    );
}

#[tokio::test]
async fn test_missing_repository_is_a_clone_error() {
    let missing = tempdir().unwrap();
    let destination = tempdir().unwrap();

    let repository =
        RepositoryRef::https(missing.path().join("does-not-exist").to_string_lossy());
    let result = GitMaterializer::new(HostKeyChecking::Strict)
        .materialize(&repository, destination.path())
        .await;

    assert!(
        matches!(result, Err(MaterializeError::Clone { .. })),
        "expected clone error, got {result:?}"
    );
}
