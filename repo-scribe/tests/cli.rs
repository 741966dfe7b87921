use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::write;
use tempfile::NamedTempFile;

/// Writes a push payload the CLI can read.
fn create_push_payload(body: &str) -> NamedTempFile {
    let payload = NamedTempFile::new().expect("Creating temp payload file failed");
    write(payload.path(), body).expect("Writing temp payload failed");
    payload
}

#[test]
fn parse_push_prints_normalized_input() {
    let payload = create_push_payload(
        r#"{"ref": "refs/heads/main", "after": "abc123",
            "repository": {"clone_url": "https://host/org/repo.git"},
            "pusher": {"name": "octocat"}}"#,
    );
    let mut cmd = Command::cargo_bin("repo-scribe").expect("Binary exists");

    cmd.arg("parse-push").arg("--payload").arg(payload.path());

    cmd.assert()
        .success()
        .stdout(
            predicate::str::contains(r#""repo_url": "https://host/org/repo.git""#)
                .and(predicate::str::contains(r#""ref": "refs/heads/main""#))
                .and(predicate::str::contains(r#""commit_sha": "abc123""#))
                .and(predicate::str::contains(r#""committer": "octocat""#)),
        );
}

#[test]
fn parse_push_rejects_other_events() {
    let payload = create_push_payload(r#"{"type": "IssuesEvent", "repository": {"url": "x"}}"#);
    let mut cmd = Command::cargo_bin("repo-scribe").expect("Binary exists");

    cmd.arg("parse-push").arg("--payload").arg(payload.path());

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Not a push event"));
}

#[test]
fn ingest_without_repository_fails_before_any_work() {
    let mut cmd = Command::cargo_bin("repo-scribe").expect("Binary exists");

    cmd.arg("ingest")
        .current_dir(std::env::temp_dir())
        .env_remove("REPO_URL")
        .env("S3_BUCKET", "bucket");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Missing required setting REPO_URL"));
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*; // needed for .with()
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        use std::fmt::Write as FmtWrite;
        let mut msg = String::new();
        let _ = write!(&mut msg, "{:?}", event);
        self.events.lock().unwrap().push(msg);
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use repo_scribe::cli::{run, Cli, Commands};

    // A missing payload fails after the initial event.
    let cli = Cli {
        config: None,
        command: Commands::ParsePush {
            payload: std::path::PathBuf::from("does-not-exist.json"),
        },
    };

    let result = run(cli).await;
    assert!(result.is_err());

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
