//! Upserts answers and raw sources into the document store under deterministic ids.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::contract::{DocumentRecord, DocumentStore};
use crate::error::ServiceError;
use crate::identity::document_id;
use crate::qa::Answer;

/// Category of the record holding a file's raw content.
pub const CODE_CATEGORY: &str = "code";

/// Build the record for one (file, category[, commit]) fact.
pub fn build_record(
    cleaned_path: &str,
    category: &str,
    prompt: &str,
    body: &str,
    commit: Option<&str>,
) -> DocumentRecord {
    let mut attributes = BTreeMap::new();
    attributes.insert("url".to_string(), cleaned_path.to_string());
    if let Some(sha) = commit {
        attributes.insert("commit_sha".to_string(), sha.to_string());
    }
    DocumentRecord {
        id: document_id(cleaned_path, category, commit),
        title: format!("{cleaned_path} [{category}]"),
        content: format!("{cleaned_path} | {prompt} | {body}"),
        attributes,
    }
}

#[derive(Clone)]
pub struct Indexer {
    store: Arc<dyn DocumentStore>,
}

impl Indexer {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn upsert(&self, record: DocumentRecord) -> Result<(), ServiceError> {
        debug!(id = %record.id, title = %record.title, "Upserting document");
        self.store.put_document(record).await
    }

    pub async fn index_answer(
        &self,
        cleaned_path: &str,
        answer: &Answer,
        commit: Option<&str>,
    ) -> Result<(), ServiceError> {
        self.upsert(build_record(
            cleaned_path,
            &answer.category,
            &answer.prompt,
            &answer.text,
            commit,
        ))
        .await
    }

    /// Index the file itself so ground truth is searchable next to the commentary.
    pub async fn index_source(&self, cleaned_path: &str, source: &str) -> Result<(), ServiceError> {
        self.upsert(build_record(cleaned_path, CODE_CATEGORY, "", source, None))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockDocumentStore;
    use crate::prompts::PromptSpec;

    const PATH: &str = "https://host/org/repo/a.py";

    #[test]
    fn record_layout() {
        let record = build_record(PATH, "documentation", "Explain", "It prints.", None);
        assert_eq!(record.id, document_id(PATH, "documentation", None));
        assert_eq!(record.title, "https://host/org/repo/a.py [documentation]");
        assert_eq!(record.content, "https://host/org/repo/a.py | Explain | It prints.");
        assert_eq!(record.attributes.get("url").map(String::as_str), Some(PATH));
        assert!(!record.attributes.contains_key("commit_sha"));
    }

    #[test]
    fn commit_records_carry_the_sha() {
        let record = build_record(PATH, "documentation", "Explain", "x", Some("abc123"));
        assert_eq!(record.id, document_id(PATH, "documentation", Some("abc123")));
        assert_eq!(
            record.attributes.get("commit_sha").map(String::as_str),
            Some("abc123")
        );
    }

    #[tokio::test]
    async fn source_upload_uses_code_category_and_empty_prompt() {
        let mut store = MockDocumentStore::new();
        store
            .expect_put_document()
            .withf(|doc| {
                doc.id == document_id(PATH, CODE_CATEGORY, None)
                    && doc.content == "https://host/org/repo/a.py |  | print(1)"
            })
            .times(1)
            .returning(|_| Ok(()));
        let indexer = Indexer::new(Arc::new(store));

        indexer.index_source(PATH, "print(1)").await.unwrap();
    }

    #[tokio::test]
    async fn answers_are_indexed_under_their_category() {
        let mut store = MockDocumentStore::new();
        store
            .expect_put_document()
            .withf(|doc| doc.id == document_id(PATH, "questions", Some("abc123")))
            .times(1)
            .returning(|_| Ok(()));
        let indexer = Indexer::new(Arc::new(store));
        let answer = Answer::new(&PromptSpec::new("questions", "Ask"), "Q&A".into());

        indexer.index_answer(PATH, &answer, Some("abc123")).await.unwrap();
    }
}
