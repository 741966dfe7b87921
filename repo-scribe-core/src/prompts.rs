//! Prompt sets: which questions are asked about every file, and under which
//! category each answer is filed.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::contract::ParameterStore;
use crate::error::ConfigError;

/// One configured question. Stored as `{"prompt": ..., "type": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSpec {
    pub prompt: String,
    #[serde(rename = "type", alias = "category")]
    pub category: String,
}

impl PromptSpec {
    pub fn new(category: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            category: category.into(),
        }
    }
}

/// Parse a JSON array of prompts. `name` only labels errors.
pub fn parse_prompts(name: &str, raw: &str) -> Result<Vec<PromptSpec>, ConfigError> {
    let prompts: Vec<PromptSpec> =
        serde_json::from_str(raw).map_err(|source| ConfigError::Prompts {
            name: name.to_string(),
            source,
        })?;
    if prompts.is_empty() {
        return Err(ConfigError::EmptyPrompts(name.to_string()));
    }
    Ok(prompts)
}

pub async fn load_prompts(
    store: &dyn ParameterStore,
    name: &str,
) -> Result<Vec<PromptSpec>, ConfigError> {
    let raw = store.get_parameter(name).await?;
    let prompts = parse_prompts(name, &raw)?;
    info!(parameter = name, count = prompts.len(), "Loaded prompt set");
    Ok(prompts)
}

/// Whole-file documentation prompts used when no parameter is configured.
pub fn default_prompts() -> Vec<PromptSpec> {
    vec![
        PromptSpec::new(
            "questions",
            "Come up with a list of questions and answers about the attached file. Keep answers dense with information. A good question for a database related file would be 'What is the database technology and architecture?' or for a file that executes SQL commands 'What are the SQL commands and what do they do?' or for a file that contains a list of API endpoints 'What are the API endpoints and what do they do?'",
        ),
        PromptSpec::new(
            "documentation",
            "Generate comprehensive documentation about the attached file. Make sure you include what dependencies and other files are being referenced as well as function names, class names, and what they do.",
        ),
        PromptSpec::new(
            "anti-patterns",
            "Identify anti-patterns in the attached file. Make sure to include examples of how to fix them. Try Q&A like 'What are some anti-patterns in the file?' or 'What could be causing high latency?'",
        ),
        PromptSpec::new(
            "improvements",
            "Suggest improvements to the attached file. Try Q&A like 'What are some ways to improve the file?' or 'Where can the file be optimized?'",
        ),
    ]
}

/// Prompts run over a commit's unified diff of one file.
pub fn default_diff_prompts() -> Vec<PromptSpec> {
    vec![PromptSpec::new(
        "summary",
        "Summarize the changes in the attached diff. Describe what was changed, why it was likely changed, and any risk the change introduces. Keep the summary short enough for a pull request description.",
    )]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockParameterStore;

    #[test]
    fn parses_type_and_category_spellings() {
        let raw = r#"[{"prompt": "Explain", "type": "documentation"},
                      {"prompt": "Ask", "category": "questions"}]"#;
        let prompts = parse_prompts("prompts", raw).unwrap();
        assert_eq!(
            prompts,
            vec![
                PromptSpec::new("documentation", "Explain"),
                PromptSpec::new("questions", "Ask"),
            ]
        );
    }

    #[test]
    fn rejects_empty_and_malformed_sets() {
        assert!(matches!(
            parse_prompts("p", "[]"),
            Err(ConfigError::EmptyPrompts(name)) if name == "p"
        ));
        assert!(matches!(
            parse_prompts("p", r#"{"prompt": "x"}"#),
            Err(ConfigError::Prompts { .. })
        ));
    }

    #[tokio::test]
    async fn loads_from_parameter_store() {
        let mut store = MockParameterStore::new();
        store
            .expect_get_parameter()
            .withf(|name| name == "code-processing-config")
            .returning(|_| Ok(r#"[{"prompt": "Explain", "type": "documentation"}]"#.into()));

        let prompts = load_prompts(&store, "code-processing-config").await.unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].category, "documentation");
    }

    #[test]
    fn default_sets_are_not_empty() {
        let categories: Vec<_> = default_prompts().into_iter().map(|p| p.category).collect();
        assert_eq!(
            categories,
            ["questions", "documentation", "anti-patterns", "improvements"]
        );
        assert_eq!(default_diff_prompts().len(), 1);
    }
}
