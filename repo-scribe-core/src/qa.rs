//! Attachment-grounded question answering.
//!
//! [`AttachmentQa`] sends a prompt together with file content to the configured
//! [`ChatService`] and classifies the reply. The service's literal "no relevant
//! information" reply comes back as [`QaAnswer::NoInformation`] so callers can
//! drop it; it is not an error. Retries are the caller's business.

use std::sync::Arc;

use tracing::debug;

use crate::contract::{Attachment, ChatService};
use crate::error::ServiceError;
use crate::prompts::PromptSpec;

pub const DEFAULT_NO_INFORMATION: &str =
    "Sorry, I could not find relevant information to complete your request.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QaAnswer {
    Text(String),
    NoInformation,
}

/// A generated answer to one prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub category: String,
    pub prompt: String,
    pub text: String,
}

impl Answer {
    pub fn new(spec: &PromptSpec, text: String) -> Self {
        Self {
            category: spec.category.clone(),
            prompt: spec.prompt.clone(),
            text,
        }
    }

    /// `[<category>]<prompt>:\n<answer>\n`
    pub fn render(&self) -> String {
        format!("[{}]{}:\n{}\n", self.category, self.prompt, self.text)
    }
}

#[derive(Clone)]
pub struct AttachmentQa {
    chat: Arc<dyn ChatService>,
    sentinel: String,
}

impl AttachmentQa {
    pub fn new(chat: Arc<dyn ChatService>, sentinel: impl Into<String>) -> Self {
        Self {
            chat,
            sentinel: sentinel.into(),
        }
    }

    pub async fn ask(
        &self,
        prompt: &str,
        file_identifier: &str,
        content: &[u8],
    ) -> Result<QaAnswer, ServiceError> {
        let attachment = Attachment {
            name: file_identifier.to_string(),
            data: content.to_vec(),
        };
        let reply = self.chat.chat_with_attachment(prompt, attachment).await?;
        if reply.trim() == self.sentinel.trim() {
            debug!(file = file_identifier, "QA service had no relevant information");
            return Ok(QaAnswer::NoInformation);
        }
        Ok(QaAnswer::Text(reply))
    }

    /// Ask every prompt in order, keeping only real answers.
    pub async fn ask_all(
        &self,
        prompts: &[PromptSpec],
        file_identifier: &str,
        content: &[u8],
    ) -> Result<Vec<Answer>, ServiceError> {
        let mut answers = Vec::with_capacity(prompts.len());
        for spec in prompts {
            if let QaAnswer::Text(text) = self.ask(&spec.prompt, file_identifier, content).await? {
                answers.push(Answer::new(spec, text));
            }
        }
        Ok(answers)
    }
}
