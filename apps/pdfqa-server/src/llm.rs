//! Language-model collaborator
//!
//! The pipeline only needs "instruction plus document text in, free text
//! out". [`Collaborator`] is that seam; [`GeminiClient`] implements it over
//! the Gemini `generateContent` REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use pdfqa_core::RELEVANT_TEXT_MARKER;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM request timed out after {0:?}")]
    Timeout(Duration),

    #[error("LLM request failed: {0}")]
    Transport(String),

    #[error("LLM returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode LLM response: {0}")]
    Decode(String),

    #[error("LLM returned no text")]
    Empty,
}

#[async_trait]
pub trait Collaborator: Send + Sync {
    /// Run one completion over the document text
    async fn complete(&self, instruction: &str, document_text: &str) -> Result<String, LlmError>;
}

/// Instruction for the question-answer call
pub fn answer_prompt(question: &str) -> String {
    format!(
        "You are given the text content of a document.\n\
         Question: {question}\n\
         Give a short answer to the question. Then, on a new line starting with \
         \"{RELEVANT_TEXT_MARKER}\", quote the exact passage (a few lines at most) from the \
         document that best supports the answer. Copy the passage word for word."
    )
}

/// Instruction for the sensitive-data call
pub const SENSITIVE_DATA_PROMPT: &str = "You are given the text content of a document.\n\
Identify every piece of sensitive data in it, such as email addresses, phone numbers, \
account numbers or personal identifiers. Quote each item exactly as it appears in the \
document and use this format:\n\
Sensitive Data:\n\
- [item 1]\n\
- [item 2]\n\
If there is none, answer with \"Sensitive Data:\" followed by \"- None\".";

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Text parts of the first candidate, concatenated
    fn into_text(self) -> Option<String> {
        let text: String = self
            .candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

pub struct GeminiClient {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(
        api_base: &str,
        api_key: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            model,
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base, self.model
        )
    }
}

#[async_trait]
impl Collaborator for GeminiClient {
    async fn complete(&self, instruction: &str, document_text: &str) -> Result<String, LlmError> {
        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![
                    RequestPart { text: instruction },
                    RequestPart {
                        text: document_text,
                    },
                ],
            }],
        };

        debug!(
            model = %self.model,
            document_chars = document_text.len(),
            "requesting completion"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.timeout)
                } else {
                    LlmError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(self.timeout)
            } else {
                LlmError::Decode(e.to_string())
            }
        })?;

        let text = parsed.into_text().ok_or(LlmError::Empty)?;
        debug!(chars = text.len(), "received completion");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_answer_prompt_names_marker_and_question() {
        let prompt = answer_prompt("What was revenue in 2023?");
        assert!(prompt.contains("Question: What was revenue in 2023?"));
        assert!(prompt.contains("\"Relevant text:\""));
    }

    #[test]
    fn test_sensitive_prompt_asks_for_bullets() {
        assert!(SENSITIVE_DATA_PROMPT.contains("Sensitive Data:\n- [item 1]"));
    }

    #[test]
    fn test_response_text_joins_parts_of_first_candidate() {
        let raw = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "The answer is 42.\n"}, {"text": "Relevant text: x"}]}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed.into_text().as_deref(),
            Some("The answer is 42.\nRelevant text: x")
        );
    }

    #[test]
    fn test_blocked_response_has_no_text() {
        let raw = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.into_text(), None);

        let raw = r#"{"candidates": [{"finishReason": "SAFETY"}]}"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.into_text(), None);
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = GeminiClient::new(
            "http://localhost:9999/",
            "key".into(),
            "gemini-1.5-flash-002".into(),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            client.endpoint(),
            "http://localhost:9999/v1beta/models/gemini-1.5-flash-002:generateContent"
        );
    }
}
