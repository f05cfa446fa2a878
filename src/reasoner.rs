//! Text-reasoning prompts, the strict answer grammar, and the Anthropic client.
//!
//! The model is asked to reply with a single 1-based index or the word `none`.
//! Anything else is a parse failure, which callers treat as "no match".

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collaborators::TextReasoner;
use crate::error::CollaboratorError;
use crate::types::{LinkIndexEntry, ScoredEntry};

pub const DEFAULT_REASONER_MODEL: &str = "claude-sonnet-4-20250514";
const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_ANSWER_TOKENS: usize = 16;

// =============================================================================
// Answer grammar
// =============================================================================

/// A parsed classifier answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    /// Zero-based position in the list that was shown.
    Entry(usize),
    NoMatch,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnswerParseError {
    #[error("empty answer")]
    Empty,

    #[error("answer is neither an index nor 'none': {0:?}")]
    Unrecognized(String),

    #[error("index {index} outside 1..={count}")]
    OutOfRange { index: usize, count: usize },
}

/// Parse `answer` against a list of `count` options.
///
/// Accepted: surrounding whitespace, then either a decimal integer in
/// `1..=count` or `none` in any case. Nothing else.
pub fn parse_choice(answer: &str, count: usize) -> Result<Choice, AnswerParseError> {
    let trimmed = answer.trim();
    if trimmed.is_empty() {
        return Err(AnswerParseError::Empty);
    }
    if trimmed.eq_ignore_ascii_case("none") {
        return Ok(Choice::NoMatch);
    }
    if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AnswerParseError::Unrecognized(truncate(trimmed, 80)));
    }
    let index: usize = trimmed
        .parse()
        .map_err(|_| AnswerParseError::Unrecognized(truncate(trimmed, 80)))?;
    if index == 0 || index > count {
        return Err(AnswerParseError::OutOfRange { index, count });
    }
    Ok(Choice::Entry(index - 1))
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

// =============================================================================
// Prompts
// =============================================================================

const ANSWER_RULES: &str = "Answer with ONLY the number of the single correct option, \
or the word none if no option is an exact match. Do not explain.";

/// Small-catalog exact-match prompt: every healthy entry, enumerated from 1.
pub fn list_match_prompt(description: &str, entries: &[LinkIndexEntry]) -> String {
    let mut prompt = String::with_capacity(512 + entries.len() * 96);
    prompt.push_str(
        "You are matching an element of a marketing email to the one page on the brand's \
         website it should link to.\n\n",
    );
    prompt.push_str(&format!("Element description: {}\n\n", description.trim()));
    prompt.push_str("Known pages:\n");
    for (i, entry) in entries.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. [{}] {} | {}\n",
            i + 1,
            entry.link_type.as_str(),
            entry.display_title(),
            entry.url
        ));
    }
    prompt.push_str(
        "\nRules:\n\
         - Only an exact match for the specific item described counts.\n\
         - A collection page is never a substitute for a specific product.\n\
         - Different dates, seasons, years or versions are not matches.\n\
         - If more than one option could fit, answer none.\n\n",
    );
    prompt.push_str(ANSWER_RULES);
    prompt
}

/// Medium-confidence confirmation prompt over vector-search candidates.
pub fn confirmation_prompt(description: &str, candidates: &[ScoredEntry]) -> String {
    let mut prompt = String::with_capacity(512 + candidates.len() * 96);
    prompt.push_str(
        "A similarity search returned these candidate pages for an element of a marketing \
         email. Confirm which one, if any, is the correct destination.\n\n",
    );
    prompt.push_str(&format!("Element description: {}\n\n", description.trim()));
    prompt.push_str("Candidates:\n");
    for (i, candidate) in candidates.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. {} (similarity {:.2}) | {}\n",
            i + 1,
            candidate.entry.display_title(),
            candidate.similarity,
            candidate.entry.url
        ));
    }
    prompt.push_str(
        "\nRules:\n\
         - Pick a candidate only if it is the exact item or page described.\n\
         - A collection page is never a substitute for a specific product.\n\
         - Different dates, seasons, years or versions are not matches.\n\n",
    );
    prompt.push_str(ANSWER_RULES);
    prompt
}

// =============================================================================
// Anthropic Messages API
// =============================================================================

pub struct AnthropicReasoner {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl AnthropicReasoner {
    pub fn new(api_key: String, model: Option<String>, timeout: Duration) -> Result<Self, String> {
        if api_key.trim().is_empty() {
            return Err("missing Anthropic API key".to_string());
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| format!("Failed to build Anthropic HTTP client: {}", e))?;
        Ok(Self {
            client,
            api_key: api_key.trim().to_string(),
            model: model.unwrap_or_else(|| DEFAULT_REASONER_MODEL.to_string()),
        })
    }

    /// Build from `ANTHROPIC_API_KEY`. Returns `None` when the key is not set.
    pub fn from_env(model: Option<String>, timeout: Duration) -> Option<Self> {
        let key = std::env::var("ANTHROPIC_API_KEY").ok()?;
        match Self::new(key, model, timeout) {
            Ok(reasoner) => Some(reasoner),
            Err(e) => {
                log::warn!("Anthropic reasoner unavailable: {}", e);
                None
            }
        }
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    temperature: f32,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[async_trait]
impl TextReasoner for AnthropicReasoner {
    async fn classify(&self, prompt: &str) -> Result<String, CollaboratorError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_ANSWER_TOKENS,
            temperature: 0.0,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };
        let resp = self
            .client
            .post(ANTHROPIC_MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(CollaboratorError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: MessagesResponse = resp.json().await?;
        let answer = parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(text),
                ResponseBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        if answer.trim().is_empty() {
            return Err(CollaboratorError::Malformed(
                "response missing text content".to_string(),
            ));
        }
        Ok(answer)
    }
}
