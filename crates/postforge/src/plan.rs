//! Post plan data model and ingestion.
//!
//! The strategist model returns a JSON object with a `posts` list. Each
//! post carries a handful of alternative image prompts ("options") which the
//! model may emit either as bare strings or as objects with a `prompt`
//! field. Both shapes are normalized here, at ingestion, into
//! [`PromptOption`] — consumers never type-sniff.
//!
//! Parsing is fail-closed: a response with no JSON object, or JSON that does
//! not match the expected shape, is a [`PlanParseError`] and the caller
//! treats it as fatal. No validation happens beyond the raw parse.

use std::fmt;
use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Lifecycle of a single option's render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionStatus {
    /// Placeholder materialized, render not yet attempted.
    Pending,
    /// Render call in flight.
    Generating,
    /// Image written to disk.
    Generated,
    /// Render failed; `message` explains why.
    Error,
}

impl fmt::Display for OptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Generating => write!(f, "generating"),
            Self::Generated => write!(f, "generated"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One alternative image prompt/render for a post concept.
///
/// `current_prompt` equals `original_prompt` until a regeneration succeeds,
/// after which it reflects the prompt actually sent for the most recent
/// successful render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptOption {
    pub original_prompt: String,
    pub current_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub status: OptionStatus,
    pub message: String,
}

impl PromptOption {
    pub fn new(prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        Self {
            original_prompt: prompt.clone(),
            current_prompt: prompt,
            path: None,
            filename: None,
            status: OptionStatus::Pending,
            message: "pending".into(),
        }
    }

    /// Reset to the pending placeholder (first pass of the batch loop).
    pub fn reset_pending(&mut self) {
        self.path = None;
        self.filename = None;
        self.status = OptionStatus::Pending;
        self.message = "pending".into();
    }

    /// Mark the render call as in flight.
    pub fn begin_render(&mut self) {
        self.status = OptionStatus::Generating;
        self.message = "generating".into();
    }

    /// Record a successful render.
    pub fn complete(&mut self, path: PathBuf, filename: String, message: impl Into<String>) {
        self.path = Some(path);
        self.filename = Some(filename);
        self.status = OptionStatus::Generated;
        self.message = message.into();
    }

    /// Record a failed render. Any previously written file reference is
    /// dropped — `status == generated` must always point at a real file.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.path = None;
        self.filename = None;
        self.status = OptionStatus::Error;
        self.message = message.into();
    }

    /// Replace the render with a regenerated one. The prior image file is
    /// left on disk; only this record moves to the new file.
    pub fn apply_regeneration(&mut self, prompt: String, path: PathBuf, filename: String) {
        self.current_prompt = prompt;
        self.path = Some(path);
        self.filename = Some(filename);
        self.status = OptionStatus::Generated;
        self.message = "image regenerated".into();
    }

    /// Whether a render attempt has settled this option.
    pub fn is_settled(&self) -> bool {
        matches!(self.status, OptionStatus::Generated | OptionStatus::Error)
    }
}

/// A single post concept with its alternative prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: u32,
    pub concept: String,
    pub description: String,
    pub options: Vec<PromptOption>,
}

/// The full plan parsed from the strategist model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPlan {
    pub posts: Vec<Post>,
}

impl ContentPlan {
    /// Total number of prompt options across all posts.
    pub fn total_options(&self) -> usize {
        self.posts.iter().map(|p| p.options.len()).sum()
    }
}

/// Why a model response could not be ingested.
#[derive(Debug, Error)]
pub enum PlanParseError {
    #[error("model response contained no JSON object")]
    NoJson,
    #[error("plan JSON did not match the expected shape: {0}")]
    Shape(#[from] serde_json::Error),
}

// ── Wire shapes ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawPlan {
    #[serde(default)]
    posts: Vec<RawPost>,
}

#[derive(Debug, Deserialize)]
struct RawPost {
    id: u32,
    concept: String,
    description: String,
    #[serde(default)]
    options: Vec<RawOption>,
}

/// A prompt option as the model emits it: a bare string, or an object whose
/// `prompt` field carries the text (any other object is kept as its JSON
/// text rather than rejected).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawOption {
    Bare(String),
    Object(serde_json::Map<String, Value>),
}

impl RawOption {
    fn into_prompt(self) -> String {
        match self {
            Self::Bare(text) => text,
            Self::Object(map) => match map.get("prompt").and_then(Value::as_str) {
                Some(prompt) => prompt.to_string(),
                None => Value::Object(map).to_string(),
            },
        }
    }
}

/// Parse a raw model response into a [`ContentPlan`].
///
/// Tolerates a ```` ```json ```` fence or surrounding prose around the JSON
/// object; everything else about the shape is taken as-is.
pub fn parse_plan_response(raw: &str) -> Result<ContentPlan, PlanParseError> {
    let json = extract_json_block(raw).ok_or(PlanParseError::NoJson)?;
    let parsed: RawPlan = serde_json::from_str(json)?;
    let posts = parsed
        .posts
        .into_iter()
        .map(|post| Post {
            id: post.id,
            concept: post.concept,
            description: post.description,
            options: post
                .options
                .into_iter()
                .map(|option| PromptOption::new(option.into_prompt()))
                .collect(),
        })
        .collect();
    Ok(ContentPlan { posts })
}

/// Extract the JSON payload from a model response that may wrap it in a
/// fenced block or surrounding prose.
fn extract_json_block(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let json_start = start + 7;
        if let Some(end) = text[json_start..].find("```") {
            return Some(text[json_start..json_start + end].trim());
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

// ── Contract rendered into the synthesis instruction ─────────────────

/// Shape the strategist model is asked to produce. Rendered as a JSON
/// schema inside the synthesis instruction; never deserialized directly
/// (ingestion stays permissive about the option shape).
#[derive(Debug, JsonSchema)]
pub struct PlanContract {
    /// One entry per distinct post request found in the brief.
    pub posts: Vec<PostContract>,
}

/// A single planned post.
#[derive(Debug, JsonSchema)]
pub struct PostContract {
    /// Sequential number starting at 1.
    pub id: u32,
    /// Short title of the post idea.
    pub concept: String,
    /// Brief explanation of the post content.
    pub description: String,
    /// Three distinct, copy-paste-ready image generation prompts.
    pub options: Vec<String>,
}
