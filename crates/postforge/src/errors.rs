//! Error taxonomy for the generation pipeline.
//!
//! Every failure belongs to one of two tiers, and callers can query
//! `tier()` instead of string-matching messages:
//!
//! | Tier      | Effect                                            |
//! |-----------|---------------------------------------------------|
//! | Fatal     | The whole run stops; the operator sees the error. |
//! | ItemLocal | One option is marked `error`; siblings proceed.   |
//!
//! Nothing here is retried automatically. The only recovery path for an
//! item-local failure is a manual regeneration of the affected option.

use std::fmt;

use thiserror::Error;

/// How far a failure reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureTier {
    /// Aborts the run immediately.
    Fatal,
    /// Recorded on the affected option; the batch continues.
    ItemLocal,
}

impl fmt::Display for FailureTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fatal => write!(f, "fatal"),
            Self::ItemLocal => write!(f, "item_local"),
        }
    }
}

/// Top-level pipeline errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Operator-supplied configuration is unusable (missing credential,
    /// unreadable config file, bad value).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Prompt synthesis failed. Carries the diagnostic model listing.
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    /// The batch phase machine rejected a transition — a driver bug, not an
    /// operator problem.
    #[error(transparent)]
    Phase(#[from] crate::orchestrator::IllegalPhaseChange),

    /// A single render failed. Recorded on the affected option only.
    #[error("render failed for post {post_id} option {option_number}: {message}")]
    Render {
        post_id: u32,
        option_number: usize,
        message: String,
    },
}

impl PipelineError {
    /// Classify this error's blast radius.
    pub fn tier(&self) -> FailureTier {
        match self {
            Self::Render { .. } => FailureTier::ItemLocal,
            _ => FailureTier::Fatal,
        }
    }
}

/// Fatal prompt-synthesis failure.
///
/// The display output is meant for a human operator: the underlying error
/// followed by a best-effort listing of model identifiers visible to the
/// credential, which is usually enough to spot a wrong or deprecated model
/// id without a second round trip.
#[derive(Debug)]
pub struct SynthesisError {
    /// What went wrong (API error or unusable response).
    pub message: String,
    /// Model identifiers visible to the credential, possibly truncated.
    pub available_models: Vec<String>,
}

impl fmt::Display for SynthesisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "prompt synthesis failed: {}", self.message)?;
        if !self.available_models.is_empty() {
            write!(f, "\n\nAVAILABLE MODELS:\n{}", self.available_models.join("\n"))?;
        }
        Ok(())
    }
}

impl std::error::Error for SynthesisError {}
