//! postforge — brief-to-asset social image pipeline.
//!
//! Turns a marketing brief into a batch of AI-generated social-media image
//! assets: a text model drafts a structured post plan, an image model
//! renders every prompt option, and the operator reviews and regenerates
//! individual options with corrections.
//!
//! Components, in dependency order:
//! - [`config`]: layered runtime configuration (CLI > env > file > default)
//! - [`gemini`]: `generateContent` wire client and the model seam traits
//! - [`plan`]: post/option data model and JSON ingestion
//! - [`synthesizer`]: brief + guidelines → content plan (fatal on failure)
//! - [`renderer`]: prompt → image file; single attempt, never raises
//! - [`orchestrator`]: batch render loop with cooperative stop
//! - [`regen`]: per-option correction re-render
//! - [`session`]: snapshot, activity log, archive bundle
//!
//! Execution is deliberately sequential: one in-flight model call at a
//! time, throughput bounded by network latency × number of images. The only
//! concurrency-adjacent piece is the cancellation token checked between
//! calls.

pub mod config;
pub mod errors;
pub mod gemini;
pub mod orchestrator;
pub mod plan;
pub mod prompts;
pub mod regen;
pub mod renderer;
pub mod session;
pub mod synthesizer;

pub use config::{AppConfig, ConfigOverrides, ImageSize};
pub use errors::{FailureTier, PipelineError, SynthesisError};
pub use gemini::{GeminiClient, ImageModel, RenderSettings, TextModel};
pub use orchestrator::{BatchOrchestrator, BatchPhase, BatchReport, BatchRun};
pub use plan::{ContentPlan, OptionStatus, Post, PromptOption};
pub use renderer::{ImageRenderer, RenderOutcome};
pub use session::{LogEntry, SessionStore};
