//! Batch Orchestrator: drives the render loop over every post and option
//! with cooperative cancellation and per-item failure isolation.
//!
//! Two passes over the plan: the first materializes a pending placeholder
//! for every option, the second performs the renders, checking the stop
//! token before each post and again before each option. Cancellation never
//! interrupts an in-flight call — it only prevents starting the next one.
//! Options already settled are neither resumed nor rolled back.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::PipelineError;
use crate::gemini::ImageModel;
use crate::plan::{ContentPlan, Post};
use crate::renderer::{filename_stem, ImageRenderer, RenderOutcome};
use crate::session::LogEntry;

/// Length of the brief excerpt recorded with every log row.
const BRIEF_SNIPPET_LEN: usize = 30;

// ── Batch phase state machine ────────────────────────────────────────

/// Lifecycle of one batch run.
///
/// ```text
/// PlanReady → Rendering → ImagesGenerated | Stopped
/// PlanReady → ImagesGenerated              (nothing to render)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPhase {
    /// Plan parsed; placeholders not yet materialized.
    PlanReady,
    /// Render loop in progress.
    Rendering,
    /// Every option was attempted, or there was nothing to render.
    ImagesGenerated,
    /// A stop request prevented some options from being attempted.
    Stopped,
}

impl BatchPhase {
    /// Whether this phase ends the run.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::ImagesGenerated | Self::Stopped)
    }
}

impl fmt::Display for BatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlanReady => write!(f, "plan_ready"),
            Self::Rendering => write!(f, "rendering"),
            Self::ImagesGenerated => write!(f, "images_generated"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

fn is_legal_transition(from: BatchPhase, to: BatchPhase) -> bool {
    use BatchPhase::*;
    matches!(
        (from, to),
        (PlanReady, Rendering)
            | (PlanReady, ImagesGenerated)
            | (Rendering, ImagesGenerated)
            | (Rendering, Stopped)
    )
}

/// A single recorded phase change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: BatchPhase,
    pub to: BatchPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal phase change is attempted.
#[derive(Debug, Clone)]
pub struct IllegalPhaseChange {
    pub from: BatchPhase,
    pub to: BatchPhase,
}

impl fmt::Display for IllegalPhaseChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal batch phase change: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalPhaseChange {}

// ── Batch run context ────────────────────────────────────────────────

/// Explicit context for one batch: the posts, the brief excerpt, progress
/// counters and the phase log. Serialized whole as the session snapshot,
/// so a later `regenerate` invocation can pick the run back up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRun {
    pub brief_snippet: String,
    pub posts: Vec<Post>,
    pub phase: BatchPhase,
    /// Options attempted so far (progress numerator).
    pub attempted: usize,
    pub transitions: Vec<PhaseTransition>,
}

impl BatchRun {
    pub fn from_plan(plan: ContentPlan, brief: &str) -> Self {
        Self {
            brief_snippet: snippet(brief),
            posts: plan.posts,
            phase: BatchPhase::PlanReady,
            attempted: 0,
            transitions: Vec::new(),
        }
    }

    /// Total number of prompt options (progress denominator). A post with
    /// zero options contributes nothing.
    pub fn total_options(&self) -> usize {
        self.posts.iter().map(|p| p.options.len()).sum()
    }

    /// Progress fraction in `[0, 1]`. An empty batch counts as complete.
    pub fn progress(&self) -> f64 {
        let total = self.total_options();
        if total == 0 {
            1.0
        } else {
            self.attempted as f64 / total as f64
        }
    }

    /// Attempt a phase change, recording it when legal.
    pub fn advance(
        &mut self,
        to: BatchPhase,
        reason: Option<&str>,
    ) -> Result<(), IllegalPhaseChange> {
        if !is_legal_transition(self.phase, to) {
            return Err(IllegalPhaseChange {
                from: self.phase,
                to,
            });
        }
        tracing::debug!(from = %self.phase, to = %to, "batch phase change");
        self.transitions.push(PhaseTransition {
            from: self.phase,
            to,
            reason: reason.map(String::from),
        });
        self.phase = to;
        Ok(())
    }

    /// First pass of the loop: a pending placeholder for every option.
    pub fn materialize_placeholders(&mut self) {
        for post in &mut self.posts {
            for option in &mut post.options {
                option.reset_pending();
            }
        }
    }

    pub fn post_mut(&mut self, post_id: u32) -> Option<&mut Post> {
        self.posts.iter_mut().find(|p| p.id == post_id)
    }
}

fn snippet(brief: &str) -> String {
    brief.chars().take(BRIEF_SNIPPET_LEN).collect()
}

// ── Orchestrator ─────────────────────────────────────────────────────

/// Summary returned when the render loop finishes.
#[derive(Debug)]
pub struct BatchReport {
    pub attempted: usize,
    pub total: usize,
    pub generated: usize,
    pub failed: usize,
    /// One row per successful render, in render order. The caller flushes
    /// them to the activity log once the batch is done.
    pub entries: Vec<LogEntry>,
    pub stopped: bool,
}

/// Drives the two-pass render loop for a batch.
pub struct BatchOrchestrator<'a, M: ImageModel> {
    renderer: &'a ImageRenderer<'a, M>,
    output_dir: &'a Path,
}

impl<'a, M: ImageModel> BatchOrchestrator<'a, M> {
    pub fn new(renderer: &'a ImageRenderer<'a, M>, output_dir: &'a Path) -> Self {
        Self {
            renderer,
            output_dir,
        }
    }

    /// Run the batch to completion or until the stop token takes effect.
    pub async fn run(
        &self,
        run: &mut BatchRun,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, PipelineError> {
        let total = run.total_options();
        if total == 0 {
            warn!("plan contains no image prompts; skipping the render phase");
            run.advance(BatchPhase::ImagesGenerated, Some("no options to render"))?;
            return Ok(BatchReport {
                attempted: 0,
                total: 0,
                generated: 0,
                failed: 0,
                entries: Vec::new(),
                stopped: false,
            });
        }

        run.materialize_placeholders();
        run.advance(BatchPhase::Rendering, None)?;

        let mut entries = Vec::new();
        let mut generated = 0usize;
        let mut failed = 0usize;
        let mut stopped = false;

        'posts: for post_index in 0..run.posts.len() {
            if cancel.is_cancelled() {
                stopped = true;
                break 'posts;
            }
            let post_id = run.posts[post_index].id;
            let concept = run.posts[post_index].concept.clone();
            info!(post = post_id, concept = %concept, "rendering post options");

            for option_index in 0..run.posts[post_index].options.len() {
                if cancel.is_cancelled() {
                    stopped = true;
                    break 'posts;
                }
                let option_number = option_index + 1;
                let prompt = {
                    let option = &mut run.posts[post_index].options[option_index];
                    option.begin_render();
                    option.current_prompt.clone()
                };

                let stem = filename_stem(post_id, option_number, false);
                let outcome = self.renderer.render(&prompt, self.output_dir, &stem).await;
                run.attempted += 1;

                match outcome {
                    RenderOutcome::Written {
                        path,
                        filename,
                        message,
                    } => {
                        entries.push(LogEntry::new(
                            &run.brief_snippet,
                            post_id,
                            &concept,
                            option_number.to_string(),
                            &prompt,
                            &path,
                        ));
                        run.posts[post_index].options[option_index]
                            .complete(path, filename, message);
                        generated += 1;
                    }
                    RenderOutcome::Failed { message } => {
                        let err = PipelineError::Render {
                            post_id,
                            option_number,
                            message: message.clone(),
                        };
                        warn!(tier = %err.tier(), error = %err, "render failed; continuing with the next option");
                        run.posts[post_index].options[option_index].fail(message);
                        failed += 1;
                    }
                }

                info!(
                    attempted = run.attempted,
                    total,
                    progress = run.progress(),
                    "batch progress"
                );
            }
        }

        if stopped {
            run.advance(BatchPhase::Stopped, Some("stop requested"))?;
        } else {
            run.advance(BatchPhase::ImagesGenerated, None)?;
        }

        Ok(BatchReport {
            attempted: run.attempted,
            total,
            generated,
            failed,
            entries,
            stopped,
        })
    }
}
