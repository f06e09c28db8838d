//! Regeneration Handler: re-render one option with an appended correction.
//!
//! A regeneration is a single best-effort attempt, like any other render.
//! The new image goes to a fresh `_v2` filename — the prior file is never
//! deleted or overwritten; only the option record moves to the new file.
//! On failure the prior successful state is left untouched.

use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::gemini::ImageModel;
use crate::orchestrator::BatchRun;
use crate::plan::OptionStatus;
use crate::prompts::CORRECTION_SEPARATOR;
use crate::renderer::{filename_stem, ImageRenderer, RenderOutcome};
use crate::session::LogEntry;

/// Reasons a regeneration request is rejected before any model call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegenError {
    #[error("correction text is required to regenerate")]
    EmptyCorrection,
    #[error("post {0} has no option {1}")]
    UnknownOption(u32, usize),
    #[error("post {post_id} option {option_number} has no generated image to replace")]
    NotGenerated { post_id: u32, option_number: usize },
}

/// Outcome of a regeneration attempt.
#[derive(Debug)]
pub enum RegenOutcome {
    /// Option updated in place; the log row to append.
    Replaced { entry: LogEntry },
    /// Render failed; prior state untouched. Message for the operator.
    Failed { message: String },
}

/// Re-render `option_number` (1-based) of `post_id` with the correction
/// appended to the option's original prompt.
pub async fn regenerate<M: ImageModel>(
    renderer: &ImageRenderer<'_, M>,
    output_dir: &Path,
    run: &mut BatchRun,
    post_id: u32,
    option_number: usize,
    correction: &str,
) -> Result<RegenOutcome, RegenError> {
    let correction = correction.trim();
    if correction.is_empty() {
        return Err(RegenError::EmptyCorrection);
    }

    let brief_snippet = run.brief_snippet.clone();
    let post = run
        .post_mut(post_id)
        .ok_or(RegenError::UnknownOption(post_id, option_number))?;
    let concept = post.concept.clone();
    let option = option_number
        .checked_sub(1)
        .and_then(|i| post.options.get_mut(i))
        .ok_or(RegenError::UnknownOption(post_id, option_number))?;
    if option.status != OptionStatus::Generated {
        return Err(RegenError::NotGenerated {
            post_id,
            option_number,
        });
    }

    let prompt = format!(
        "{}{}{}",
        option.original_prompt, CORRECTION_SEPARATOR, correction
    );
    let stem = filename_stem(post_id, option_number, true);

    match renderer.render(&prompt, output_dir, &stem).await {
        RenderOutcome::Written { path, filename, .. } => {
            info!(
                post = post_id,
                option = option_number,
                path = %path.display(),
                "option regenerated"
            );
            let entry = LogEntry::new(
                &brief_snippet,
                post_id,
                &concept,
                format!("{option_number}_v2"),
                &prompt,
                &path,
            );
            option.apply_regeneration(prompt, path, filename);
            Ok(RegenOutcome::Replaced { entry })
        }
        RenderOutcome::Failed { message } => Ok(RegenOutcome::Failed { message }),
    }
}
