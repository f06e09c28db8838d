//! Prompt Synthesizer: one text-model call turning a brief plus brand
//! guidelines into a [`ContentPlan`].
//!
//! Failure here is always fatal and never retried. The error shown to the
//! operator carries a best-effort listing of available model identifiers,
//! which is the usual way to notice a wrong or deprecated model id.

use tracing::{debug, info};

use crate::errors::{PipelineError, SynthesisError};
use crate::gemini::TextModel;
use crate::plan::{parse_plan_response, ContentPlan};
use crate::prompts::{build_synthesis_prompt, PROMPT_VERSION};

/// Model identifiers carried in a synthesis failure before truncation.
const MODEL_LIST_LIMIT: usize = 50;

pub struct PromptSynthesizer<'a, T: TextModel> {
    model: &'a T,
}

impl<'a, T: TextModel> PromptSynthesizer<'a, T> {
    pub fn new(model: &'a T) -> Self {
        Self { model }
    }

    /// Draft a post plan for the brief. A single attempt: any API or parse
    /// failure surfaces as one fatal error.
    pub async fn synthesize(
        &self,
        brief: &str,
        guidelines: &str,
    ) -> Result<ContentPlan, PipelineError> {
        let prompt = build_synthesis_prompt(guidelines, brief);
        debug!(
            prompt_version = PROMPT_VERSION,
            prompt_len = prompt.len(),
            "requesting post plan"
        );

        let raw = match self.model.generate_json(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                return Err(self
                    .fatal(format!("text generation call failed: {e}"))
                    .await
                    .into())
            }
        };

        match parse_plan_response(&raw) {
            Ok(plan) => {
                info!(
                    posts = plan.posts.len(),
                    options = plan.total_options(),
                    "post plan parsed"
                );
                Ok(plan)
            }
            Err(e) => Err(self
                .fatal(format!("model returned an unusable plan: {e}"))
                .await
                .into()),
        }
    }

    /// Build the fatal error, attaching the diagnostic model listing.
    async fn fatal(&self, message: String) -> SynthesisError {
        let mut available = match self.model.list_models().await {
            Ok(models) => models,
            Err(_) => vec!["could not list models".to_string()],
        };
        if available.len() > MODEL_LIST_LIMIT {
            available.truncate(MODEL_LIST_LIMIT);
            available.push("... more ...".to_string());
        }
        SynthesisError {
            message,
            available_models: available,
        }
    }
}
