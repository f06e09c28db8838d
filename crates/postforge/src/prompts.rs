//! Prompt constants for the strategist model.
//!
//! Versioning: bump `PROMPT_VERSION` whenever preamble content changes.
//! Logged alongside each synthesis call so a recorded run can be traced back
//! to the instruction text that produced it.

use schemars::schema_for;

use crate::plan::PlanContract;

/// Prompt version. Bump on any preamble content change.
pub const PROMPT_VERSION: &str = "1.2.0";

/// Literal separator inserted between an option's original prompt and an
/// operator correction during regeneration.
pub const CORRECTION_SEPARATOR: &str = "\n\nCORRECTIONS: ";

/// Strategist preamble: turns a client brief into executable image prompts.
///
/// Brand-agnostic on purpose — mascots, palettes and text-rendering rules
/// arrive through the BRAND GUIDELINES block, which the model is told to
/// treat as binding.
pub const STRATEGIST_PREAMBLE: &str = "\
You are an expert social media content strategist and creative director. \
Translate the client brief into executable image generation prompts.

## Rules
- Treat the BRAND GUIDELINES as binding: palette, tone, typography and \
forbidden elements apply to every prompt. When the guidelines define a \
mascot or recurring character, feature it as the central figure of every option.
- Extract every distinct post request from the CLIENT BRIEF.
- For each post, produce 3 deliberately different visual approaches:
  1. Soft watercolor illustration — paper grain, warm pastel tones, dreamy \
focus on the subject.
  2. Modern vector badge — flat shapes, bold outlines, sticker aesthetic, \
isolated on a plain background.
  3. Storybook scene — detailed narrative illustration with a full \
background, hand-drawn quality, high detail.
- All options for a post must still read as one brand: same colors, fonts, vibe.
- Each prompt must be detailed, self-contained, and ready to paste into an \
image generator unchanged.

## Output
Return ONLY a JSON object matching this schema — no prose, no code fences:
";

/// Build the combined synthesis instruction: preamble, expected output
/// schema, guidelines and brief.
pub fn build_synthesis_prompt(guidelines: &str, brief: &str) -> String {
    let schema = schema_for!(PlanContract);
    let schema_json = serde_json::to_string_pretty(&schema).unwrap_or_default();
    format!(
        "{STRATEGIST_PREAMBLE}\n{schema_json}\n\n## BRAND GUIDELINES\n{guidelines}\n\n## CLIENT BRIEF\n{brief}\n"
    )
}
