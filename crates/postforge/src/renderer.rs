//! Image Renderer: one model call, one file write, never raises.
//!
//! A render is a single attempt — no retry, no backoff, no timeout. Every
//! failure (payload-less response, transport error, filesystem error) is
//! folded into [`RenderOutcome::Failed`] with a message meant for a human
//! operator; the caller records it on the affected option and moves on.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::Local;
use tracing::debug;

use crate::gemini::{ImageModel, RenderSettings};

/// Result of a render attempt. Failures are data, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Image written to `path`.
    Written {
        path: PathBuf,
        filename: String,
        message: String,
    },
    /// Nothing written; the message explains why.
    Failed { message: String },
}

impl RenderOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Written { message, .. } | Self::Failed { message } => message,
        }
    }
}

pub struct ImageRenderer<'a, M: ImageModel> {
    model: &'a M,
    settings: RenderSettings,
}

impl<'a, M: ImageModel> ImageRenderer<'a, M> {
    pub fn new(model: &'a M, settings: RenderSettings) -> Self {
        Self { model, settings }
    }

    /// Render `prompt` into `dir` under `stem`, with the extension taken
    /// from the returned payload's MIME type. Never returns an error.
    pub async fn render(&self, prompt: &str, dir: &Path, stem: &str) -> RenderOutcome {
        let payload = match self.model.generate_image(prompt, &self.settings).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                return RenderOutcome::Failed {
                    message: "no image payload in model response".into(),
                }
            }
            Err(e) => {
                return RenderOutcome::Failed {
                    message: format!("{:#}", anyhow::Error::from(e)),
                }
            }
        };

        if payload.bytes.is_empty() {
            return RenderOutcome::Failed {
                message: "model returned an empty image payload".into(),
            };
        }

        let filename = format!("{stem}.{}", extension_for_mime(payload.mime_type.as_deref()));
        let path = dir.join(&filename);
        if let Err(e) = write_image(&path, &payload.bytes) {
            return RenderOutcome::Failed {
                message: format!("{e:#}"),
            };
        }

        debug!(path = %path.display(), bytes = payload.bytes.len(), "image written");
        RenderOutcome::Written {
            path,
            filename,
            message: "image generated".into(),
        }
    }
}

fn write_image(dest: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    fs::write(dest, bytes).with_context(|| format!("writing {}", dest.display()))
}

/// Deterministic filename stem: post id, 1-based option number, a `_v2`
/// marker for regenerations, and a timestamp to avoid collisions.
pub fn filename_stem(post_id: u32, option_number: usize, regenerated: bool) -> String {
    let stamp = Local::now().format("%Y%m%d%H%M%S");
    if regenerated {
        format!("post_{post_id}_opt_{option_number}_v2_{stamp}")
    } else {
        format!("post_{post_id}_opt_{option_number}_{stamp}")
    }
}

fn extension_for_mime(mime_type: Option<&str>) -> &'static str {
    match mime_type {
        Some("image/jpeg") => "jpg",
        Some("image/webp") => "webp",
        // The model answers with PNG unless asked otherwise.
        _ => "png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImageSize;
    use crate::gemini::{ImageBytes, MockImageModel, ModelError};

    fn settings() -> RenderSettings {
        RenderSettings {
            aspect_ratio: "1:1".into(),
            image_size: ImageSize::OneK,
        }
    }

    #[tokio::test]
    async fn test_render_writes_payload_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = MockImageModel::new();
        model.expect_generate_image().returning(|_, _| {
            Ok(Some(ImageBytes {
                bytes: vec![1, 2, 3, 4],
                mime_type: Some("image/png".into()),
            }))
        });

        let renderer = ImageRenderer::new(&model, settings());
        let outcome = renderer.render("a prompt", dir.path(), "post_1_opt_1_x").await;

        let RenderOutcome::Written { path, filename, .. } = outcome else {
            panic!("expected a written outcome");
        };
        assert_eq!(filename, "post_1_opt_1_x.png");
        let written = fs::read(&path).unwrap();
        assert_eq!(written, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_payload_less_response_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = MockImageModel::new();
        model.expect_generate_image().returning(|_, _| Ok(None));

        let renderer = ImageRenderer::new(&model, settings());
        let outcome = renderer.render("a prompt", dir.path(), "stem").await;

        assert!(!outcome.is_written());
        assert!(outcome.message().contains("no image payload"));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_model_error_becomes_a_failed_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = MockImageModel::new();
        model.expect_generate_image().returning(|_, _| {
            Err(ModelError::Api {
                status: 500,
                body: "overloaded".into(),
            })
        });

        let renderer = ImageRenderer::new(&model, settings());
        let outcome = renderer.render("a prompt", dir.path(), "stem").await;

        assert!(!outcome.is_written());
        assert!(outcome.message().contains("HTTP 500"));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_empty_payload_is_rejected_before_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = MockImageModel::new();
        model.expect_generate_image().returning(|_, _| {
            Ok(Some(ImageBytes {
                bytes: vec![],
                mime_type: None,
            }))
        });

        let renderer = ImageRenderer::new(&model, settings());
        let outcome = renderer.render("a prompt", dir.path(), "stem").await;

        assert!(!outcome.is_written());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_parent_directories_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let mut model = MockImageModel::new();
        model.expect_generate_image().returning(|_, _| {
            Ok(Some(ImageBytes {
                bytes: vec![9],
                mime_type: None,
            }))
        });

        let renderer = ImageRenderer::new(&model, settings());
        let outcome = renderer.render("p", &nested, "img").await;
        assert!(outcome.is_written());
        assert!(nested.join("img.png").exists());
    }

    #[test]
    fn test_filename_stem_shapes() {
        let stem = filename_stem(3, 2, false);
        assert!(stem.starts_with("post_3_opt_2_"));
        assert!(!stem.contains("_v2_"));

        let regen = filename_stem(3, 2, true);
        assert!(regen.starts_with("post_3_opt_2_v2_"));
    }

    #[test]
    fn test_extension_from_mime() {
        assert_eq!(extension_for_mime(Some("image/jpeg")), "jpg");
        assert_eq!(extension_for_mime(Some("image/webp")), "webp");
        assert_eq!(extension_for_mime(Some("image/png")), "png");
        assert_eq!(extension_for_mime(None), "png");
    }
}
