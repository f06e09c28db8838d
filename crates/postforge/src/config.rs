//! Layered runtime configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Command-line flags (collected into [`ConfigOverrides`])
//! 2. Environment variables (`POSTFORGE_*`; the credential is also honored
//!    via `GEMINI_API_KEY` / `GOOGLE_API_KEY`)
//! 3. TOML config file (explicit `--config`, else `postforge.toml` when
//!    present in the working directory)
//! 4. Built-in defaults
//!
//! The credential is resolved lazily: subcommands that never touch the
//! network (`archive`, `clean`) work without one, and [`AppConfig::credential`]
//! turns its absence into a fatal configuration error before any call.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
const DEFAULT_OUTPUT_DIR: &str = "output";
const DEFAULT_ASPECT_RATIO: &str = "1:1";
/// Guidelines file picked up automatically when nothing else is configured.
const DEFAULT_GUIDELINES_FILE: &str = "brand_guidelines.txt";
const DEFAULT_CONFIG_FILE: &str = "postforge.toml";

const ENV_API_KEY: &str = "POSTFORGE_API_KEY";
const ENV_API_KEY_GEMINI: &str = "GEMINI_API_KEY";
const ENV_API_KEY_GOOGLE: &str = "GOOGLE_API_KEY";
const ENV_API_BASE: &str = "POSTFORGE_API_BASE";
const ENV_TEXT_MODEL: &str = "POSTFORGE_TEXT_MODEL";
const ENV_IMAGE_MODEL: &str = "POSTFORGE_IMAGE_MODEL";
const ENV_OUTPUT_DIR: &str = "POSTFORGE_OUTPUT_DIR";
const ENV_ASPECT_RATIO: &str = "POSTFORGE_ASPECT_RATIO";
const ENV_IMAGE_SIZE: &str = "POSTFORGE_IMAGE_SIZE";
const ENV_GUIDELINES: &str = "POSTFORGE_GUIDELINES";

/// Resolution tier accepted by the image model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageSize {
    /// 1024px tier.
    #[default]
    #[serde(rename = "1K")]
    OneK,
    /// 2048px tier.
    #[serde(rename = "2K")]
    TwoK,
    /// 4096px tier.
    #[serde(rename = "4K")]
    FourK,
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneK => write!(f, "1K"),
            Self::TwoK => write!(f, "2K"),
            Self::FourK => write!(f, "4K"),
        }
    }
}

impl FromStr for ImageSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "1K" => Ok(Self::OneK),
            "2K" => Ok(Self::TwoK),
            "4K" => Ok(Self::FourK),
            other => Err(format!("unknown image size '{other}' (expected 1K, 2K or 4K)")),
        }
    }
}

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// API credential, if any source supplied one.
    pub api_key: Option<String>,
    /// Base URL of the generateContent API, no trailing slash.
    pub api_base: String,
    /// Model id used for prompt synthesis.
    pub text_model: String,
    /// Model id used for image rendering.
    pub image_model: String,
    /// Directory receiving images, logs, snapshot and archive.
    pub output_dir: PathBuf,
    /// Aspect ratio forwarded to the image model.
    pub aspect_ratio: String,
    /// Resolution tier forwarded to the image model.
    pub image_size: ImageSize,
    /// Brand guidelines file, when one is configured or discoverable.
    pub guidelines_path: Option<PathBuf>,
}

/// Optional values parsed from the TOML config file.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub text_model: Option<String>,
    pub image_model: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub aspect_ratio: Option<String>,
    pub image_size: Option<ImageSize>,
    pub guidelines: Option<PathBuf>,
}

/// Highest-precedence overrides, typically from CLI flags.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub text_model: Option<String>,
    pub image_model: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub aspect_ratio: Option<String>,
    pub image_size: Option<ImageSize>,
    pub guidelines: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from the file/env/override layers.
    ///
    /// An explicitly named config file must exist and parse; the implicit
    /// `postforge.toml` is used only when present.
    pub fn load(file: Option<&Path>, overrides: ConfigOverrides) -> Result<Self, PipelineError> {
        let file_cfg = match file {
            Some(path) => Self::read_file(path)?,
            None => {
                let implicit = Path::new(DEFAULT_CONFIG_FILE);
                if implicit.exists() {
                    Self::read_file(implicit)?
                } else {
                    ConfigFile::default()
                }
            }
        };
        Ok(Self::resolve(file_cfg, overrides, |name| env::var(name).ok()))
    }

    fn read_file(path: &Path) -> Result<ConfigFile, PipelineError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!("cannot read config file {}: {e}", path.display()))
        })?;
        toml::from_str(&raw).map_err(|e| {
            PipelineError::Configuration(format!(
                "config file {} is not valid TOML: {e}",
                path.display()
            ))
        })
    }

    /// Merge the three layers over the built-in defaults.
    fn resolve(
        file: ConfigFile,
        overrides: ConfigOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let env_value = |name: &str| {
            env(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = overrides
            .api_key
            .or_else(|| env_value(ENV_API_KEY))
            .or_else(|| env_value(ENV_API_KEY_GEMINI))
            .or_else(|| env_value(ENV_API_KEY_GOOGLE))
            .or(file.api_key);

        let api_base = overrides
            .api_base
            .or_else(|| env_value(ENV_API_BASE))
            .or(file.api_base)
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        let text_model = overrides
            .text_model
            .or_else(|| env_value(ENV_TEXT_MODEL))
            .or(file.text_model)
            .unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string());

        let image_model = overrides
            .image_model
            .or_else(|| env_value(ENV_IMAGE_MODEL))
            .or(file.image_model)
            .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string());

        let output_dir = overrides
            .output_dir
            .or_else(|| env_value(ENV_OUTPUT_DIR).map(PathBuf::from))
            .or(file.output_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

        let aspect_ratio = overrides
            .aspect_ratio
            .or_else(|| env_value(ENV_ASPECT_RATIO))
            .or(file.aspect_ratio)
            .unwrap_or_else(|| DEFAULT_ASPECT_RATIO.to_string());

        let image_size = overrides
            .image_size
            .or_else(|| env_value(ENV_IMAGE_SIZE).and_then(|v| v.parse().ok()))
            .or(file.image_size)
            .unwrap_or_default();

        let guidelines_path = overrides
            .guidelines
            .or_else(|| env_value(ENV_GUIDELINES).map(PathBuf::from))
            .or(file.guidelines)
            .or_else(|| {
                let implicit = PathBuf::from(DEFAULT_GUIDELINES_FILE);
                implicit.exists().then_some(implicit)
            });

        Self {
            api_key,
            api_base,
            text_model,
            image_model,
            output_dir,
            aspect_ratio,
            image_size,
            guidelines_path,
        }
    }

    /// The API credential, or a fatal configuration error when none was
    /// supplied by any layer.
    pub fn credential(&self) -> Result<&str, PipelineError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                PipelineError::Configuration(
                    "no API credential configured; set GEMINI_API_KEY (or api_key in the config file)"
                        .into(),
                )
            })
    }
}
