//! `generateContent` wire client.
//!
//! Speaks the REST surface directly: one POST per call, no retry, no
//! backoff, no client timeout. The credential rides the `key` query
//! parameter. Text calls ask for a JSON response MIME type; image calls ask
//! for the IMAGE response modality and scan the candidates for the first
//! inline payload.
//!
//! Consumers depend on the [`TextModel`] / [`ImageModel`] seam traits, not
//! on this client, so tests can substitute scripted models.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{AppConfig, ImageSize};
use crate::errors::PipelineError;

/// Errors surfaced by the wire client. Single-attempt failures, all of
/// them; callers decide which tier they belong to.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("model returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("model response carried no usable content: {0}")]
    EmptyResponse(String),
    #[error("inline image payload was not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// Decoded inline image payload.
#[derive(Debug, Clone)]
pub struct ImageBytes {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

/// Render-time knobs forwarded to the image model.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub aspect_ratio: String,
    pub image_size: ImageSize,
}

/// Text-generation seam: one JSON-hinted completion plus the diagnostic
/// model listing attached to fatal synthesis errors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn generate_json(&self, prompt: &str) -> Result<String, ModelError>;

    /// Best-effort listing of model identifiers visible to the credential.
    async fn list_models(&self) -> Result<Vec<String>, ModelError>;
}

/// Image-generation seam. `Ok(None)` means the model answered without any
/// inline image part — a defined failure for the caller, not an error here.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageModel: Send + Sync {
    async fn generate_image(
        &self,
        prompt: &str,
        settings: &RenderSettings,
    ) -> Result<Option<ImageBytes>, ModelError>;
}

/// HTTP client bound to one credential and one pair of model ids.
pub struct GeminiClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    text_model: String,
    image_model: String,
}

impl GeminiClient {
    /// Build a client from resolved configuration. Fails fast when no
    /// credential was configured — before any network call.
    pub fn new(config: &AppConfig) -> Result<Self, PipelineError> {
        let api_key = config.credential()?.to_string();
        Ok(Self {
            http: reqwest::Client::new(),
            api_base: config.api_base.clone(),
            api_key,
            text_model: config.text_model.clone(),
            image_model: config.image_model.clone(),
        })
    }

    fn endpoint_for(&self, model: &str) -> String {
        let model = model.trim();
        let model_path = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        config: GenerationConfig,
    ) -> Result<GenerateContentResponse, ModelError> {
        let endpoint = self.endpoint_for(model);
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: config,
        };

        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|source| ModelError::Transport {
                endpoint: endpoint.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|source| ModelError::Transport { endpoint, source })
    }
}

#[async_trait]
impl TextModel for GeminiClient {
    async fn generate_json(&self, prompt: &str) -> Result<String, ModelError> {
        let config = GenerationConfig {
            response_mime_type: Some("application/json"),
            ..GenerationConfig::default()
        };
        let response = self.generate(&self.text_model, prompt, config).await?;
        let text = first_candidate_text(&response);
        if text.is_empty() {
            return Err(ModelError::EmptyResponse(
                "no text parts in first candidate".into(),
            ));
        }
        Ok(text)
    }

    async fn list_models(&self) -> Result<Vec<String>, ModelError> {
        let endpoint = format!("{}/models", self.api_base);
        let response = self
            .http
            .get(&endpoint)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|source| ModelError::Transport {
                endpoint: endpoint.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ModelsResponse = response
            .json()
            .await
            .map_err(|source| ModelError::Transport { endpoint, source })?;
        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }
}

#[async_trait]
impl ImageModel for GeminiClient {
    async fn generate_image(
        &self,
        prompt: &str,
        settings: &RenderSettings,
    ) -> Result<Option<ImageBytes>, ModelError> {
        let config = GenerationConfig {
            response_modalities: Some(vec!["IMAGE"]),
            image_config: Some(ImageConfig {
                aspect_ratio: settings.aspect_ratio.clone(),
                image_size: settings.image_size.to_string(),
            }),
            ..GenerationConfig::default()
        };
        let response = self.generate(&self.image_model, prompt, config).await?;
        first_inline_image(&response)
    }
}

/// Concatenated text parts of the first candidate.
fn first_candidate_text(response: &GenerateContentResponse) -> String {
    response
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

/// Scan all candidates for the first non-empty inline image payload.
fn first_inline_image(
    response: &GenerateContentResponse,
) -> Result<Option<ImageBytes>, ModelError> {
    for candidate in &response.candidates {
        let Some(content) = &candidate.content else {
            continue;
        };
        for part in &content.parts {
            if let Some(inline) = &part.inline_data {
                if inline.data.is_empty() {
                    continue;
                }
                let bytes = BASE64.decode(inline.data.as_bytes())?;
                return Ok(Some(ImageBytes {
                    bytes,
                    mime_type: inline.mime_type.clone(),
                }));
            }
        }
    }
    Ok(None)
}

// ── Wire shapes ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<&'static str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_config: Option<ImageConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageConfig {
    aspect_ratio: String,
    image_size: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, rename = "inlineData", alias = "inline_data")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    #[serde(default, rename = "mimeType", alias = "mime_type")]
    mime_type: Option<String>,
    #[serde(default)]
    data: String,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    name: String,
}
