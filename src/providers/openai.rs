//! OpenAI client: DALL·E image generation, whisper transcription and chat
//! completion based translation.

use std::fmt;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use super::{AudioClip, GeneratedArtifact, ImageGenerator, ProviderError, Transcriber, Translator};

/// Default API root
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Models and endpoint used by [`OpenAiClient`].
#[derive(Clone)]
pub struct OpenAiSettings {
    /// Bearer token
    pub api_key: String,
    /// API root, eg `https://api.openai.com/v1`
    pub base_url: String,
    /// Image model, eg `dall-e-3`
    pub image_model: String,
    /// Image size, eg `1024x1024`
    pub image_size: String,
    /// Speech-to-text model
    pub transcription_model: String,
    /// Chat model used for translation
    pub translation_model: String,
}

impl OpenAiSettings {
    /// Settings with the stock models and endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            image_model: "dall-e-3".to_string(),
            image_size: "1024x1024".to_string(),
            transcription_model: "whisper-1".to_string(),
            translation_model: "gpt-3.5-turbo".to_string(),
        }
    }
}

impl fmt::Debug for OpenAiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiSettings")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("image_model", &self.image_model)
            .field("image_size", &self.image_size)
            .field("transcription_model", &self.transcription_model)
            .field("translation_model", &self.translation_model)
            .finish()
    }
}

/// Request body for POST /images/generations
/// Docs: https://platform.openai.com/docs/api-reference/images
#[derive(Serialize, Debug)]
struct ImagesGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
}

#[derive(Deserialize, Debug)]
struct ImagesGenerateResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Deserialize, Debug)]
struct ImageData {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    revised_prompt: Option<String>,
}

#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize, Debug)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize, Debug)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

fn translator_instructions(target_language: &str) -> String {
    format!(
        "You are an expert translator who can translate any text from any language into {target_language}. \
         Reply with the translation only."
    )
}

/// Talks to the OpenAI REST API.
#[derive(Clone, Debug)]
pub struct OpenAiClient {
    http: reqwest::Client,
    settings: OpenAiSettings,
}

impl OpenAiClient {
    /// Creates a client using `http` for transport.
    pub fn new(http: reqwest::Client, settings: OpenAiSettings) -> Self {
        Self { http, settings }
    }

    /// The configured settings
    pub fn settings(&self) -> &OpenAiSettings {
        &self.settings
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    async fn post_json<B: Serialize + Sync, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ProviderError> {
        let resp = self
            .http
            .post(self.endpoint(path))
            .bearer_auth(&self.settings.api_key)
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            debug!("OpenAI {path} returned {status}");
            return Err(ProviderError::status(status, &bytes));
        }
        serde_json::from_slice(&bytes)
            .map_err(|err| ProviderError::InvalidResponse(format!("Failed to parse {path} JSON: {err}")))
    }
}

#[async_trait]
impl ImageGenerator for OpenAiClient {
    #[instrument(skip_all, fields(model = %self.settings.image_model))]
    async fn generate(&self, prompt: &str) -> Result<GeneratedArtifact, ProviderError> {
        let req_body = ImagesGenerateRequest {
            model: &self.settings.image_model,
            prompt,
            n: 1,
            size: &self.settings.image_size,
        };
        let parsed: ImagesGenerateResponse = self.post_json("images/generations", &req_body).await?;

        let first = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No image data returned".to_string()))?;

        if let Some(revised_prompt) = first.revised_prompt.as_deref() {
            debug!("Revised prompt from OpenAI: {revised_prompt}");
        }

        let url = first
            .url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse("Image response missing url".to_string()))?;
        let image_reference = Url::parse(&url)
            .map_err(|err| ProviderError::InvalidResponse(format!("Invalid image url: {err}")))?;

        let raw_image_bytes = first
            .b64_json
            .map(|b64_json| general_purpose::STANDARD.decode(b64_json))
            .transpose()
            .map_err(|err| ProviderError::InvalidResponse(format!("Failed to base64-decode image: {err}")))?;

        Ok(GeneratedArtifact {
            source_prompt: prompt.to_string(),
            revised_prompt: first.revised_prompt,
            image_reference,
            raw_image_bytes,
        })
    }
}

#[async_trait]
impl Transcriber for OpenAiClient {
    #[instrument(skip_all, fields(model = %self.settings.transcription_model, bytes = clip.bytes.len()))]
    async fn transcribe(&self, clip: &AudioClip) -> Result<String, ProviderError> {
        let part = Part::bytes(clip.bytes.clone()).file_name(clip.file_name.clone());
        let part = match clip.content_type.as_deref() {
            Some(content_type) => match part.mime_str(content_type) {
                Ok(part) => part,
                Err(err) => {
                    debug!("Ignoring audio content type {content_type}: {err}");
                    Part::bytes(clip.bytes.clone()).file_name(clip.file_name.clone())
                }
            },
            None => part,
        };
        let form = Form::new()
            .text("model", self.settings.transcription_model.clone())
            .text("response_format", "text")
            .part("file", part);

        let resp = self
            .http
            .post(self.endpoint("audio/transcriptions"))
            .bearer_auth(&self.settings.api_key)
            .multipart(form)
            .send()
            .await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            return Err(ProviderError::status(status, &bytes));
        }
        let text = String::from_utf8_lossy(&bytes).trim().to_string();
        if text.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "Transcription came back empty".to_string(),
            ));
        }
        Ok(text)
    }
}

#[async_trait]
impl Translator for OpenAiClient {
    #[instrument(skip_all, fields(model = %self.settings.translation_model, target = %target_language))]
    async fn translate(&self, text: &str, target_language: &str) -> Result<String, ProviderError> {
        let instructions = translator_instructions(target_language);
        let req_body = ChatRequest {
            model: &self.settings.translation_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &instructions,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
        };
        let parsed: ChatResponse = self.post_json("chat/completions", &req_body).await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse("Translation came back empty".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_handles_trailing_slash() {
        let mut settings = OpenAiSettings::new("sk-test");
        settings.base_url = "http://localhost:1234/v1/".to_string();
        let client = OpenAiClient::new(reqwest::Client::new(), settings);
        assert_eq!(
            client.endpoint("images/generations"),
            "http://localhost:1234/v1/images/generations"
        );
    }

    #[test]
    fn settings_debug_hides_key() {
        let debug = format!("{:?}", OpenAiSettings::new("sk-very-secret"));
        assert!(!debug.contains("sk-very-secret"));
        assert!(debug.contains("dall-e-3"));
    }

    #[test]
    fn image_response_parses_attribute_shape() {
        let parsed: ImagesGenerateResponse = serde_json::from_str(
            r#"{"created": 1, "data": [{"url": "https://x/y.png", "revised_prompt": "a bright red bicycle"}]}"#,
        )
        .expect("parse");
        let first = parsed.data.first().expect("one image");
        assert_eq!(first.url.as_deref(), Some("https://x/y.png"));
        assert_eq!(first.revised_prompt.as_deref(), Some("a bright red bicycle"));
        assert!(first.b64_json.is_none());
    }

    #[test]
    fn translator_prompt_names_language() {
        assert!(translator_instructions("en").contains("into en"));
    }
}
