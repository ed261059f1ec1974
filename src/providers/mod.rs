//! Seams for the external services the pipeline talks to, plus the clients
//! that implement them.

use std::fmt;

use async_trait::async_trait;
use url::Url;

pub mod fetch;
pub mod openai;
pub mod storage;

pub use fetch::HttpFetcher;
pub use openai::{OpenAiClient, OpenAiSettings};
pub use storage::{FirebaseStorage, LocalDirStorage, ServiceAccount};

/// Errors returned by provider clients.
#[derive(Debug)]
pub enum ProviderError {
    /// The request never got a response (connect failure, timeout, etc)
    Transport(String),
    /// The provider answered with a non-success status
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, truncated
        body: String,
    },
    /// The response couldn't be understood or was missing data
    InvalidResponse(String),
    /// Credentials couldn't be used to authenticate
    Credentials(String),
    /// Local read/write failure
    Io(String),
}

impl ProviderError {
    /// True when the provider couldn't be reached at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Builds a status error, keeping only the start of the body.
    pub fn status(status: reqwest::StatusCode, body: &[u8]) -> Self {
        const MAX_BODY: usize = 500;
        let body = String::from_utf8_lossy(body);
        let body = match body.char_indices().nth(MAX_BODY) {
            Some((idx, _)) => format!("{}...", &body[..idx]),
            None => body.into_owned(),
        };
        Self::Status {
            status: status.as_u16(),
            body,
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(err) => write!(f, "Provider unreachable: {err}"),
            Self::Status { status, body } => write!(f, "Provider returned {status}: {body}"),
            Self::InvalidResponse(err) => write!(f, "Invalid provider response: {err}"),
            Self::Credentials(err) => write!(f, "Credential error: {err}"),
            Self::Io(err) => write!(f, "IO error: {err}"),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// What the image generator handed back for a prompt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GeneratedArtifact {
    /// Prompt we sent
    pub source_prompt: String,
    /// Prompt the provider says it actually used
    pub revised_prompt: Option<String>,
    /// Where the image can be downloaded from
    pub image_reference: Url,
    /// Image bytes, when the provider returned them inline
    pub raw_image_bytes: Option<Vec<u8>>,
}

impl GeneratedArtifact {
    /// The revised prompt when the provider gave a non-empty one, otherwise the source prompt.
    pub fn final_prompt(&self) -> &str {
        self.revised_prompt
            .as_deref()
            .filter(|revised| !revised.trim().is_empty())
            .unwrap_or(&self.source_prompt)
    }
}

/// A recorded audio clip waiting for transcription.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AudioClip {
    /// Original filename, used to hint the audio format
    pub file_name: String,
    /// MIME type, if the uploader gave one
    pub content_type: Option<String>,
    /// Encoded audio
    pub bytes: Vec<u8>,
}

/// What gets handed to storage: either image bytes we hold, or a remote
/// reference the store has to download itself.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UploadSource {
    /// Bytes held locally
    Bytes(Vec<u8>),
    /// Remote reference to download
    Remote(Url),
}

/// Text-to-image generation.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generates one image for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<GeneratedArtifact, ProviderError>;
}

/// Speech-to-text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribes `clip` to text.
    async fn transcribe(&self, clip: &AudioClip) -> Result<String, ProviderError>;
}

/// Text translation.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translates `text` into `target_language`.
    async fn translate(&self, text: &str, target_language: &str) -> Result<String, ProviderError>;
}

/// Downloads images from remote references.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Fetches the bytes at `url`.
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, ProviderError>;
}

/// Object storage that returns a public URL for each upload.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `source` at `path`, makes it public and returns its public URL.
    async fn upload(&self, source: UploadSource, path: &str) -> Result<String, ProviderError>;
}

/// Turns an [`UploadSource`] into bytes, downloading it if needed.
pub async fn resolve_source(
    source: UploadSource,
    fetcher: &dyn ImageFetcher,
) -> Result<Vec<u8>, ProviderError> {
    match source {
        UploadSource::Bytes(bytes) => Ok(bytes),
        UploadSource::Remote(url) => fetcher.fetch(&url).await,
    }
}
