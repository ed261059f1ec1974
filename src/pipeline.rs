//! Prompt to stored image: generate, optionally add the logo, name, upload.
//!
//! Every stage waits for the previous one and the first failure ends the
//! run. Nothing is rolled back: an image generated before an upload failure
//! simply stays with the provider.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument};
use url::Url;

use crate::composite::LogoOverlay;
use crate::error::{ErrorKind, PipelineError};
use crate::providers::{BlobStore, ImageFetcher, ImageGenerator, UploadSource};
use crate::sanitize::blob_path_for;

/// Where a pipeline run is (or stopped).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    /// Validating the prompt
    Received,
    /// Waiting on the image generator
    Generating,
    /// Adding the logo
    Compositing,
    /// Building the storage path
    Naming,
    /// Waiting on storage
    Uploading,
    /// Finished
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Generating => "generating",
            Self::Compositing => "compositing",
            Self::Naming => "naming",
            Self::Uploading => "uploading",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// A validated prompt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GenerationRequest {
    prompt: String,
}

impl GenerationRequest {
    /// Rejects blank prompts. The prompt itself is kept as given.
    pub fn new(prompt: &str) -> Result<Self, PipelineError> {
        if prompt.trim().is_empty() {
            return Err(PipelineError::new(
                Stage::Received,
                ErrorKind::InvalidInput,
                "prompt is empty",
            ));
        }
        Ok(Self {
            prompt: prompt.to_string(),
        })
    }

    /// The prompt
    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

/// Where an image ended up.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoredArtifact {
    /// Path inside the store, eg `generated_images/a_cat.png`
    pub blob_path: String,
    /// Publicly retrievable URL
    pub public_url: String,
}

/// Result of a successful run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PipelineOutcome {
    /// Revised prompt if the provider gave one, otherwise the submitted prompt
    pub final_prompt: String,
    /// Image reference returned by the generator
    pub image_url: Url,
    /// The uploaded artifact
    pub stored: StoredArtifact,
}

/// Sequences the generator, optional logo overlay and storage.
///
/// Whether the compositing stage runs is fixed when the pipeline is built.
#[derive(Clone)]
pub struct Pipeline {
    generator: Arc<dyn ImageGenerator>,
    fetcher: Arc<dyn ImageFetcher>,
    store: Arc<dyn BlobStore>,
    overlay: Option<LogoOverlay>,
}

impl Pipeline {
    /// A pipeline without the compositing stage.
    pub fn new(
        generator: Arc<dyn ImageGenerator>,
        fetcher: Arc<dyn ImageFetcher>,
        store: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            generator,
            fetcher,
            store,
            overlay: None,
        }
    }

    /// Enables the compositing stage.
    pub fn with_logo(mut self, overlay: LogoOverlay) -> Self {
        self.overlay = Some(overlay);
        self
    }

    /// True when images get the logo before upload.
    pub fn composites(&self) -> bool {
        self.overlay.is_some()
    }

    /// Runs every stage for `prompt`.
    #[instrument(skip_all, fields(prompt_len = prompt.len(), composite = self.composites()))]
    pub async fn run(&self, prompt: &str) -> Result<PipelineOutcome, PipelineError> {
        let request = GenerationRequest::new(prompt)?;

        debug!("Stage {}", Stage::Generating);
        let artifact = self
            .generator
            .generate(request.prompt())
            .await
            .map_err(|err| PipelineError::from_provider(Stage::Generating, ErrorKind::GenerationFailed, &err))?;

        let source = match &self.overlay {
            Some(overlay) => {
                debug!("Stage {}", Stage::Compositing);
                let base = match &artifact.raw_image_bytes {
                    Some(bytes) => bytes.clone(),
                    None => self.fetcher.fetch(&artifact.image_reference).await.map_err(|err| {
                        PipelineError::from_provider(Stage::Compositing, ErrorKind::CompositeFailed, &err)
                    })?,
                };
                let overlay = overlay.clone();
                let composited = tokio::task::spawn_blocking(move || overlay.apply(&base))
                    .await
                    .map_err(|err| {
                        PipelineError::new(Stage::Compositing, ErrorKind::CompositeFailed, err.to_string())
                    })?
                    .map_err(|err| {
                        PipelineError::new(Stage::Compositing, ErrorKind::CompositeFailed, err.to_string())
                    })?;
                UploadSource::Bytes(composited)
            }
            None => match &artifact.raw_image_bytes {
                Some(bytes) => UploadSource::Bytes(bytes.clone()),
                None => UploadSource::Remote(artifact.image_reference.clone()),
            },
        };

        debug!("Stage {}", Stage::Naming);
        let final_prompt = artifact.final_prompt().to_string();
        let blob_path = blob_path_for(&final_prompt);

        debug!("Stage {}", Stage::Uploading);
        let public_url = self
            .store
            .upload(source, &blob_path)
            .await
            .map_err(|err| PipelineError::from_provider(Stage::Uploading, ErrorKind::UploadFailed, &err))?;

        info!("Stage {}: {blob_path} -> {public_url}", Stage::Done);
        Ok(PipelineOutcome {
            final_prompt,
            image_url: artifact.image_reference,
            stored: StoredArtifact {
                blob_path,
                public_url,
            },
        })
    }
}
