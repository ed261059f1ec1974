//! Downloads generated images from the URL the provider hands back.

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use super::{ImageFetcher, ProviderError};
use crate::constants::MAX_IMAGE_BYTES;

/// [`ImageFetcher`] over plain HTTP(S).
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpFetcher {
    /// Creates a fetcher sharing `client` (and its timeout).
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            max_bytes: MAX_IMAGE_BYTES,
        }
    }

    /// Overrides the download size limit
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

/// How much of an error body is kept for the log.
const ERROR_BODY_BYTES: usize = 4096;

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, ProviderError> {
        debug!("Downloading image from {}", url.host_str().unwrap_or_default());
        let mut resp = self.client.get(url.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let mut body = Vec::new();
            while body.len() < ERROR_BODY_BYTES
                && let Ok(Some(chunk)) = resp.chunk().await
            {
                body.extend_from_slice(&chunk);
            }
            return Err(ProviderError::status(status, &body));
        }
        if let Some(length) = resp.content_length()
            && length > self.max_bytes as u64
        {
            return Err(ProviderError::InvalidResponse(format!(
                "Image is {length} bytes, limit is {}",
                self.max_bytes
            )));
        }

        // servers may omit the length, so the cap is enforced while reading
        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await? {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(ProviderError::InvalidResponse(format!(
                    "Image is over the {} byte limit",
                    self.max_bytes
                )));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}
