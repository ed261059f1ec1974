//! Where generated images end up: Firebase (Google Cloud Storage) for real
//! deployments, or a local directory this server exposes itself.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument};
use url::Url;

use super::{BlobStore, ImageFetcher, ProviderError, UploadSource, resolve_source};
use crate::constants::{
    GCS_API_BASE, GCS_PUBLIC_BASE, GCS_SCOPE, GCS_UPLOAD_BASE, GOOGLE_TOKEN_URI, PNG_CONTENT_TYPE,
};

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

/// The parts of a Google service-account key file we need.
#[derive(Clone, Deserialize)]
pub struct ServiceAccount {
    /// Account identity, used as the JWT issuer
    pub client_email: String,
    /// PEM encoded RSA private key
    pub private_key: String,
    /// Where access tokens are minted
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    /// Owning project
    #[serde(default)]
    pub project_id: Option<String>,
}

impl ServiceAccount {
    /// Parses the JSON key blob.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

impl fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .field("project_id", &self.project_id)
            .finish()
    }
}

#[derive(Serialize, Debug)]
struct GrantClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
}

fn parse_url(raw: &str) -> Result<Url, ProviderError> {
    Url::parse(raw).map_err(|err| ProviderError::InvalidResponse(format!("Bad storage url {raw}: {err}")))
}

/// Media upload URL for `path` in `bucket`.
pub fn gcs_upload_url(upload_base: &str, bucket: &str, path: &str) -> Result<Url, ProviderError> {
    let mut url = parse_url(&format!("{}/b/{}/o", upload_base.trim_end_matches('/'), bucket))?;
    url.query_pairs_mut()
        .append_pair("uploadType", "media")
        .append_pair("name", path);
    Ok(url)
}

/// ACL endpoint for the object at `path`; the object name is a single encoded segment.
pub fn gcs_acl_url(api_base: &str, bucket: &str, path: &str) -> Result<Url, ProviderError> {
    let mut url = parse_url(&format!("{}/b/{}/o", api_base.trim_end_matches('/'), bucket))?;
    url.path_segments_mut()
        .map_err(|_| ProviderError::InvalidResponse("Storage api base cannot be a base".to_string()))?
        .push(path)
        .push("acl");
    Ok(url)
}

/// Uploads to a Firebase storage bucket through the Cloud Storage JSON API.
///
/// Each upload mints a fresh access token from the service account, so
/// nothing mutable is shared between requests.
pub struct FirebaseStorage {
    http: reqwest::Client,
    fetcher: Arc<dyn ImageFetcher>,
    bucket: String,
    account: ServiceAccount,
    key: EncodingKey,
    api_base: String,
    upload_base: String,
    public_base: String,
}

impl FirebaseStorage {
    /// Fails if the service account's private key can't be loaded.
    pub fn new(
        http: reqwest::Client,
        fetcher: Arc<dyn ImageFetcher>,
        bucket: impl Into<String>,
        account: ServiceAccount,
    ) -> Result<Self, ProviderError> {
        let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
            .map_err(|err| ProviderError::Credentials(format!("Invalid service account key: {err}")))?;
        Ok(Self {
            http,
            fetcher,
            bucket: bucket.into(),
            account,
            key,
            api_base: GCS_API_BASE.to_string(),
            upload_base: GCS_UPLOAD_BASE.to_string(),
            public_base: GCS_PUBLIC_BASE.to_string(),
        })
    }

    /// Points the client at different endpoints, eg the storage emulator.
    pub fn with_endpoints(
        mut self,
        api_base: impl Into<String>,
        upload_base: impl Into<String>,
        public_base: impl Into<String>,
    ) -> Self {
        self.api_base = api_base.into();
        self.upload_base = upload_base.into();
        self.public_base = public_base.into();
        self
    }

    /// Bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Public URL of the object at `path`.
    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.public_base.trim_end_matches('/'),
            self.bucket,
            path
        )
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        let iat = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|err| ProviderError::Credentials(err.to_string()))?
            .as_secs();
        let claims = GrantClaims {
            iss: &self.account.client_email,
            scope: GCS_SCOPE,
            aud: &self.account.token_uri,
            iat,
            exp: iat + 3600,
        };
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|err| ProviderError::Credentials(err.to_string()))?;
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer")
            .append_pair("assertion", &assertion)
            .finish();

        let resp = self
            .http
            .post(self.account.token_uri.as_str())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            return Err(ProviderError::status(status, &bytes));
        }
        let token: TokenResponse = serde_json::from_slice(&bytes)
            .map_err(|err| ProviderError::InvalidResponse(format!("Failed to parse token response: {err}")))?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl BlobStore for FirebaseStorage {
    #[instrument(skip_all, fields(bucket = %self.bucket, path = %path))]
    async fn upload(&self, source: UploadSource, path: &str) -> Result<String, ProviderError> {
        let bytes = resolve_source(source, self.fetcher.as_ref()).await?;
        let token = self.access_token().await?;

        let resp = self
            .http
            .post(gcs_upload_url(&self.upload_base, &self.bucket, path)?)
            .bearer_auth(&token)
            .header(CONTENT_TYPE, PNG_CONTENT_TYPE)
            .body(bytes)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.bytes().await?;
            return Err(ProviderError::status(status, &body));
        }
        debug!("Uploaded {path}, granting public read");

        let resp = self
            .http
            .post(gcs_acl_url(&self.api_base, &self.bucket, path)?)
            .bearer_auth(&token)
            .json(&json!({"entity": "allUsers", "role": "READER"}))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.bytes().await?;
            return Err(ProviderError::status(status, &body));
        }

        let public_url = self.public_url(path);
        info!("Stored {public_url}");
        Ok(public_url)
    }
}

/// Stores artifacts in a directory and hands out URLs under `public_base`.
#[derive(Clone)]
pub struct LocalDirStorage {
    root: PathBuf,
    public_base: String,
    fetcher: Arc<dyn ImageFetcher>,
}

impl LocalDirStorage {
    /// `public_base` is the URL `root` is served at.
    pub fn new(
        root: impl Into<PathBuf>,
        public_base: impl Into<String>,
        fetcher: Arc<dyn ImageFetcher>,
    ) -> Self {
        Self {
            root: root.into(),
            public_base: public_base.into(),
            fetcher,
        }
    }

    /// Directory artifacts are written to
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn target_path(&self, path: &str) -> Result<PathBuf, ProviderError> {
        let relative = Path::new(path);
        let contained = !path.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !contained {
            return Err(ProviderError::Io(format!(
                "Refusing to store outside the artifact directory: {path}"
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalDirStorage {
    async fn upload(&self, source: UploadSource, path: &str) -> Result<String, ProviderError> {
        let target = self.target_path(path)?;
        let bytes = resolve_source(source, self.fetcher.as_ref()).await?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        info!("Stored {}", target.display());
        Ok(format!("{}/{}", self.public_base.trim_end_matches('/'), path))
    }
}
