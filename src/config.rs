//! Config handling

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing::log::LevelFilter;

use crate::cli::ProviderOptions;
use crate::composite::{CompositeError, LogoAsset, LogoMode, LogoOverlay};
use crate::pipeline::Pipeline;
use crate::providers::{
    BlobStore, FirebaseStorage, HttpFetcher, ImageFetcher, LocalDirStorage, OpenAiClient,
    OpenAiSettings, ServiceAccount, Transcriber, Translator,
};

/// Sets up logging based on the debug flag
pub fn setup_logging(debug: bool) -> Result<(), Box<std::io::Error>> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut logger = simple_logger::SimpleLogger::new().with_level(level);
    if !debug {
        logger = logger
            .with_module_level("tracing", LevelFilter::Warn)
            .with_module_level("rustls", LevelFilter::Info)
            .with_module_level("hyper_util", LevelFilter::Info)
            .with_module_level("reqwest", LevelFilter::Info)
            .with_module_level("tower_sessions", LevelFilter::Warn)
            .with_module_level("h2", LevelFilter::Info);
    }
    logger.init().map_err(|err| {
        eprintln!("Failed to initialize logger: {}", err);
        Box::new(std::io::Error::other(err))
    })
}

/// Where generated images end up.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StorageBackend {
    /// Firebase / Google Cloud Storage bucket, objects made public
    Firebase,
    /// A local directory, served by the web app
    Local,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firebase" | "gcs" => Ok(Self::Firebase),
            "local" => Ok(Self::Local),
            other => Err(format!(
                "Unknown storage backend '{other}', expected firebase or local"
            )),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Firebase => f.write_str("firebase"),
            Self::Local => f.write_str("local"),
        }
    }
}

/// Startup configuration problems. All of these are fatal.
#[derive(Debug)]
pub enum ConfigError {
    /// A required setting is unset or blank
    Missing(&'static str),
    /// The Firebase service account couldn't be used
    InvalidCredentials(String),
    /// The logo couldn't be loaded
    Logo(CompositeError),
    /// The HTTP client couldn't be built
    HttpClient(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(what) => write!(f, "Missing required setting: {what}"),
            Self::InvalidCredentials(message) => {
                write!(f, "Invalid Firebase credentials: {message}")
            }
            Self::Logo(err) => write!(f, "Failed to load logo: {err}"),
            Self::HttpClient(message) => write!(f, "Failed to build HTTP client: {message}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Storage settings, validated.
#[derive(Clone, Debug)]
pub enum StorageConfig {
    /// Upload to a Firebase bucket
    Firebase {
        /// Bucket name
        bucket: String,
        /// Parsed service account
        account: ServiceAccount,
    },
    /// Write into a local directory
    Local {
        /// Target directory
        dir: PathBuf,
        /// URL the directory is reachable at
        public_base: String,
    },
}

/// Everything needed to construct the providers, checked up front so
/// a misconfigured process fails at startup instead of on first request.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// OpenAI models and credentials
    pub openai: OpenAiSettings,
    /// Storage backend
    pub storage: StorageConfig,
    /// Logo file and placement mode, if compositing is enabled
    pub logo: Option<(PathBuf, LogoMode)>,
    /// Language voice prompts are translated to
    pub target_language: String,
    /// Per-request timeout for remote calls
    pub request_timeout: Duration,
}

fn required(value: Option<&str>, name: &'static str) -> Result<String, ConfigError> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or(ConfigError::Missing(name))
}

impl AppConfig {
    /// Validates `options`. `default_public_base` is used for local storage
    /// when no public base URL was given.
    pub fn from_options(
        options: &ProviderOptions,
        default_public_base: &str,
    ) -> Result<Self, ConfigError> {
        let api_key = required(Some(options.openai_api_key.as_str()), "OPENAI_API_KEY")?;
        let mut openai = OpenAiSettings::new(api_key);
        openai.base_url = options.openai_base_url.clone();
        openai.image_model = options.image_model.clone();
        openai.image_size = options.image_size.clone();
        openai.transcription_model = options.transcription_model.clone();
        openai.translation_model = options.translation_model.clone();

        let storage = match options.storage {
            StorageBackend::Firebase => {
                let bucket = required(options.storage_bucket.as_deref(), "FIREBASE_STORAGE_BUCKET")?;
                let raw = required(options.firebase_credentials.as_deref(), "FIREBASE_ADMIN_SDK")?;
                let account = ServiceAccount::from_json(&raw)
                    .map_err(|err| ConfigError::InvalidCredentials(err.to_string()))?;
                StorageConfig::Firebase { bucket, account }
            }
            StorageBackend::Local => StorageConfig::Local {
                dir: options.artifact_dir.clone(),
                public_base: options
                    .public_base_url
                    .as_deref()
                    .unwrap_or(default_public_base)
                    .trim_end_matches('/')
                    .to_string(),
            },
        };

        Ok(Self {
            openai,
            storage,
            logo: options
                .logo_path
                .clone()
                .map(|path| (path, options.logo_mode)),
            target_language: options.target_language.trim().to_string(),
            request_timeout: Duration::from_secs(options.request_timeout.max(1)),
        })
    }

    /// Builds the HTTP client and every provider, loading the logo if one
    /// is configured.
    pub async fn build(self) -> Result<Services, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .user_agent(concat!("artmind/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| ConfigError::HttpClient(err.to_string()))?;

        let fetcher: Arc<dyn ImageFetcher> = Arc::new(HttpFetcher::new(http.clone()));
        let openai = Arc::new(OpenAiClient::new(http.clone(), self.openai));

        let (store, artifact_dir): (Arc<dyn BlobStore>, Option<PathBuf>) = match self.storage {
            StorageConfig::Firebase { bucket, account } => {
                info!("Storing images in Firebase bucket {bucket}");
                let storage = FirebaseStorage::new(http, fetcher.clone(), bucket, account)
                    .map_err(|err| ConfigError::InvalidCredentials(err.to_string()))?;
                (Arc::new(storage) as Arc<dyn BlobStore>, None)
            }
            StorageConfig::Local { dir, public_base } => {
                info!("Storing images in {} served at {public_base}", dir.display());
                let storage = LocalDirStorage::new(dir.clone(), public_base, fetcher.clone());
                (Arc::new(storage) as Arc<dyn BlobStore>, Some(dir))
            }
        };

        let mut pipeline = Pipeline::new(openai.clone(), fetcher, store);
        if let Some((path, mode)) = self.logo {
            let asset = LogoAsset::load(&path).await.map_err(ConfigError::Logo)?;
            let (width, height) = asset.dimensions();
            info!(
                "Compositing logo {} ({width}x{height}, {mode})",
                path.display()
            );
            pipeline = pipeline.with_logo(LogoOverlay::new(asset, mode));
        }

        Ok(Services {
            pipeline: Arc::new(pipeline),
            transcriber: openai.clone(),
            translator: openai,
            target_language: self.target_language,
            artifact_dir,
        })
    }
}

/// The constructed providers shared by the server and the one-shot binary.
#[derive(Clone)]
pub struct Services {
    /// Image pipeline
    pub pipeline: Arc<Pipeline>,
    /// Speech to text
    pub transcriber: Arc<dyn Transcriber>,
    /// Text translation
    pub translator: Arc<dyn Translator>,
    /// Language voice prompts are translated to
    pub target_language: String,
    /// Set when images are written locally and should be served
    pub artifact_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::CliOptions;
    use clap::Parser;

    fn parse(extra: &[&str]) -> ProviderOptions {
        let mut args = vec!["artmind", "--openai-api-key", "sk-test"];
        args.extend_from_slice(extra);
        CliOptions::try_parse_from(args)
            .expect("parse options")
            .providers
    }

    #[test]
    fn storage_backend_parses() {
        assert_eq!(
            "firebase".parse::<StorageBackend>(),
            Ok(StorageBackend::Firebase)
        );
        assert_eq!(" Local ".parse::<StorageBackend>(), Ok(StorageBackend::Local));
        assert!("s3".parse::<StorageBackend>().is_err());
        assert_eq!(StorageBackend::Local.to_string(), "local");
    }

    #[test]
    fn local_storage_uses_default_public_base() {
        let options = parse(&["--storage", "local", "--artifact-dir", "/tmp/art"]);
        let config =
            AppConfig::from_options(&options, "http://127.0.0.1:9000/artifacts/").expect("config");
        match config.storage {
            StorageConfig::Local { dir, public_base } => {
                assert_eq!(dir, PathBuf::from("/tmp/art"));
                assert_eq!(public_base, "http://127.0.0.1:9000/artifacts");
            }
            other => panic!("unexpected storage {other:?}"),
        }
        assert!(config.logo.is_none());
        assert_eq!(config.openai.api_key, "sk-test");
    }

    #[test]
    fn blank_api_key_is_rejected() {
        let options = CliOptions::try_parse_from([
            "artmind",
            "--openai-api-key",
            "  ",
            "--storage",
            "local",
        ])
        .expect("parse options")
        .providers;
        assert!(matches!(
            AppConfig::from_options(&options, "http://localhost"),
            Err(ConfigError::Missing("OPENAI_API_KEY"))
        ));
    }

    #[test]
    fn firebase_requires_bucket_and_credentials() {
        let options = parse(&[
            "--storage",
            "firebase",
            "--storage-bucket",
            "demo.appspot.com",
            "--firebase-credentials",
            "{not json",
        ]);
        assert!(matches!(
            AppConfig::from_options(&options, "http://localhost"),
            Err(ConfigError::InvalidCredentials(_))
        ));

        let mut options = options;
        options.storage_bucket = None;
        assert!(matches!(
            AppConfig::from_options(&options, "http://localhost"),
            Err(ConfigError::Missing("FIREBASE_STORAGE_BUCKET"))
        ));
    }

    #[test]
    fn logo_settings_are_carried() {
        let options = parse(&[
            "--storage",
            "local",
            "--logo-path",
            "assets/logo.png",
            "--logo-mode",
            "scaled-to-fifth",
        ]);
        let config = AppConfig::from_options(&options, "http://localhost").expect("config");
        assert_eq!(
            config.logo,
            Some((PathBuf::from("assets/logo.png"), LogoMode::ScaledToFifth))
        );
    }

    #[tokio::test]
    async fn missing_logo_fails_build() {
        let options = parse(&[
            "--storage",
            "local",
            "--logo-path",
            "/definitely/not/here/logo.png",
        ]);
        let config = AppConfig::from_options(&options, "http://localhost").expect("config");
        assert!(matches!(config.build().await, Err(ConfigError::Logo(_))));
    }
}
