//! CLI parser
use clap::{Args, Parser};
use std::num::NonZeroU16;
use std::path::PathBuf;

use crate::composite::LogoMode;
use crate::config::StorageBackend;
use crate::constants::{DEFAULT_REQUEST_TIMEOUT_SECONDS, DEFAULT_TARGET_LANGUAGE};
use crate::providers::openai::DEFAULT_BASE_URL;

#[derive(Parser, Debug)]
/// CLI Options
pub struct CliOptions {
    #[clap(long, help = "Enable debug logging", env = "ARTMIND_DEBUG")]
    /// Enable debug logging. Env: ARTMIND_DEBUG
    pub debug: bool,
    #[clap(long, short, default_value = "9000", env = "ARTMIND_PORT")]
    /// http listener, defaults to `9000`.
    /// Env: ARTMIND_PORT
    pub port: NonZeroU16,
    #[clap(
        long,
        short,
        default_value = "127.0.0.1",
        env = "ARTMIND_LISTEN_ADDRESS"
    )]
    /// Listen address, defaults to `127.0.0.1`.
    /// Env: ARTMIND_LISTEN_ADDRESS
    pub listen_address: String,

    #[command(flatten)]
    /// Provider, storage and logo settings
    pub providers: ProviderOptions,
}

/// Settings shared by the server and the one-shot generator.
#[derive(Args, Debug, Clone)]
pub struct ProviderOptions {
    /// OpenAI API key. Env: OPENAI_API_KEY
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: String,

    /// OpenAI API root, override for proxies or tests
    #[arg(long, default_value = DEFAULT_BASE_URL, env = "OPENAI_BASE_URL")]
    pub openai_base_url: String,

    /// Image model
    #[arg(long, default_value = "dall-e-3", env = "ARTMIND_IMAGE_MODEL")]
    pub image_model: String,

    /// Image size requested from the generator
    #[arg(long, default_value = "1024x1024", env = "ARTMIND_IMAGE_SIZE")]
    pub image_size: String,

    /// Speech-to-text model
    #[arg(long, default_value = "whisper-1", env = "ARTMIND_TRANSCRIPTION_MODEL")]
    pub transcription_model: String,

    /// Chat model used for translation
    #[arg(long, default_value = "gpt-3.5-turbo", env = "ARTMIND_TRANSLATION_MODEL")]
    pub translation_model: String,

    /// Language voice prompts are translated to
    #[arg(long, default_value = DEFAULT_TARGET_LANGUAGE, env = "ARTMIND_TARGET_LANGUAGE")]
    pub target_language: String,

    /// Where images are stored: firebase or local
    #[arg(long, default_value_t = StorageBackend::Firebase, env = "ARTMIND_STORAGE")]
    pub storage: StorageBackend,

    /// Firebase storage bucket, eg `my-project.appspot.com`
    #[arg(long, env = "FIREBASE_STORAGE_BUCKET")]
    pub storage_bucket: Option<String>,

    /// Firebase service account JSON. Env: FIREBASE_ADMIN_SDK
    #[arg(long, env = "FIREBASE_ADMIN_SDK", hide_env_values = true)]
    pub firebase_credentials: Option<String>,

    /// Directory used by local storage
    #[arg(long, default_value = "./artifacts", env = "ARTMIND_ARTIFACT_DIR")]
    pub artifact_dir: PathBuf,

    /// URL the local artifact directory is reachable at
    #[arg(long, env = "ARTMIND_PUBLIC_BASE_URL")]
    pub public_base_url: Option<String>,

    /// Logo to overlay on generated images; no logo means no compositing
    #[arg(long, env = "ARTMIND_LOGO_PATH")]
    pub logo_path: Option<PathBuf>,

    /// fixed-size or scaled-to-fifth
    #[arg(long, default_value_t = LogoMode::FixedSize, env = "ARTMIND_LOGO_MODE")]
    pub logo_mode: LogoMode,

    /// Timeout for each remote call, in seconds
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECONDS, env = "ARTMIND_REQUEST_TIMEOUT")]
    pub request_timeout: u64,
}
