//! Shared constants/setters for things
//!

/// Storage folder every generated image lands in
pub const GENERATED_IMAGES_PREFIX: &str = "generated_images";

/// Content type of everything we upload
pub const PNG_CONTENT_TYPE: &str = "image/png";

/// Default timeout for a single remote call, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 120;

/// Largest image we'll download from a provider reference.
pub const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

/// Largest audio upload accepted.
pub const MAX_AUDIO_BYTES: usize = 10 * 1024 * 1024;

/// Total bytes of recorded clips held between `/record-audio` and
/// `/audio-to-text`, across every visitor.
pub const MAX_PENDING_AUDIO_BYTES: usize = 256 * 1024 * 1024;

/// How often expired recorded clips are swept, in seconds.
pub const PENDING_AUDIO_SWEEP_SECONDS: u64 = 60;

/// Size of each QR module in pixels.
pub const QR_BOX_SIZE: u32 = 10;

/// Quiet zone around the QR code, in modules.
pub const QR_BORDER_MODULES: u32 = 4;

/// Language prompts get translated to before image generation.
pub const DEFAULT_TARGET_LANGUAGE: &str = "en";

/// Session key holding the voice flow state
pub const VOICE_SESSION_KEY: &str = "voice_session";

/// Idle minutes before a voice session expires
pub const SESSION_INACTIVITY_MINUTES: i64 = 30;

/// Where local artifacts are served from
pub const ARTIFACTS_ROUTE: &str = "/artifacts";

/// Public host for Google Cloud Storage objects.
pub const GCS_PUBLIC_BASE: &str = "https://storage.googleapis.com";

/// Google Cloud Storage JSON API base.
pub const GCS_API_BASE: &str = "https://storage.googleapis.com/storage/v1";

/// Google Cloud Storage media upload base.
pub const GCS_UPLOAD_BASE: &str = "https://storage.googleapis.com/upload/storage/v1";

/// OAuth scope needed to write objects and change their ACLs.
pub const GCS_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.full_control";

/// Default OAuth token endpoint for service accounts.
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
