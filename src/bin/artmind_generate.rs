use std::path::PathBuf;

use anyhow::{Context, Result};
use artmind::cli::ProviderOptions;
use artmind::config::{AppConfig, setup_logging};
use artmind::constants::{QR_BORDER_MODULES, QR_BOX_SIZE};
use artmind::providers::AudioClip;
use artmind::qr::render_qr_png;
use clap::{ArgGroup, Parser};
use serde::Serialize;
use tracing::info;

/// Generate one image from a prompt (or a voice recording) and print where
/// it was stored.
///
/// Minimal UX:
///   artmind_generate "a red bicycle" --storage local
#[derive(Parser, Debug)]
#[command(name = "artmind_generate")]
#[command(group(ArgGroup::new("input").required(true).args(["prompt", "audio"])))]
struct Args {
    /// Text prompt
    prompt: Option<String>,

    /// Audio file to transcribe and translate into the prompt instead
    #[arg(long)]
    audio: Option<PathBuf>,

    /// Also write a QR code for the public URL here
    #[arg(long)]
    qr_out: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    #[command(flatten)]
    providers: ProviderOptions,
}

#[derive(Serialize, Debug)]
struct Output {
    #[serde(skip_serializing_if = "Option::is_none")]
    transcription: Option<String>,
    prompt: String,
    image_url: String,
    firebase_url: String,
    blob_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    qr_code: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.debug).map_err(|err| anyhow::anyhow!("{err}"))?;

    let artifact_dir = std::path::absolute(&args.providers.artifact_dir)
        .with_context(|| format!("resolve {}", args.providers.artifact_dir.display()))?;
    let default_public_base = format!("file://{}", artifact_dir.display());
    let services = AppConfig::from_options(&args.providers, &default_public_base)?
        .build()
        .await?;

    let (prompt, transcription) = match (args.prompt, args.audio) {
        (Some(prompt), _) => (prompt, None),
        (None, Some(path)) => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("read {}", path.display()))?;
            let clip = AudioClip {
                file_name: path
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_else(|| "audio.wav".to_string()),
                content_type: None,
                bytes,
            };
            let transcription = services.transcriber.transcribe(&clip).await?;
            info!("Transcribed: {transcription}");
            let translation = services
                .translator
                .translate(&transcription, &services.target_language)
                .await?;
            (translation, Some(transcription))
        }
        (None, None) => anyhow::bail!("either a prompt or --audio is required"),
    };

    let outcome = services.pipeline.run(&prompt).await?;

    let qr_code = match args.qr_out {
        Some(path) => {
            let png = render_qr_png(&outcome.stored.public_url, QR_BOX_SIZE, QR_BORDER_MODULES)?;
            tokio::fs::write(&path, png)
                .await
                .with_context(|| format!("write {}", path.display()))?;
            Some(path)
        }
        None => None,
    };

    let output = Output {
        transcription,
        prompt: outcome.final_prompt,
        image_url: outcome.image_url.to_string(),
        firebase_url: outcome.stored.public_url,
        blob_path: outcome.stored.blob_path,
        qr_code,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
