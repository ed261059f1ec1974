//! JSON endpoints.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use base64::Engine;
use base64::engine::general_purpose;

use super::prelude::*;
use crate::constants::{PNG_CONTENT_TYPE, QR_BORDER_MODULES, QR_BOX_SIZE};
use crate::pipeline::PipelineOutcome;
use crate::providers::AudioClip;
use crate::qr::{QrError, render_qr_png};

#[derive(Deserialize, Debug, Default)]
pub(crate) struct PromptBody {
    #[serde(default)]
    prompt: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct PromptQuery {
    prompt: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct LanguageQuery {
    language: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct QrQuery {
    data: Option<String>,
}

#[derive(Serialize, Debug)]
pub(crate) struct GenerationResponse {
    pub(crate) prompt: String,
    pub(crate) image_url: String,
    pub(crate) firebase_url: String,
    pub(crate) blob_path: String,
}

impl From<PipelineOutcome> for GenerationResponse {
    fn from(outcome: PipelineOutcome) -> Self {
        Self {
            prompt: outcome.final_prompt,
            image_url: outcome.image_url.to_string(),
            firebase_url: outcome.stored.public_url,
            blob_path: outcome.stored.blob_path,
        }
    }
}

#[derive(Serialize, Debug)]
pub(crate) struct RecordedAudio {
    file_name: String,
    audio_bytes: usize,
}

#[derive(Serialize, Debug)]
pub(crate) struct Transcription {
    transcription: String,
}

#[derive(Serialize, Debug)]
pub(crate) struct Translation {
    translation: String,
}

#[derive(Serialize, Debug)]
pub(crate) struct VoiceGenerationResponse {
    transcription: String,
    translation: String,
    #[serde(flatten)]
    generation: GenerationResponse,
    qr_code_png_base64: String,
}

/// Renders a QR PNG off the async runtime.
pub(crate) async fn qr_png(data: String) -> Result<Vec<u8>, ArtmindError> {
    tokio::task::spawn_blocking(move || render_qr_png(&data, QR_BOX_SIZE, QR_BORDER_MODULES))
        .await
        .map_err(|err| ArtmindError::InternalServerError(format!("QR task failed: {err}")))?
        .map_err(|err| match err {
            QrError::Encode(_) => {
                ArtmindError::BadRequest("The data is too long for a QR code.".to_string())
            }
            QrError::Image(err) => ArtmindError::InternalServerError(err.to_string()),
        })
}

/// Pulls the `audio` part (or `file`, as some clients name it) out of a
/// multipart upload.
async fn read_audio(mut multipart: Multipart) -> Result<AudioClip, ArtmindError> {
    while let Some(field) = multipart.next_field().await? {
        if !matches!(field.name(), Some("audio") | Some("file")) {
            continue;
        }
        let file_name = field
            .file_name()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("audio.wav")
            .to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await?;
        if bytes.is_empty() {
            return Err(ArtmindError::BadRequest(
                "The uploaded audio file is empty.".to_string(),
            ));
        }
        return Ok(AudioClip {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
    }
    Err(ArtmindError::BadRequest(
        "An audio file is required in the 'audio' field.".to_string(),
    ))
}

/// handles POST /generate-image-with-logo
pub(crate) async fn generate_post(
    State(state): State<AppState>,
    body: Result<Json<PromptBody>, JsonRejection>,
) -> Result<Json<GenerationResponse>, ArtmindError> {
    let Json(body) = body.map_err(|err| ArtmindError::BadRequest(err.body_text()))?;
    let outcome = state
        .pipeline
        .run(body.prompt.as_deref().unwrap_or_default())
        .await?;
    Ok(Json(outcome.into()))
}

/// handles GET /generate-image-with-logo, falling back to the session's voice prompt
pub(crate) async fn generate_get(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<PromptQuery>,
) -> Result<Json<GenerationResponse>, ArtmindError> {
    let prompt = match query.prompt.filter(|prompt| !prompt.trim().is_empty()) {
        Some(prompt) => prompt,
        None => {
            let voice = VoiceSession::load(&session).await?;
            let prompt = voice.prompt().unwrap_or_default().to_string();
            debug!("Using session prompt ({} chars)", prompt.len());
            prompt
        }
    };
    let outcome = state.pipeline.run(&prompt).await?;
    Ok(Json(outcome.into()))
}

pub(crate) async fn record_audio(
    State(state): State<AppState>,
    session: Session,
    multipart: Multipart,
) -> Result<Json<RecordedAudio>, ArtmindError> {
    let clip = read_audio(multipart).await?;
    info!("Recorded {} ({} bytes)", clip.file_name, clip.bytes.len());
    let response = RecordedAudio {
        file_name: clip.file_name.clone(),
        audio_bytes: clip.bytes.len(),
    };

    let key = state.pending_audio.insert(clip).await;
    let mut voice = VoiceSession::load(&session).await?;
    if let Some(previous) = voice.record(key) {
        state.pending_audio.remove(&previous).await;
    }
    voice.save(&session).await?;
    Ok(Json(response))
}

pub(crate) async fn audio_to_text(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Transcription>, ArtmindError> {
    let mut voice = VoiceSession::load(&session).await?;
    let key = voice
        .audio
        .as_deref()
        .ok_or(ArtmindError::MissingSessionData("recorded audio"))?;
    let clip = state
        .pending_audio
        .get(key)
        .await
        .ok_or(ArtmindError::MissingSessionData("recorded audio"))?;
    let transcription = state.transcriber.transcribe(&clip).await?;

    voice.set_transcription(transcription.clone());
    voice.save(&session).await?;
    Ok(Json(Transcription { transcription }))
}

pub(crate) async fn translate_text(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<LanguageQuery>,
) -> Result<Json<Translation>, ArtmindError> {
    let mut voice = VoiceSession::load(&session).await?;
    let transcription = voice
        .transcription
        .as_deref()
        .ok_or(ArtmindError::MissingSessionData("transcription"))?;
    let language = query
        .language
        .as_deref()
        .map(str::trim)
        .filter(|language| !language.is_empty())
        .unwrap_or(&state.target_language);
    let translation = state.translator.translate(transcription, language).await?;

    voice.translation = Some(translation.clone());
    voice.save(&session).await?;
    Ok(Json(Translation { translation }))
}

/// Record, transcribe, translate, generate and share in one call.
pub(crate) async fn voice_to_image(
    State(state): State<AppState>,
    session: Session,
    multipart: Multipart,
) -> Result<Json<VoiceGenerationResponse>, ArtmindError> {
    let clip = read_audio(multipart).await?;
    let transcription = state.transcriber.transcribe(&clip).await?;
    let translation = state
        .translator
        .translate(&transcription, &state.target_language)
        .await?;

    // the clip was consumed above, later steps only need the text
    let mut voice = VoiceSession::default();
    voice.set_transcription(transcription.clone());
    voice.translation = Some(translation.clone());
    voice.save(&session).await?;

    let outcome = state.pipeline.run(&translation).await?;
    let qr = qr_png(outcome.stored.public_url.clone()).await?;

    Ok(Json(VoiceGenerationResponse {
        transcription,
        translation,
        generation: outcome.into(),
        qr_code_png_base64: general_purpose::STANDARD.encode(qr),
    }))
}

/// handles GET /qr-code?data=
pub(crate) async fn qr_code(Query(query): Query<QrQuery>) -> Result<Response, ArtmindError> {
    let data = query
        .data
        .filter(|data| !data.is_empty())
        .ok_or_else(|| ArtmindError::BadRequest("The 'data' parameter is required.".to_string()))?;
    let png = qr_png(data).await?;
    Ok(([(CONTENT_TYPE, PNG_CONTENT_TYPE)], png).into_response())
}
