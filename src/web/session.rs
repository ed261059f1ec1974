//! Per-visitor state for the decoupled voice flow.
//!
//! `/record-audio`, `/audio-to-text`, `/translate-text` and a prompt-less
//! `/generate-image-with-logo` each read what the previous step left in the
//! visitor's session, so concurrent visitors never see each other's data.
//! Only small values live here: the recorded audio itself stays in
//! `PendingAudio` and the session keeps its key.

use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::constants::VOICE_SESSION_KEY;
use crate::error::ArtmindError;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub(crate) struct VoiceSession {
    /// Key of the recording in the pending audio store
    pub(crate) audio: Option<String>,
    pub(crate) transcription: Option<String>,
    pub(crate) translation: Option<String>,
}

impl VoiceSession {
    pub(crate) async fn load(session: &Session) -> Result<Self, ArtmindError> {
        Ok(session
            .get::<Self>(VOICE_SESSION_KEY)
            .await?
            .unwrap_or_default())
    }

    pub(crate) async fn save(&self, session: &Session) -> Result<(), ArtmindError> {
        session.insert(VOICE_SESSION_KEY, self).await?;
        Ok(())
    }

    /// A new recording invalidates anything derived from the previous one.
    /// Returns the key of the recording it replaces.
    pub(crate) fn record(&mut self, clip_key: String) -> Option<String> {
        let previous = self.audio.replace(clip_key);
        self.transcription = None;
        self.translation = None;
        previous
    }

    pub(crate) fn set_transcription(&mut self, text: String) {
        self.transcription = Some(text);
        self.translation = None;
    }

    /// Translation wins over the raw transcription.
    pub(crate) fn prompt(&self) -> Option<&str> {
        self.translation
            .as_deref()
            .or(self.transcription.as_deref())
    }
}
