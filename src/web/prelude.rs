pub(crate) use crate::error::ArtmindError;
pub(crate) use crate::web::AppState;
pub(crate) use crate::web::session::VoiceSession;
pub(crate) use askama::Template;
pub(crate) use askama_web::WebTemplate;
pub(crate) use axum::extract::{Form, Multipart, Query, State};
pub(crate) use axum::http::header::CONTENT_TYPE;
pub(crate) use axum::response::{IntoResponse, Response};
pub(crate) use serde::{Deserialize, Serialize};
pub(crate) use tower_sessions::Session;
pub(crate) use tracing::{debug, info};
