//! HTTP front end: JSON API, voice session flow and the HTML form.

use std::num::NonZeroU16;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};
use tracing::{debug, error, info};

use crate::config::Services;
use crate::constants::{
    ARTIFACTS_ROUTE, MAX_AUDIO_BYTES, MAX_PENDING_AUDIO_BYTES, PENDING_AUDIO_SWEEP_SECONDS,
    SESSION_INACTIVITY_MINUTES,
};
use crate::pipeline::Pipeline;
use crate::providers::{Transcriber, Translator};

use self::pending::PendingAudio;

mod api;
mod pending;
mod prelude;
mod session;
mod views;

#[derive(Clone)]
pub(crate) struct AppState {
    pipeline: Arc<Pipeline>,
    transcriber: Arc<dyn Transcriber>,
    translator: Arc<dyn Translator>,
    target_language: String,
    pending_audio: Arc<PendingAudio>,
}

impl From<&Services> for AppState {
    fn from(services: &Services) -> Self {
        let clip_ttl = Duration::from_secs(SESSION_INACTIVITY_MINUTES.unsigned_abs() * 60);
        Self {
            pipeline: services.pipeline.clone(),
            transcriber: services.transcriber.clone(),
            translator: services.translator.clone(),
            target_language: services.target_language.clone(),
            pending_audio: Arc::new(PendingAudio::new(clip_ttl, MAX_PENDING_AUDIO_BYTES)),
        }
    }
}

fn create_router(artifact_dir: Option<&Path>) -> Router<AppState> {
    let router = Router::new()
        .route("/", get(views::index_handler).post(views::index_post))
        .route("/static/styles.css", get(styles_handler))
        .route(
            "/generate-image-with-logo",
            get(api::generate_get).post(api::generate_post),
        )
        .route("/record-audio", post(api::record_audio))
        .route("/audio-to-text", get(api::audio_to_text))
        .route("/translate-text", get(api::translate_text))
        .route("/voice-to-image", post(api::voice_to_image))
        .route("/qr-code", get(api::qr_code))
        .layer(DefaultBodyLimit::max(MAX_AUDIO_BYTES));

    match artifact_dir {
        Some(dir) => router.nest_service(ARTIFACTS_ROUTE, ServeDir::new(dir)),
        None => router,
    }
}

/// The full application: routes, sessions and CORS.
fn build_app(state: AppState, artifact_dir: Option<&Path>) -> Router {
    let sessions = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            SESSION_INACTIVITY_MINUTES,
        )));

    create_router(artifact_dir)
        .layer(sessions)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Periodically drops recorded clips nobody came back for.
fn spawn_pending_sweep(pending: Arc<PendingAudio>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(PENDING_AUDIO_SWEEP_SECONDS));
        loop {
            interval.tick().await;
            let swept = pending.sweep().await;
            if swept > 0 {
                debug!("Swept {} expired audio clips", swept);
            }
        }
    })
}

async fn styles_handler() -> impl IntoResponse {
    const STYLES: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/static/styles.css"));
    ([(CONTENT_TYPE, "text/css")], STYLES)
}

/// Binds `listen_addr:port` and serves until the process is stopped.
pub async fn setup_server(
    listen_addr: &str,
    port: NonZeroU16,
    services: Services,
) -> Result<(), anyhow::Error> {
    if let Some(dir) = services.artifact_dir.as_deref() {
        tokio::fs::create_dir_all(dir).await?;
        info!("Serving local artifacts from {}", dir.display());
    }
    let state = AppState::from(&services);
    let sweeper = spawn_pending_sweep(state.pending_audio.clone());
    let app = build_app(state, services.artifact_dir.as_deref());

    let addr = format!("{}:{}", listen_addr, port);
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", err);
    }
    sweeper.abort();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::header::{COOKIE, SET_COOKIE};
    use axum::http::{Request, StatusCode};
    use base64::Engine;
    use base64::engine::general_purpose;
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use url::Url;

    use crate::providers::{
        AudioClip, BlobStore, GeneratedArtifact, ImageFetcher, ImageGenerator, ProviderError,
        UploadSource,
    };

    struct FakeGenerator {
        fail: bool,
    }

    #[async_trait]
    impl ImageGenerator for FakeGenerator {
        async fn generate(&self, prompt: &str) -> Result<GeneratedArtifact, ProviderError> {
            if self.fail {
                return Err(ProviderError::Status {
                    status: 400,
                    body: "sk-secret content policy".to_string(),
                });
            }
            Ok(GeneratedArtifact {
                source_prompt: prompt.to_string(),
                revised_prompt: None,
                image_reference: Url::parse("https://images.example.com/gen.png")
                    .expect("valid url"),
                raw_image_bytes: None,
            })
        }
    }

    struct NoFetch;

    #[async_trait]
    impl ImageFetcher for NoFetch {
        async fn fetch(&self, url: &Url) -> Result<Vec<u8>, ProviderError> {
            Err(ProviderError::Transport(format!("unexpected fetch of {url}")))
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        paths: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BlobStore for RecordingStore {
        async fn upload(&self, _source: UploadSource, path: &str) -> Result<String, ProviderError> {
            self.paths
                .lock()
                .expect("store lock")
                .push(path.to_string());
            Ok(format!("https://storage.example.com/bucket/{path}"))
        }
    }

    struct FakeSpeech;

    #[async_trait]
    impl Transcriber for FakeSpeech {
        async fn transcribe(&self, clip: &AudioClip) -> Result<String, ProviderError> {
            assert_eq!(clip.bytes, b"RIFF fake audio".to_vec());
            Ok("un perro en patineta".to_string())
        }
    }

    #[async_trait]
    impl Translator for FakeSpeech {
        async fn translate(&self, text: &str, target_language: &str) -> Result<String, ProviderError> {
            assert_eq!(text, "un perro en patineta");
            Ok(format!("a dog on a skateboard ({target_language})"))
        }
    }

    fn services(fail_generation: bool) -> (Services, Arc<RecordingStore>) {
        let store = Arc::new(RecordingStore::default());
        let pipeline = Pipeline::new(
            Arc::new(FakeGenerator {
                fail: fail_generation,
            }),
            Arc::new(NoFetch),
            store.clone(),
        );
        let services = Services {
            pipeline: Arc::new(pipeline),
            transcriber: Arc::new(FakeSpeech),
            translator: Arc::new(FakeSpeech),
            target_language: "en".to_string(),
            artifact_dir: None,
        };
        (services, store)
    }

    fn app(services: &Services) -> Router {
        build_app(AppState::from(services), services.artifact_dir.as_deref())
    }

    async fn read_body(response: axum::response::Response) -> String {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        String::from_utf8_lossy(&bytes).to_string()
    }

    async fn read_json(response: axum::response::Response) -> serde_json::Value {
        serde_json::from_str(&read_body(response).await).expect("json body")
    }

    fn audio_upload(uri: &str) -> Request<Body> {
        let boundary = "artmindtestboundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"audio\"; filename=\"clip.wav\"\r\nContent-Type: audio/wav\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"RIFF fake audio");
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .expect("request")
    }

    fn get_with_cookie(uri: &str, cookie: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .header(COOKIE, cookie)
            .body(Body::empty())
            .expect("request")
    }

    fn session_cookie(response: &axum::response::Response) -> String {
        response
            .headers()
            .get(SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .expect("session cookie")
            .to_string()
    }

    #[tokio::test]
    async fn generate_returns_urls_and_path() {
        let (services, store) = services(false);
        let app = app(&services);

        let request = Request::builder()
            .method("POST")
            .uri("/generate-image-with-logo")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"prompt": "a red bicycle"}"#))
            .expect("request");
        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let body = read_json(response).await;
        assert_eq!(body["prompt"], "a red bicycle");
        assert_eq!(body["image_url"], "https://images.example.com/gen.png");
        assert_eq!(body["blob_path"], "generated_images/a_red_bicycle.png");
        assert_eq!(
            body["firebase_url"],
            "https://storage.example.com/bucket/generated_images/a_red_bicycle.png"
        );
        assert_eq!(
            *store.paths.lock().expect("store lock"),
            vec!["generated_images/a_red_bicycle.png".to_string()]
        );
    }

    #[tokio::test]
    async fn missing_prompt_is_a_bad_request() {
        let (services, store) = services(false);
        let app = app(&services);

        for body in [r#"{}"#, r#"{"prompt": "   "}"#, "not json"] {
            let request = Request::builder()
                .method("POST")
                .uri("/generate-image-with-logo")
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .expect("request");
            let response = app.clone().oneshot(request).await.expect("response");
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {body}");
            let json = read_json(response).await;
            assert!(json["error"].is_string());
        }
        assert!(store.paths.lock().expect("store lock").is_empty());
    }

    #[tokio::test]
    async fn generation_failure_hides_provider_detail() {
        let (services, store) = services(true);
        let app = app(&services);

        let request = Request::builder()
            .method("GET")
            .uri("/generate-image-with-logo?prompt=a%20cat")
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = read_body(response).await;
        assert!(body.contains("\"error\""));
        assert!(!body.contains("sk-secret"));
        assert!(store.paths.lock().expect("store lock").is_empty());
    }

    #[tokio::test]
    async fn decoupled_voice_flow_uses_the_session() {
        let (services, _store) = services(false);
        let app = app(&services);

        let response = app
            .clone()
            .oneshot(audio_upload("/record-audio"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = session_cookie(&response);
        let body = read_json(response).await;
        assert_eq!(body["file_name"], "clip.wav");
        assert_eq!(body["audio_bytes"], 15);

        let response = app
            .clone()
            .oneshot(get_with_cookie("/audio-to-text", &cookie))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["transcription"], "un perro en patineta");

        let response = app
            .clone()
            .oneshot(get_with_cookie("/translate-text?language=en", &cookie))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            read_json(response).await["translation"],
            "a dog on a skateboard (en)"
        );

        let response = app
            .clone()
            .oneshot(get_with_cookie("/generate-image-with-logo", &cookie))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["prompt"], "a dog on a skateboard (en)");
        assert_eq!(
            body["blob_path"],
            "generated_images/a_dog_on_a_skateboard_en_.png"
        );
    }

    #[tokio::test]
    async fn steps_out_of_order_conflict() {
        let (services, _store) = services(false);
        let app = app(&services);

        for uri in ["/audio-to-text", "/translate-text"] {
            let request = Request::builder()
                .method("GET")
                .uri(uri)
                .body(Body::empty())
                .expect("request");
            let response = app.clone().oneshot(request).await.expect("response");
            assert_eq!(response.status(), StatusCode::CONFLICT, "{uri}");
            assert!(read_json(response).await["error"].is_string());
        }
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let (services, _store) = services(false);
        let app = app(&services);

        let response = app
            .clone()
            .oneshot(audio_upload("/record-audio"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        // a different visitor has recorded nothing
        let request = Request::builder()
            .method("GET")
            .uri("/audio-to-text")
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn voice_to_image_runs_the_whole_chain() {
        let (services, _store) = services(false);
        let app = app(&services);

        let response = app
            .oneshot(audio_upload("/voice-to-image"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["transcription"], "un perro en patineta");
        assert_eq!(body["translation"], "a dog on a skateboard (en)");
        assert_eq!(body["prompt"], "a dog on a skateboard (en)");
        assert!(body["firebase_url"].as_str().is_some());

        let qr = general_purpose::STANDARD
            .decode(body["qr_code_png_base64"].as_str().expect("qr string"))
            .expect("base64");
        assert!(qr.starts_with(b"\x89PNG"));
    }

    #[tokio::test]
    async fn voice_to_image_keeps_no_audio_in_the_session() {
        let (services, _store) = services(false);
        let state = AppState::from(&services);
        let pending = state.pending_audio.clone();
        let app = build_app(state, None);

        let response = app
            .clone()
            .oneshot(audio_upload("/voice-to-image"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = session_cookie(&response);
        assert_eq!(pending.total_bytes().await, 0);

        // the text carried over, the recording did not
        let response = app
            .clone()
            .oneshot(get_with_cookie("/audio-to-text", &cookie))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .oneshot(get_with_cookie("/translate-text?language=fr", &cookie))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            read_json(response).await["translation"],
            "a dog on a skateboard (fr)"
        );
    }

    #[tokio::test]
    async fn recording_again_replaces_the_pending_clip() {
        let (services, _store) = services(false);
        let state = AppState::from(&services);
        let pending = state.pending_audio.clone();
        let app = build_app(state, None);

        let response = app
            .clone()
            .oneshot(audio_upload("/record-audio"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = session_cookie(&response);

        let mut request = audio_upload("/record-audio");
        request.headers_mut().insert(
            COOKIE,
            cookie.parse().expect("cookie header"),
        );
        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(pending.total_bytes().await, 15);
    }

    #[tokio::test]
    async fn qr_code_endpoint_returns_png() {
        let (services, _store) = services(false);
        let app = app(&services);

        let request = Request::builder()
            .method("GET")
            .uri("/qr-code?data=https%3A%2F%2Fexample.com%2Fimg.png")
            .body(Body::empty())
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).expect("content type"),
            "image/png"
        );
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        let img = image::load_from_memory(&bytes).expect("png");
        assert_eq!(img.width(), img.height());

        let request = Request::builder()
            .method("GET")
            .uri("/qr-code")
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn index_form_renders_result_page() {
        let (services, _store) = services(false);
        let app = app(&services);

        let request = Request::builder()
            .method("GET")
            .uri("/")
            .body(Body::empty())
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(read_body(response).await.contains("<form"));

        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("prompt=a+blue+whale"))
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_body(response).await;
        assert!(body.contains(
            "https://storage.example.com/bucket/generated_images/a_blue_whale.png"
        ));
        assert!(body.contains("data:image/png;base64,"));

        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("prompt="))
            .expect("request");
        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(read_body(response).await.contains("A prompt is required"));
    }

    #[tokio::test]
    async fn styles_are_served() {
        let (services, _store) = services(false);
        let app = app(&services);
        let request = Request::builder()
            .method("GET")
            .uri("/static/styles.css")
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).expect("content type"),
            "text/css"
        );
    }

    #[tokio::test]
    async fn local_artifacts_are_served() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("generated_images")).expect("mkdir");
        std::fs::write(dir.path().join("generated_images/cat.png"), b"png bytes").expect("write");

        let (mut services, _store) = services(false);
        services.artifact_dir = Some(dir.path().to_path_buf());
        let app = app(&services);

        let request = Request::builder()
            .method("GET")
            .uri("/artifacts/generated_images/cat.png")
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_body(response).await, "png bytes");
    }
}
