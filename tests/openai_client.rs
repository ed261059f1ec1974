use artmind::providers::{
    AudioClip, ImageGenerator, OpenAiClient, OpenAiSettings, ProviderError, Transcriber,
    Translator,
};
use axum::Json;
use axum::Router;
use axum::extract::Multipart;
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::routing::post;
use serde_json::{Value, json};

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("mock server");
    });
    format!("http://{addr}/v1")
}

fn client(base_url: String) -> OpenAiClient {
    let mut settings = OpenAiSettings::new("sk-test");
    settings.base_url = base_url;
    OpenAiClient::new(reqwest::Client::new(), settings)
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        == Some("Bearer sk-test")
}

async fn images(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
    }
    assert_eq!(body["model"], "dall-e-3");
    assert_eq!(body["n"], 1);
    assert_eq!(body["size"], "1024x1024");
    (
        StatusCode::OK,
        Json(json!({
            "created": 1,
            "data": [{
                "url": "https://images.example.com/abc.png",
                "revised_prompt": format!("{}, watercolor", body["prompt"].as_str().unwrap_or_default()),
            }]
        })),
    )
}

async fn transcriptions(headers: HeaderMap, mut multipart: Multipart) -> (StatusCode, String) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "bad key".to_string());
    }
    let mut seen = Vec::new();
    while let Some(field) = multipart.next_field().await.expect("field") {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            assert_eq!(field.file_name(), Some("clip.webm"));
            assert_eq!(field.bytes().await.expect("bytes").as_ref(), b"voice");
        } else if name == "model" {
            assert_eq!(field.text().await.expect("text"), "whisper-1");
        }
        seen.push(name);
    }
    assert!(seen.contains(&"file".to_string()));
    (StatusCode::OK, "hola mundo\n".to_string())
}

async fn chat(Json(body): Json<Value>) -> Json<Value> {
    assert_eq!(body["messages"][0]["role"], "system");
    assert!(
        body["messages"][0]["content"]
            .as_str()
            .unwrap_or_default()
            .contains("into fr")
    );
    assert_eq!(body["messages"][1]["content"], "hola mundo");
    Json(json!({
        "choices": [{"message": {"role": "assistant", "content": "  bonjour le monde \n"}}]
    }))
}

fn openai_router() -> Router {
    Router::new()
        .route("/v1/images/generations", post(images))
        .route("/v1/audio/transcriptions", post(transcriptions))
        .route("/v1/chat/completions", post(chat))
}

#[tokio::test]
async fn generates_image_with_revised_prompt() {
    let base = spawn(openai_router()).await;
    let artifact = client(base)
        .generate("a red bicycle")
        .await
        .expect("generate");

    assert_eq!(artifact.source_prompt, "a red bicycle");
    assert_eq!(artifact.final_prompt(), "a red bicycle, watercolor");
    assert_eq!(
        artifact.image_reference.as_str(),
        "https://images.example.com/abc.png"
    );
    assert!(artifact.raw_image_bytes.is_none());
}

#[tokio::test]
async fn transcribes_and_translates() {
    let base = spawn(openai_router()).await;
    let client = client(base);

    let clip = AudioClip {
        file_name: "clip.webm".to_string(),
        content_type: Some("audio/webm".to_string()),
        bytes: b"voice".to_vec(),
    };
    let text = client.transcribe(&clip).await.expect("transcribe");
    assert_eq!(text, "hola mundo");

    let translated = client.translate(&text, "fr").await.expect("translate");
    assert_eq!(translated, "bonjour le monde");
}

#[tokio::test]
async fn error_status_is_reported_with_body() {
    let router = Router::new().route(
        "/v1/images/generations",
        post(|| async {
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({"error": {"message": "Rate limit reached"}})),
            )
        }),
    );
    let base = spawn(router).await;

    match client(base).generate("a cat").await {
        Err(ProviderError::Status { status, body }) => {
            assert_eq!(status, 429);
            assert!(body.contains("Rate limit reached"));
        }
        other => panic!("expected a status error, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_image_url_is_invalid() {
    let router = Router::new().route(
        "/v1/images/generations",
        post(|| async { Json(json!({"data": [{"revised_prompt": "nothing here"}]})) }),
    );
    let base = spawn(router).await;

    let err = client(base).generate("a cat").await.expect_err("no url");
    assert!(matches!(err, ProviderError::InvalidResponse(_)), "{err:?}");
}

#[tokio::test]
async fn unreachable_provider_is_a_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let err = client(format!("http://{addr}/v1"))
        .generate("a cat")
        .await
        .expect_err("nothing listening");
    assert!(err.is_transport(), "{err:?}");
}
