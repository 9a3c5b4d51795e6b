//! The Gemini client against a local stand-in for the `generateContent` API.

use std::sync::Arc;

use axum::{
    Json, Router,
    http::{HeaderMap, StatusCode, Uri},
};
use image_authenticity::{
    error::DetectorError,
    judge::{GeminiLoader, InlineImage, Judge, JudgeRequest},
    resource::ResourceLoader,
    verdict::{Label, normalize_judgment, parse_judgment},
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;

#[derive(Default)]
struct Captured {
    uri: Option<String>,
    api_key: Option<String>,
    body: Option<Value>,
}

async fn mock_gemini(status: StatusCode, reply: Value) -> (String, Arc<Mutex<Captured>>) {
    let captured = Arc::new(Mutex::new(Captured::default()));
    let sink = Arc::clone(&captured);

    let app = Router::new().fallback(move |uri: Uri, headers: HeaderMap, Json(body): Json<Value>| {
        let sink = Arc::clone(&sink);
        let reply = reply.clone();
        async move {
            let mut captured = sink.lock();
            captured.uri = Some(uri.to_string());
            captured.api_key = headers
                .get("x-goog-api-key")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            captured.body = Some(body);
            (status, Json(reply))
        }
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), captured)
}

fn loader(endpoint: String, key_var: &str) -> GeminiLoader {
    GeminiLoader {
        endpoint,
        model: "test-model".into(),
        api_key_var: key_var.into(),
        timeout: None,
    }
}

fn request() -> JudgeRequest {
    JudgeRequest {
        prompt: "Is it REAL or FAKE?".into(),
        images: vec![
            InlineImage::new("image/png", vec![1, 2, 3]),
            InlineImage::new("image/jpeg", vec![4, 5, 6]),
        ],
    }
}

#[tokio::test]
async fn test_generate_content_roundtrip() {
    const KEY_VAR: &str = "IMAGE_AUTHENTICITY_TEST_KEY_ROUNDTRIP";
    // SAFETY: the variable name is unique to this test.
    unsafe { std::env::set_var(KEY_VAR, "secret-key") };

    let reply = json!({
        "candidates": [{
            "content": {"parts": [{"text": "```json\n{\"final_verdict\": "}, {"text": "\"REAL\"}\n```"}]}
        }]
    });
    let (endpoint, captured) = mock_gemini(StatusCode::OK, reply).await;

    let judge = loader(endpoint, KEY_VAR).load().unwrap();
    let text = judge.judge(request()).await.unwrap();
    assert_eq!(normalize_judgment(&parse_judgment(&text)).label, Label::Authentic);

    let captured = captured.lock();
    assert_eq!(
        captured.uri.as_deref(),
        Some("/v1beta/models/test-model:generateContent")
    );
    assert_eq!(captured.api_key.as_deref(), Some("secret-key"));

    let parts = &captured.body.as_ref().unwrap()["contents"][0]["parts"];
    assert_eq!(parts[0]["text"], "Is it REAL or FAKE?");
    assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
    assert_eq!(parts[1]["inlineData"]["data"], "AQID");
    assert_eq!(parts[2]["inlineData"]["mimeType"], "image/jpeg");
}

#[tokio::test]
async fn test_api_error_is_external_service_error() {
    const KEY_VAR: &str = "IMAGE_AUTHENTICITY_TEST_KEY_API_ERROR";
    // SAFETY: the variable name is unique to this test.
    unsafe { std::env::set_var(KEY_VAR, "secret-key") };

    let (endpoint, _) = mock_gemini(
        StatusCode::TOO_MANY_REQUESTS,
        json!({"error": {"message": "quota"}}),
    )
    .await;

    let judge = loader(endpoint, KEY_VAR).load().unwrap();
    let err = judge.judge(request()).await.unwrap_err();

    assert!(matches!(err, DetectorError::ExternalService(_)));
    assert!(err.to_string().contains("429"));
}

#[tokio::test]
async fn test_empty_candidates_is_an_error() {
    const KEY_VAR: &str = "IMAGE_AUTHENTICITY_TEST_KEY_EMPTY";
    // SAFETY: the variable name is unique to this test.
    unsafe { std::env::set_var(KEY_VAR, "secret-key") };

    let (endpoint, _) = mock_gemini(StatusCode::OK, json!({"candidates": []})).await;

    let judge = loader(endpoint, KEY_VAR).load().unwrap();
    let err = judge.judge(request()).await.unwrap_err();
    assert!(matches!(err, DetectorError::ExternalService(_)));
}

#[tokio::test]
async fn test_missing_key_never_reaches_the_service() {
    let (endpoint, captured) = mock_gemini(StatusCode::OK, json!({})).await;

    let judge = loader(endpoint, "IMAGE_AUTHENTICITY_TEST_KEY_NEVER_SET")
        .load()
        .unwrap();
    let err = judge.judge(request()).await.unwrap_err();

    assert!(matches!(err, DetectorError::ExternalService(_)));
    assert!(captured.lock().uri.is_none());
}
