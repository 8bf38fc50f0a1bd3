use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt; // for oneshot()
use veo_relay::{AppState, VeoConfig, router};
use wiremock::matchers::{header as header_matcher, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PIXEL_PNG: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";
const OPERATION: &str = "models/veo-2.0-generate-001/operations/op1";

fn app(server: &MockServer) -> Router {
    let config = VeoConfig::default()
        .with_api_key("test-key")
        .with_api_base(server.uri());
    router(Arc::new(AppState::from_config(config)))
}

fn app_with_config(config: VeoConfig) -> Router {
    router(Arc::new(AppState::from_config(config)))
}

fn app_without_key(server: &MockServer) -> Router {
    let config = VeoConfig::default().with_api_base(server.uri());
    router(Arc::new(AppState::from_config(config)))
}

async fn mount_operation(server: &MockServer, operation: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/{OPERATION}")))
        .and(header_matcher("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(operation))
        .mount(server)
        .await;
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_start_then_poll_pending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/veo-2.0-generate-001:predictLongRunning"))
        .and(header_matcher("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": OPERATION })))
        .expect(1)
        .mount(&server)
        .await;
    mount_operation(&server, json!({ "name": OPERATION })).await;

    let response = app(&server)
        .oneshot(post_json(
            "/start",
            json!({ "prompt": "test", "imageBase64": PIXEL_PNG, "imageMime": "image/png" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let name = body["name"].as_str().unwrap();
    assert!(!name.is_empty());

    let response = app(&server)
        .oneshot(get(&format!("/status?name={name}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "done": false }));
}

#[tokio::test]
async fn test_start_rejects_other_methods() {
    let server = MockServer::start().await;
    let response = app(&server).oneshot(get("/start")).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        json_body(response).await,
        json!({ "error": "Method not allowed" })
    );
}

#[tokio::test]
async fn test_start_validates_input() {
    let server = MockServer::start().await;

    let response = app(&server)
        .oneshot(post_json("/start", json!({ "imageBase64": PIXEL_PNG, "imageMime": "image/png" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await, json!({ "error": "Missing prompt" }));

    let response = app(&server)
        .oneshot(post_json("/api/veo-start", json!({ "prompt": "test" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await, json!({ "error": "Missing image" }));

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_api_key_is_a_server_error() {
    let server = MockServer::start().await;

    for request in [
        post_json("/start", json!({ "prompt": "test" })),
        get(&format!("/status?name={OPERATION}")),
        get(&format!("/download?name={OPERATION}")),
    ] {
        let response = app_without_key(&server).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await,
            json!({ "error": "Server missing GEMINI_API_KEY" })
        );
    }
}

#[tokio::test]
async fn test_status_requires_name() {
    let server = MockServer::start().await;
    let response = app(&server).oneshot(get("/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await,
        json!({ "error": "Missing operation name" })
    );
}

#[tokio::test]
async fn test_status_unknown_name_is_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": 404, "message": "Requested entity was not found.", "status": "NOT_FOUND" }
        })))
        .mount(&server)
        .await;

    let response = app(&server)
        .oneshot(get("/status?name=garbage"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json_body(response).await,
        json!({ "error": "Requested entity was not found." })
    );
}

#[tokio::test]
async fn test_status_done_with_video() {
    let server = MockServer::start().await;
    mount_operation(
        &server,
        json!({
            "name": OPERATION,
            "done": true,
            "response": { "generateVideoResponse": { "generatedSamples": [
                { "video": { "uri": format!("{}/files/vid1:download?alt=media", server.uri()) } }
            ] } }
        }),
    )
    .await;

    let response = app(&server)
        .oneshot(get(&format!("/api/veo-status?name={OPERATION}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({ "done": true, "hasVideo": true, "fileId": "files/vid1" })
    );
}

#[tokio::test]
async fn test_download_before_completion_is_not_ready() {
    let server = MockServer::start().await;
    mount_operation(&server, json!({ "name": OPERATION, "done": false })).await;

    let response = app(&server)
        .oneshot(get(&format!("/download?name={OPERATION}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(json_body(response).await, json!({ "error": "Not ready" }));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests.iter().all(|r| !r.url.path().contains(":download")));
}

#[tokio::test]
async fn test_download_without_video_reports_reason() {
    let server = MockServer::start().await;
    mount_operation(
        &server,
        json!({
            "name": OPERATION,
            "done": true,
            "response": { "generateVideoResponse": {
                "raiMediaFilteredCount": 1,
                "raiMediaFilteredReasons": ["The input image contains a minor."]
            } }
        }),
    )
    .await;

    let response = app(&server)
        .oneshot(get(&format!("/download?name={OPERATION}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["reason"], "The input image contains a minor.");
}

#[tokio::test]
async fn test_download_streams_video() {
    let server = MockServer::start().await;
    mount_operation(
        &server,
        json!({
            "name": OPERATION,
            "done": true,
            "response": { "generatedVideos": [{ "video": { "name": "files/vid1" } }] }
        }),
    )
    .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/files/vid1:download$"))
        .and(header_matcher("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fake-mp4".to_vec()))
        .mount(&server)
        .await;

    let response = app(&server)
        .oneshot(get(&format!("/download?name={OPERATION}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "inline; filename=\"veo-output.mp4\""
    );
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"fake-mp4");
}

#[tokio::test]
async fn test_start_reports_vendor_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/veo-2.0-generate-001:predictLongRunning"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 400, "message": "Image format not supported.", "status": "INVALID_ARGUMENT" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = app(&server)
        .oneshot(post_json(
            "/start",
            json!({ "prompt": "test", "imageBase64": PIXEL_PNG, "imageMime": "image/png" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json_body(response).await,
        json!({ "error": "Image format not supported." })
    );
}

#[tokio::test]
async fn test_start_without_operation_name_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/veo-2.0-generate-001:predictLongRunning"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "done": false })))
        .expect(1)
        .mount(&server)
        .await;

    let response = app(&server)
        .oneshot(post_json(
            "/start",
            json!({ "prompt": "test", "imageBase64": PIXEL_PNG, "imageMime": "image/png" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json_body(response).await,
        json!({ "error": "No operation name in response" })
    );
}

#[tokio::test]
async fn test_oversized_body_is_a_json_error() {
    let mut config = VeoConfig::default()
        .with_api_key("test-key")
        .with_api_base("http://127.0.0.1:9");
    config.max_body_bytes = 16;

    let response = app_with_config(config)
        .oneshot(post_json(
            "/start",
            json!({ "prompt": "test", "imageBase64": PIXEL_PNG, "imageMime": "image/png" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(
        json_body(response).await,
        json!({ "error": "Request body too large" })
    );
}

#[tokio::test]
async fn test_malformed_query_is_a_json_error() {
    let server = MockServer::start().await;

    for uri in ["/status?name=a&name=b", "/download?name=a&name=b"] {
        let response = app(&server).oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("duplicate field"));
    }
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_api_key_stays_out_of_error_bodies() {
    const SECRET: &str = "SECRET-KEY-123";

    // nothing listens on the discard port, so every vendor call fails to connect
    let config = VeoConfig::default()
        .with_api_key(SECRET)
        .with_api_base("http://127.0.0.1:9");
    let response = app_with_config(config)
        .oneshot(get("/status?name=abc"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await.to_string();
    assert!(!body.contains(SECRET), "key leaked: {body}");

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/{OPERATION}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": OPERATION,
            "done": true,
            "response": { "generatedVideos": [{ "video": { "name": "files/vid1" } }] }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/vid1:download"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", "http://127.0.0.1:9/blob/vid1"),
        )
        .mount(&server)
        .await;

    let config = VeoConfig::default()
        .with_api_key(SECRET)
        .with_api_base(server.uri());
    let response = app_with_config(config)
        .oneshot(get(&format!("/download?name={OPERATION}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await.to_string();
    assert!(!body.contains(SECRET), "key leaked: {body}");

    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| !r.url.as_str().contains(SECRET)));
}
