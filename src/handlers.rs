//! The `start`, `status` and `download` endpoints.

use crate::VideoSdk;
use crate::client::VideoClient;
use crate::config::VeoConfig;
use crate::error::{Result, VeoError};
use crate::gemini::GeminiSdk;
use crate::model::{GenerationRequest, OperationHandle, OperationStatus, SourceImage};
use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{
        DefaultBodyLimit, Query, State,
        rejection::{BytesRejection, QueryRejection},
    },
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{any, get},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub const INLINE_DISPOSITION: &str = "inline; filename=\"veo-output.mp4\"";

/// Immutable state shared by every request.
pub struct AppState<S: VideoSdk> {
    pub config: VeoConfig,
    pub client: VideoClient<S>,
}

impl AppState<GeminiSdk> {
    pub fn from_config(config: VeoConfig) -> Self {
        let http = reqwest::Client::new();
        let sdk = GeminiSdk::new(http.clone(), &config);
        Self::with_sdk(config, sdk, http)
    }
}

impl<S: VideoSdk> AppState<S> {
    pub fn with_sdk(config: VeoConfig, sdk: S, http: reqwest::Client) -> Self {
        let client = VideoClient::new(sdk, http, &config);
        Self { config, client }
    }
}

pub fn router<S: VideoSdk + 'static>(state: Arc<AppState<S>>) -> Router {
    let body_limit = state.config.max_body_bytes;

    Router::new()
        .route("/", get(|| async { "veo-relay: POST /start, GET /status, GET /download" }))
        .route("/start", any(start::<S>))
        .route("/status", get(status::<S>))
        .route("/download", get(download::<S>))
        .route("/api/veo-start", any(start::<S>))
        .route("/api/veo-status", get(status::<S>))
        .route("/api/veo-download", get(download::<S>))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartPayload {
    prompt: Option<String>,
    aspect_ratio: Option<String>,
    duration_sec: Option<Value>,
    fps: Option<Value>,
    resolution: Option<Value>,
    negative_prompt: Option<String>,
    image_base64: Option<String>,
    image_mime: Option<String>,
}

impl StartPayload {
    fn parse(body: &[u8]) -> Result<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let payload: Option<Self> = serde_json::from_slice(body)
            .map_err(|e| VeoError::validation(format!("Invalid JSON body: {e}")))?;
        Ok(payload.unwrap_or_default())
    }

    fn into_request(self, default_aspect_ratio: &str) -> Result<GenerationRequest> {
        let prompt = self
            .prompt
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| VeoError::validation("Missing prompt"))?;

        let (Some(image_base64), Some(image_mime)) = (
            self.image_base64.filter(|i| !i.trim().is_empty()),
            self.image_mime.filter(|m| !m.trim().is_empty()),
        ) else {
            return Err(VeoError::validation("Missing image"));
        };
        let image = SourceImage::from_base64(&image_base64, image_mime)?;

        let aspect_ratio = self
            .aspect_ratio
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| default_aspect_ratio.to_string());

        Ok(GenerationRequest::new(prompt, aspect_ratio, image)
            .with_negative_prompt(self.negative_prompt)
            .with_duration(self.duration_sec.as_ref().and_then(hint_text))
            .with_fps(self.fps.as_ref().and_then(hint_text))
            .with_resolution(self.resolution.as_ref().and_then(hint_text)))
    }
}

// Hints arrive as numbers or strings depending on the form that sent them.
fn hint_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
struct StartResponse {
    name: OperationHandle,
}

#[derive(Debug, Deserialize)]
struct OperationQuery {
    name: Option<String>,
}

// Extractor rejections become JSON errors like every other failure.
fn read_body(body: std::result::Result<Bytes, BytesRejection>) -> Result<Bytes> {
    body.map_err(|rejection| match rejection.status() {
        StatusCode::PAYLOAD_TOO_LARGE => VeoError::PayloadTooLarge,
        _ => VeoError::validation(rejection.body_text()),
    })
}

fn read_query(
    query: std::result::Result<Query<OperationQuery>, QueryRejection>,
) -> Result<OperationQuery> {
    query
        .map(|Query(query)| query)
        .map_err(|rejection| VeoError::validation(rejection.body_text()))
}

impl OperationQuery {
    fn handle(self) -> Result<OperationHandle> {
        self.name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .map(OperationHandle::new)
            .ok_or_else(|| VeoError::validation("Missing operation name"))
    }
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    has_video: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_id: Option<String>,
}

impl From<&OperationStatus> for StatusResponse {
    fn from(status: &OperationStatus) -> Self {
        if !status.done {
            return Self {
                done: false,
                has_video: None,
                reason: None,
                file_id: None,
            };
        }

        Self {
            done: true,
            has_video: Some(status.has_video()),
            reason: (!status.has_video()).then(|| status.reason()),
            file_id: status.file_ref.as_ref().and_then(|f| f.file_id()),
        }
    }
}

async fn start<S: VideoSdk>(
    State(state): State<Arc<AppState<S>>>,
    method: Method,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Json<StartResponse>> {
    if method != Method::POST {
        return Err(VeoError::MethodNotAllowed);
    }
    let api_key = state.config.api_key()?;
    let body = read_body(body)?;
    let request = StartPayload::parse(&body)?.into_request(&state.config.default_aspect_ratio)?;

    let name = state.client.start_job(api_key, &request).await?;
    Ok(Json(StartResponse { name }))
}

async fn status<S: VideoSdk>(
    State(state): State<Arc<AppState<S>>>,
    query: std::result::Result<Query<OperationQuery>, QueryRejection>,
) -> Result<Json<StatusResponse>> {
    let api_key = state.config.api_key()?;
    let handle = read_query(query)?.handle()?;

    let status = state.client.get_job_status(api_key, &handle).await?;
    log::debug!("Operation {handle}: done={} has_video={}", status.done, status.has_video());
    Ok(Json(StatusResponse::from(&status)))
}

async fn download<S: VideoSdk>(
    State(state): State<Arc<AppState<S>>>,
    query: std::result::Result<Query<OperationQuery>, QueryRejection>,
) -> Result<Response> {
    let api_key = state.config.api_key()?;
    let handle = read_query(query)?.handle()?;

    let status = state.client.get_job_status(api_key, &handle).await?;
    if !status.done {
        return Err(VeoError::NotReady);
    }
    let Some(file_ref) = status.file_ref.as_ref() else {
        return Err(VeoError::NoVideo {
            reason: status.reason(),
        });
    };

    let video = state.client.download_result(api_key, file_ref).await?;
    log::info!("Streaming video for {handle} ({})", video.content_type());

    let content_type = video.content_type().to_string();
    let content_length = video.content_length();
    let mut response = (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, INLINE_DISPOSITION.to_string()),
        ],
        Body::from_stream(video.into_stream()),
    )
        .into_response();
    if let Some(length) = content_length {
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, length.into());
    }
    Ok(response)
}
