//! [`VideoSdk`] implementation for the Gemini API (`generativelanguage.googleapis.com`).

use crate::config::VeoConfig;
use crate::error::{Result, VeoError};
use crate::extract::extract_operation_name;
use crate::model::{FileReference, GenerationRequest};
use crate::{OperationRef, VideoSdk};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use futures::StreamExt;
use serde_json::{Value, json};
use std::path::Path;
use tokio::io::AsyncWriteExt;

pub(crate) const API_KEY_HEADER: &str = "x-goog-api-key";

/// Inline video payload fields, in the order they are looked up.
const INLINE_VIDEO_FIELDS: [&str; 3] = ["videoBytes", "bytesBase64Encoded", "data"];

#[derive(Clone, Debug)]
pub struct GeminiSdk {
    http: reqwest::Client,
    api_base: String,
    model: String,
}

impl GeminiSdk {
    pub fn new(http: reqwest::Client, config: &VeoConfig) -> Self {
        Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        resource_url(&self.api_base, path)
    }

    fn model_path(&self) -> String {
        if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        }
    }
}

#[async_trait]
impl VideoSdk for GeminiSdk {
    async fn generate_videos(&self, api_key: &str, request: &GenerationRequest) -> Result<Value> {
        let body = json!({
            "instances": [{
                "prompt": request.full_prompt(),
                "image": {
                    "bytesBase64Encoded": request.image().to_base64(),
                    "mimeType": request.image().mime_type(),
                },
            }],
            "parameters": { "aspectRatio": request.aspect_ratio() },
        });

        let response = self
            .http
            .post(self.url(&format!("{}:predictLongRunning", self.model_path())))
            .header(API_KEY_HEADER, api_key)
            .json(&body)
            .send()
            .await?;
        read_json(response).await
    }

    async fn get_videos_operation(
        &self,
        api_key: &str,
        operation: OperationRef<'_>,
    ) -> Result<Value> {
        let path = match operation {
            OperationRef::Object(op) => extract_operation_name(op)
                .ok_or_else(|| VeoError::validation("operation object has no name"))?,
            // bare ids live under the model that created them
            OperationRef::Name(name) if !name.contains("operations/") => {
                format!("{}/operations/{}", self.model_path(), name)
            }
            OperationRef::Name(name) => name.to_string(),
        };

        let response = self
            .http
            .get(self.url(&path))
            .header(API_KEY_HEADER, api_key)
            .send()
            .await?;
        read_json(response).await
    }

    async fn get_operation(&self, api_key: &str, name: &str) -> Result<Value> {
        let response = self
            .http
            .get(self.url(name))
            .header(API_KEY_HEADER, api_key)
            .send()
            .await?;
        read_json(response).await
    }

    async fn download(
        &self,
        api_key: &str,
        file: &FileReference,
        download_path: &Path,
    ) -> Result<()> {
        let request = match file {
            FileReference::Uri(uri) => self.http.get(uri),
            FileReference::Name(name) => self
                .http
                .get(self.url(&format!("{}:download", file_resource(name))))
                .query(&[("alt", "media")]),
            FileReference::Opaque(value) => {
                let bytes = inline_video_bytes(value)?;
                tokio::fs::write(download_path, bytes).await?;
                return Ok(());
            }
        };

        let response = request.header(API_KEY_HEADER, api_key).send().await?;
        let written = write_body(response, download_path).await?;
        log::debug!("Downloaded {written} bytes to {}", download_path.display());
        Ok(())
    }
}

pub(crate) fn resource_url(api_base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        api_base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Normalizes a file name to its `files/<id>` resource form.
pub(crate) fn file_resource(name: &str) -> String {
    if name.starts_with("files/") {
        name.to_string()
    } else {
        format!("files/{name}")
    }
}

fn inline_video_bytes(video: &Value) -> Result<Vec<u8>> {
    let encoded = INLINE_VIDEO_FIELDS
        .iter()
        .find_map(|field| video.get(field).and_then(Value::as_str))
        .ok_or_else(|| VeoError::upstream(None, "file reference has no downloadable content"))?;
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| VeoError::upstream(None, format!("invalid inline video bytes: {e}")))?;
    if bytes.is_empty() {
        return Err(VeoError::upstream(None, "inline video is empty"));
    }
    Ok(bytes)
}

/// Parses a successful vendor response, or turns a failed one into an
/// [`VeoError::Upstream`] carrying the vendor's own message.
pub(crate) async fn read_json(response: reqwest::Response) -> Result<Value> {
    if !response.status().is_success() {
        return Err(upstream_error(response).await);
    }
    Ok(response.json().await?)
}

pub(crate) async fn upstream_error(response: reqwest::Response) -> VeoError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|json| {
            json.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .or_else(|| Some(body.trim().to_string()).filter(|b| !b.is_empty()))
        .unwrap_or_else(|| format!("upstream returned {status}"));

    VeoError::upstream(Some(status.as_u16()), message)
}

/// Streams a successful response body into `path`, failing on an empty body.
pub(crate) async fn write_body(response: reqwest::Response, path: &Path) -> Result<u64> {
    if !response.status().is_success() {
        return Err(upstream_error(response).await);
    }

    let mut file = tokio::fs::File::create(path).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    if written == 0 {
        return Err(VeoError::upstream(None, "download returned no bytes"));
    }
    Ok(written)
}
