use crate::config::VeoConfig;
use crate::error::{Result, VeoError};
use crate::extract::extract_operation_name;
use crate::gemini::{API_KEY_HEADER, file_resource, read_json, resource_url, upstream_error};
use crate::model::{FileReference, GenerationRequest, OperationHandle, OperationStatus};
use crate::{OperationRef, VideoSdk};
use bytes::Bytes;
use futures::{StreamExt, stream::BoxStream};
use reqwest::StatusCode;
use serde_json::{Value, json};
use std::path::PathBuf;
use tempfile::TempPath;
use tokio_util::io::ReaderStream;

/// Content type assumed when the source does not announce a video type.
pub const DEFAULT_VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// Strategies for re-fetching an operation, tried in [`StatusAttempt::ORDER`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StatusAttempt {
    /// SDK `get_videos_operation` with an operation object.
    SdkOperation,
    /// SDK `get_videos_operation` with a bare name.
    SdkOperationName,
    /// SDK generic `get_operation`.
    SdkGetOperation,
    /// Raw REST GET on the handle as given.
    Rest,
    /// Raw REST GET with an `operations/` prefix inserted.
    RestOperationsPrefix,
}

impl StatusAttempt {
    const ORDER: [StatusAttempt; 5] = [
        StatusAttempt::SdkOperation,
        StatusAttempt::SdkOperationName,
        StatusAttempt::SdkGetOperation,
        StatusAttempt::Rest,
        StatusAttempt::RestOperationsPrefix,
    ];

    fn label(self) -> &'static str {
        match self {
            StatusAttempt::SdkOperation => "sdk.get_videos_operation(object)",
            StatusAttempt::SdkOperationName => "sdk.get_videos_operation(name)",
            StatusAttempt::SdkGetOperation => "sdk.get_operation",
            StatusAttempt::Rest => "rest",
            StatusAttempt::RestOperationsPrefix => "rest(operations/)",
        }
    }

    fn applies(self, name: &str) -> bool {
        match self {
            StatusAttempt::RestOperationsPrefix => !name.contains("operations/"),
            _ => true,
        }
    }

    async fn run<S: VideoSdk>(
        self,
        client: &VideoClient<S>,
        api_key: &str,
        name: &str,
    ) -> Result<Value> {
        match self {
            StatusAttempt::SdkOperation => {
                let operation = json!({ "name": name });
                client
                    .sdk
                    .get_videos_operation(api_key, OperationRef::Object(&operation))
                    .await
            }
            StatusAttempt::SdkOperationName => {
                client
                    .sdk
                    .get_videos_operation(api_key, OperationRef::Name(name))
                    .await
            }
            StatusAttempt::SdkGetOperation => client.sdk.get_operation(api_key, name).await,
            StatusAttempt::Rest => client.rest_get_operation(api_key, name).await,
            StatusAttempt::RestOperationsPrefix => {
                client
                    .rest_get_operation(api_key, &format!("operations/{name}"))
                    .await
            }
        }
    }
}

/// Strategies for fetching video bytes, tried in [`DownloadAttempt::ORDER`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DownloadAttempt {
    /// SDK download into a temporary file, then stream that file.
    Sdk,
    /// Direct fetch of the reference's URI, retried once with `key=` on 401/403.
    /// This retry is the only request that carries the key in its URL.
    SignedUri,
    /// REST `{name}:download`, following redirects.
    RestDownload,
}

impl DownloadAttempt {
    const ORDER: [DownloadAttempt; 3] = [
        DownloadAttempt::Sdk,
        DownloadAttempt::SignedUri,
        DownloadAttempt::RestDownload,
    ];

    fn label(self) -> &'static str {
        match self {
            DownloadAttempt::Sdk => "sdk.download",
            DownloadAttempt::SignedUri => "uri",
            DownloadAttempt::RestDownload => "rest:download",
        }
    }

    fn applies(self, file_ref: &FileReference) -> bool {
        match self {
            DownloadAttempt::Sdk => true,
            DownloadAttempt::SignedUri => file_ref.uri().is_some(),
            DownloadAttempt::RestDownload => file_ref.name().is_some(),
        }
    }

    async fn run<S: VideoSdk>(
        self,
        client: &VideoClient<S>,
        api_key: &str,
        file_ref: &FileReference,
    ) -> Result<VideoDownload> {
        match self {
            DownloadAttempt::Sdk => client.sdk_download(api_key, file_ref).await,
            DownloadAttempt::SignedUri => match file_ref.uri() {
                Some(uri) => client.uri_download(api_key, uri).await,
                None => Err(VeoError::upstream(None, "file reference has no URI")),
            },
            DownloadAttempt::RestDownload => match file_ref.name() {
                Some(name) => client.rest_download(api_key, name).await,
                None => Err(VeoError::upstream(None, "file reference has no name")),
            },
        }
    }
}

/// Failures suppressed while walking a fallback chain.
#[derive(Debug, Default)]
struct FailedAttempts(Vec<(&'static str, VeoError)>);

impl FailedAttempts {
    fn record(&mut self, label: &'static str, error: VeoError) {
        log::warn!("{label} failed: {error}");
        self.0.push((label, error));
    }

    /// The failure worth reporting: the first credential rejection if any,
    /// otherwise the last error.
    fn exhausted(self) -> VeoError {
        let attempts: Vec<String> = self
            .0
            .iter()
            .map(|(label, error)| format!("{label}: {error}"))
            .collect();

        let reported = self
            .0
            .iter()
            .find(|(_, error)| error.is_auth_failure())
            .or_else(|| self.0.last());

        match reported {
            Some((_, error)) => VeoError::Upstream {
                status: error.upstream_status(),
                message: error.to_string(),
                attempts,
            },
            None => VeoError::upstream(None, "no applicable strategy"),
        }
    }
}

enum DownloadSource {
    // the path is kept alive until the stream is dropped, then unlinked
    TempFile { file: tokio::fs::File, path: TempPath },
    Remote(reqwest::Response),
}

/// A video ready to be streamed to the caller.
pub struct VideoDownload {
    content_type: String,
    content_length: Option<u64>,
    source: DownloadSource,
}

impl VideoDownload {
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn into_stream(self) -> BoxStream<'static, std::io::Result<Bytes>> {
        match self.source {
            DownloadSource::TempFile { file, path } => ReaderStream::new(file)
                .map(move |chunk| {
                    let _staged = &path;
                    chunk
                })
                .boxed(),
            DownloadSource::Remote(response) => response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| std::io::Error::other(e.without_url())))
                .boxed(),
        }
    }
}

impl std::fmt::Debug for VideoDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoDownload")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Vendor client adapter: the SDK first, raw REST as a fallback.
///
/// Each operation walks an ordered list of strategies and returns the first
/// success. Failures are logged and aggregated, never silently dropped; see
/// [`VeoError::Upstream`].
pub struct VideoClient<S: VideoSdk> {
    sdk: S,
    http: reqwest::Client,
    api_base: String,
    tmp_dir: PathBuf,
}

impl<S: VideoSdk> VideoClient<S> {
    /// Creates a new adapter around `sdk`.
    ///
    /// # Arguments
    /// * `sdk` - The typed vendor client tried first by every operation
    /// * `http` - The HTTP client used for the raw REST fallbacks
    /// * `config` - Supplies the REST base URL and the temporary directory
    pub fn new(sdk: S, http: reqwest::Client, config: &VeoConfig) -> Self {
        Self {
            sdk,
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            tmp_dir: config.tmp_dir.clone(),
        }
    }

    /// Starts a generation job and returns its operation handle.
    ///
    /// Fails with [`VeoError::Upstream`] when the vendor rejects the request or
    /// its response carries no recognizable operation name.
    pub async fn start_job(
        &self,
        api_key: &str,
        request: &GenerationRequest,
    ) -> Result<OperationHandle> {
        let operation = self
            .sdk
            .generate_videos(api_key, request)
            .await
            .map_err(|e| match e {
                VeoError::Upstream { .. } => e,
                other => VeoError::upstream(other.upstream_status(), other.to_string()),
            })?;

        let name = extract_operation_name(&operation)
            .ok_or_else(|| VeoError::upstream(None, "No operation name in response"))?;
        log::info!("Started video operation {name}");
        Ok(OperationHandle::new(name))
    }

    /// Polls the vendor for the current state of `handle`.
    ///
    /// # Returns
    /// The status decoded from the first strategy that succeeds, or an
    /// [`VeoError::Upstream`] listing every failed attempt.
    pub async fn get_job_status(
        &self,
        api_key: &str,
        handle: &OperationHandle,
    ) -> Result<OperationStatus> {
        let name = handle.as_str();
        let mut failures = FailedAttempts::default();

        for attempt in StatusAttempt::ORDER {
            if !attempt.applies(name) {
                continue;
            }
            log::debug!("Polling {name} via {}", attempt.label());
            match attempt.run(self, api_key, name).await {
                Ok(operation) => return Ok(OperationStatus::from_operation(&operation)),
                Err(e) => failures.record(attempt.label(), e),
            }
        }

        Err(failures.exhausted())
    }

    /// Resolves `file_ref` to a byte stream.
    ///
    /// Fails with [`VeoError::NoVideo`] when no download stage yields bytes.
    pub async fn download_result(
        &self,
        api_key: &str,
        file_ref: &FileReference,
    ) -> Result<VideoDownload> {
        let mut failures = FailedAttempts::default();

        for attempt in DownloadAttempt::ORDER {
            if !attempt.applies(file_ref) {
                continue;
            }
            log::debug!("Downloading video via {}", attempt.label());
            match attempt.run(self, api_key, file_ref).await {
                Ok(download) => return Ok(download),
                Err(e) => failures.record(attempt.label(), e),
            }
        }

        Err(VeoError::NoVideo {
            reason: format!("Unable to download video: {}", failures.exhausted()),
        })
    }

    async fn rest_get_operation(&self, api_key: &str, name: &str) -> Result<Value> {
        let response = self
            .http
            .get(resource_url(&self.api_base, name))
            .header(API_KEY_HEADER, api_key)
            .send()
            .await?;
        read_json(response).await
    }

    async fn sdk_download(&self, api_key: &str, file_ref: &FileReference) -> Result<VideoDownload> {
        let staged = tempfile::Builder::new()
            .prefix("veo-output-")
            .suffix(".mp4")
            .tempfile_in(&self.tmp_dir)?
            .into_temp_path();

        self.sdk.download(api_key, file_ref, &staged).await?;

        let file = tokio::fs::File::open(&staged).await?;
        let length = file.metadata().await?.len();
        if length == 0 {
            return Err(VeoError::upstream(None, "SDK download produced an empty file"));
        }

        Ok(VideoDownload {
            content_type: DEFAULT_VIDEO_CONTENT_TYPE.to_string(),
            content_length: Some(length),
            source: DownloadSource::TempFile { file, path: staged },
        })
    }

    async fn uri_download(&self, api_key: &str, uri: &str) -> Result<VideoDownload> {
        let response = self.http.get(uri).send().await?;
        let response = match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                log::debug!("Signed URI rejected with {}, retrying with key", response.status());
                self.http.get(uri).query(&[("key", api_key)]).send().await?
            }
            _ => response,
        };
        remote_download(response).await
    }

    async fn rest_download(&self, api_key: &str, name: &str) -> Result<VideoDownload> {
        let url = resource_url(&self.api_base, &format!("{}:download", file_resource(name)));
        let response = self
            .http
            .get(url)
            .query(&[("alt", "media")])
            .header(API_KEY_HEADER, api_key)
            .send()
            .await?;
        remote_download(response).await
    }
}

async fn remote_download(response: reqwest::Response) -> Result<VideoDownload> {
    if !response.status().is_success() {
        return Err(upstream_error(response).await);
    }
    if response.content_length() == Some(0) {
        return Err(VeoError::upstream(None, "download returned no bytes"));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .filter(|value| value.starts_with("video/"))
        .unwrap_or(DEFAULT_VIDEO_CONTENT_TYPE)
        .to_string();

    Ok(VideoDownload {
        content_type,
        content_length: response.content_length(),
        source: DownloadSource::Remote(response),
    })
}
