//! HTTP relay for long-running image-to-video generation jobs.
//!
//! Three handlers front the vendor API: `start` kicks off a generation job and
//! returns its operation handle, `status` polls it, and `download` streams the
//! finished video back to the caller. Vendor responses are normalized into a
//! small stable JSON contract; see [`extract`] for the normalization rules and
//! [`VideoClient`] for the fallback chains.

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

mod client;
pub mod config;
pub mod error;
pub mod extract;
mod gemini;
pub mod handlers;
pub mod model;

pub use client::{VideoClient, VideoDownload};
pub use config::VeoConfig;
pub use error::{Result, VeoError};
pub use gemini::GeminiSdk;
pub use handlers::{AppState, router};
pub use model::{FileReference, GenerationRequest, OperationHandle, OperationStatus, SourceImage};

/// The two argument shapes accepted when re-fetching a videos operation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OperationRef<'a> {
    /// A (possibly partial) operation object as previously returned by the vendor.
    Object(&'a Value),
    /// A bare operation name.
    Name(&'a str),
}

/// Typed client for the vendor video API.
///
/// This is the "SDK" side of the adapter: [`VideoClient`] calls these methods
/// first and only falls back to raw REST calls when they fail. Implementors
/// return the vendor's raw JSON so that shape drift is absorbed by the
/// extractors rather than by the client.
#[async_trait]
pub trait VideoSdk: Send + Sync {
    /// Starts a long-running video generation job.
    ///
    /// # Arguments
    /// * `api_key` - The vendor credential
    /// * `request` - The validated generation request
    ///
    /// # Returns
    /// The raw operation object returned by the vendor.
    async fn generate_videos(&self, api_key: &str, request: &GenerationRequest) -> Result<Value>;

    /// Re-fetches a videos operation, by object or by bare name.
    async fn get_videos_operation(&self, api_key: &str, operation: OperationRef<'_>)
    -> Result<Value>;

    /// Fetches any long-running operation by its full resource name.
    async fn get_operation(&self, api_key: &str, name: &str) -> Result<Value>;

    /// Downloads the bytes behind `file` into `download_path`.
    ///
    /// The file at `download_path` is created or truncated. An implementation
    /// that cannot resolve the reference must return an error rather than
    /// leave an empty file behind.
    async fn download(
        &self,
        api_key: &str,
        file: &FileReference,
        download_path: &Path,
    ) -> Result<()>;
}
