use crate::error::{Result, VeoError};
use crate::extract::{extract_failure_reason, extract_file_reference};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Reason reported when a finished operation carries neither a video nor a
/// vendor-supplied explanation.
pub const DEFAULT_NO_VIDEO_REASON: &str = "No video in response";

/// The still image a video is generated from.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceImage {
    bytes: Vec<u8>,
    mime_type: String,
}

impl SourceImage {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Decodes a base64 payload, tolerating a `data:<mime>;base64,` prefix.
    pub fn from_base64(encoded: &str, mime_type: impl Into<String>) -> Result<Self> {
        let encoded = match encoded.split_once(";base64,") {
            Some((prefix, data)) if prefix.starts_with("data:") => data,
            _ => encoded,
        };
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = STANDARD
            .decode(compact)
            .map_err(|e| VeoError::validation(format!("Invalid image: {e}")))?;
        if bytes.is_empty() {
            return Err(VeoError::validation("Missing image"));
        }
        Ok(Self::new(bytes, mime_type))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// One image-to-video generation request.
///
/// Only the aspect ratio is passed to the vendor as a structured parameter;
/// the other knobs are folded into the prompt text, see [`full_prompt`].
///
/// [`full_prompt`]: GenerationRequest::full_prompt
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    prompt: String,
    negative_prompt: Option<String>,
    aspect_ratio: String,
    duration_sec: Option<String>,
    fps: Option<String>,
    resolution: Option<String>,
    image: SourceImage,
}

impl GenerationRequest {
    pub fn new(
        prompt: impl Into<String>,
        aspect_ratio: impl Into<String>,
        image: SourceImage,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: None,
            aspect_ratio: aspect_ratio.into(),
            duration_sec: None,
            fps: None,
            resolution: None,
            image,
        }
    }

    pub fn with_negative_prompt(mut self, negative_prompt: Option<String>) -> Self {
        self.negative_prompt = non_empty(negative_prompt);
        self
    }

    pub fn with_duration(mut self, duration_sec: Option<String>) -> Self {
        self.duration_sec = non_empty(duration_sec);
        self
    }

    pub fn with_fps(mut self, fps: Option<String>) -> Self {
        self.fps = non_empty(fps);
        self
    }

    pub fn with_resolution(mut self, resolution: Option<String>) -> Self {
        self.resolution = non_empty(resolution);
        self
    }

    pub fn aspect_ratio(&self) -> &str {
        &self.aspect_ratio
    }

    pub fn image(&self) -> &SourceImage {
        &self.image
    }

    /// The prompt sent to the vendor, with every optional hint appended on its
    /// own line.
    pub fn full_prompt(&self) -> String {
        let mut full = self.prompt.clone();
        if let Some(negative) = &self.negative_prompt {
            full.push_str(&format!("\nNEGATIVE: {negative}"));
        }
        if let Some(duration) = &self.duration_sec {
            full.push_str(&format!("\nTarget duration: {duration}s"));
        }
        if let Some(fps) = &self.fps {
            full.push_str(&format!("\nTarget frame rate: {fps} fps"));
        }
        if let Some(resolution) = &self.resolution {
            full.push_str(&format!("\nTarget resolution: {resolution}"));
        }
        full
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Opaque identifier of a vendor long-running operation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct OperationHandle(String);

impl OperationHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pointer to the bytes of a generated video.
#[derive(Clone, Debug, PartialEq)]
pub enum FileReference {
    /// A directly fetchable (possibly signed) URI.
    Uri(String),
    /// A vendor file resource name such as `files/abc123`.
    Name(String),
    /// Any other shape, e.g. a video object carrying inline bytes.
    Opaque(Value),
}

impl FileReference {
    /// Classifies a video value. Returns `None` for nulls, empty strings,
    /// empty objects and non-object scalars.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Self::from_str_ref(s),
            Value::Object(map) if map.is_empty() => None,
            Value::Object(_) => {
                let uri = ["/uri", "/downloadUri", "/videoUri", "/file/uri"]
                    .iter()
                    .find_map(|pointer| non_empty_str(value.pointer(pointer)));
                if let Some(uri) = uri {
                    return Some(FileReference::Uri(uri.to_string()));
                }
                let name = ["/name", "/file/name"]
                    .iter()
                    .find_map(|pointer| non_empty_str(value.pointer(pointer)));
                match name {
                    Some(name) => Some(FileReference::Name(name.to_string())),
                    None => Some(FileReference::Opaque(value.clone())),
                }
            }
            _ => None,
        }
    }

    fn from_str_ref(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            None
        } else if s.starts_with("http://") || s.starts_with("https://") {
            Some(FileReference::Uri(s.to_string()))
        } else {
            Some(FileReference::Name(s.to_string()))
        }
    }

    pub fn uri(&self) -> Option<&str> {
        match self {
            FileReference::Uri(uri) => Some(uri),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            FileReference::Name(name) => Some(name),
            _ => None,
        }
    }

    /// A stable id for the file, when one can be derived: the resource name,
    /// or the `files/<id>` segment of a vendor download URI.
    pub fn file_id(&self) -> Option<String> {
        match self {
            FileReference::Name(name) => Some(name.clone()),
            FileReference::Uri(uri) => {
                let start = uri.find("/files/")? + 1;
                let rest = &uri[start..];
                let end = rest.find([':', '?', '#']).unwrap_or(rest.len());
                Some(rest[..end].to_string())
            }
            FileReference::Opaque(_) => None,
        }
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Snapshot of an operation, recomputed on every poll.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OperationStatus {
    pub done: bool,
    pub file_ref: Option<FileReference>,
    pub error_reason: Option<String>,
}

impl OperationStatus {
    /// Decodes a raw vendor operation object.
    ///
    /// An operation reporting an `error` is treated as finished even when
    /// `done` is missing.
    pub fn from_operation(operation: &Value) -> Self {
        let error_reason = extract_failure_reason(operation);
        let done = operation.get("done").and_then(Value::as_bool).unwrap_or(false)
            || operation.get("error").is_some_and(|e| !e.is_null());

        let file_ref = if done {
            operation.get("response").and_then(extract_file_reference)
        } else {
            None
        };

        Self {
            done,
            file_ref,
            error_reason,
        }
    }

    pub fn has_video(&self) -> bool {
        self.file_ref.is_some()
    }

    /// Why no video is available, never empty.
    pub fn reason(&self) -> String {
        self.error_reason
            .clone()
            .unwrap_or_else(|| DEFAULT_NO_VIDEO_REASON.to_string())
    }
}
