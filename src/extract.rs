//! Normalization of vendor JSON whose shape drifts between API versions.
//!
//! Every function here is total: missing, null or renamed fields yield `None`,
//! never a panic or an error.

use crate::model::FileReference;
use serde_json::Value;

/// Key paths that may carry an operation name, highest priority first.
const OPERATION_NAME_PATHS: [&str; 7] = [
    "/name",
    "/operation/name",
    "/metadata/name",
    "/response/name",
    "/operationName",
    "/operationId",
    "/id",
];

/// List fields whose first item may be a generated video, highest priority first.
/// `generatedSamples` is the REST spelling of `generatedVideos`.
const VIDEO_LIST_KEYS: [&str; 3] = ["generatedVideos", "generatedSamples", "videos"];

const SINGLE_VIDEO_KEYS: [&str; 2] = ["video", "generatedVideo"];

/// Returns the first non-empty operation name found in `response`.
pub fn extract_operation_name(response: &Value) -> Option<String> {
    OPERATION_NAME_PATHS
        .iter()
        .find_map(|path| identifier(response.pointer(path)?))
}

fn identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Returns the reference to the first generated video in an operation's
/// `response` payload.
pub fn extract_file_reference(response: &Value) -> Option<FileReference> {
    let response = response
        .get("generateVideoResponse")
        .filter(|nested| nested.is_object())
        .unwrap_or(response);

    let from_lists = VIDEO_LIST_KEYS.iter().find_map(|key| {
        let first = response.get(key)?.as_array()?.first()?;
        video_of(first)
    });

    from_lists.or_else(|| {
        SINGLE_VIDEO_KEYS
            .iter()
            .find_map(|key| video_of(response.get(key)?))
    })
}

// A list item is either the video itself or a wrapper holding it under `video`.
fn video_of(item: &Value) -> Option<FileReference> {
    match item.get("video") {
        Some(video) => FileReference::from_value(video),
        None => FileReference::from_value(item),
    }
}

/// Returns the vendor's explanation for a finished operation without video.
pub fn extract_failure_reason(operation: &Value) -> Option<String> {
    if let Some(reason) = operation.get("error").and_then(error_message) {
        return Some(reason);
    }

    let response = operation.get("response")?;
    let levels = [response.get("generateVideoResponse"), Some(response)];

    levels.iter().flatten().find_map(|level| {
        let reasons: Vec<&str> = level
            .get("raiMediaFilteredReasons")
            .and_then(Value::as_array)
            .map(|reasons| {
                reasons
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|r| !r.trim().is_empty())
                    .collect()
            })
            .unwrap_or_default();
        if !reasons.is_empty() {
            return Some(reasons.join("; "));
        }

        match level.get("raiMediaFilteredCount").and_then(Value::as_u64) {
            Some(count) if count > 0 => {
                Some(format!("{count} video(s) filtered by content safety"))
            }
            _ => None,
        }
    })
}

fn error_message(error: &Value) -> Option<String> {
    match error {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Object(_) => error
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.trim().is_empty())
            .map(str::to_string),
        _ => None,
    }
}
