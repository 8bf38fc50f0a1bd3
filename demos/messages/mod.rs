use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    pub image_base64: String,
    pub image_mime: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartResponse {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub done: bool,
    #[serde(default)]
    pub has_video: Option<bool>,
    #[serde(default)]
    pub reason: Option<String>,
}
