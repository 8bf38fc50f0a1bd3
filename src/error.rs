//! Error taxonomy and its HTTP mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, VeoError>;

#[derive(Debug, Error)]
pub enum VeoError {
    /// Neither `GEMINI_API_KEY` nor `GOOGLE_API_KEY` is set.
    #[error("Server missing GEMINI_API_KEY")]
    MissingApiKey,

    /// Missing or malformed caller input.
    #[error("{0}")]
    Validation(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Request body too large")]
    PayloadTooLarge,

    /// The operation exists but has not finished yet.
    #[error("Not ready")]
    NotReady,

    /// The operation finished without producing a video (e.g. a safety block),
    /// or no download stage could produce its bytes.
    #[error("{reason}")]
    NoVideo { reason: String },

    /// A vendor call failed. When raised after a fallback chain, `attempts`
    /// lists every suppressed failure as `"<strategy>: <message>"`.
    #[error("{message}")]
    Upstream {
        status: Option<u16>,
        message: String,
        attempts: Vec<String>,
    },

    /// Always built through `From`, which strips the request URL (it may
    /// carry the `key` query parameter).
    #[error("http error: {0}")]
    Http(reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl VeoError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
            attempts: Vec::new(),
        }
    }

    /// The HTTP status reported by the vendor, if this error came from a response.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            VeoError::Upstream { status, .. } => *status,
            VeoError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the vendor rejected the credential.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.upstream_status(), Some(401 | 403))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            VeoError::Validation(_) => StatusCode::BAD_REQUEST,
            VeoError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            VeoError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            VeoError::NotReady => StatusCode::ACCEPTED,
            VeoError::NoVideo { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            VeoError::MissingApiKey
            | VeoError::Upstream { .. }
            | VeoError::Http(_)
            | VeoError::Io(_)
            | VeoError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for VeoError {
    fn from(error: reqwest::Error) -> Self {
        VeoError::Http(error.without_url())
    }
}

impl IntoResponse for VeoError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("{self}");
            if let VeoError::Upstream { attempts, .. } = &self {
                for attempt in attempts {
                    log::error!("  suppressed: {attempt}");
                }
            }
        }

        let body = match &self {
            VeoError::NoVideo { reason } => {
                json!({ "error": "No video in response", "reason": reason, "done": true })
            }
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
