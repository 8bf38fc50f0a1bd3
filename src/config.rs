//! Environment-derived settings.

use crate::error::{Result, VeoError};
use std::{env, path::PathBuf};

/// Environment variables checked for the vendor credential, in order.
pub const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_API_KEY"];

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "veo-2.0-generate-001";
pub const DEFAULT_ASPECT_RATIO: &str = "9:16";
// base64 inflates source images by a third
pub const DEFAULT_MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq)]
pub struct VeoConfig {
    /// Absent keys are reported per request, not at startup.
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub default_aspect_ratio: String,
    pub max_body_bytes: usize,
    /// Where the SDK download stage stages video files.
    pub tmp_dir: PathBuf,
}

impl Default for VeoConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            default_aspect_ratio: DEFAULT_ASPECT_RATIO.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            tmp_dir: env::temp_dir(),
        }
    }
}

impl VeoConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset; an unparsable body limit falls back
    /// to the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        Self {
            api_key: API_KEY_VARS.iter().find_map(|key| var(*key)),
            api_base: var("VEO_API_BASE").unwrap_or(defaults.api_base),
            model: var("VEO_MODEL").unwrap_or(defaults.model),
            default_aspect_ratio: var("VEO_ASPECT_RATIO").unwrap_or(defaults.default_aspect_ratio),
            max_body_bytes: var("VEO_MAX_BODY_BYTES")
                .and_then(|value| value.parse().ok())
                .unwrap_or(defaults.max_body_bytes),
            tmp_dir: var("VEO_TMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.tmp_dir),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Returns the credential or the configuration error every endpoint reports.
    pub fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or(VeoError::MissingApiKey)
    }
}
