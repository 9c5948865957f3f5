use crate::settings::{
    error::SettingsError, validated::ValidatedSettings, validator::SettingsValidator,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod error;
pub mod validated;
pub mod validator;

/// Raw, user-supplied batch settings as read from a JSON document.
///
/// Every field is optional and falls back to the defaults in
/// [`validated`]. Numbers are signed so that `0` or `-5` surface as
/// configuration errors rather than parse errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchSettings {
    pub chunk_size: Option<i64>,
    pub page_size: Option<i64>,
    pub partition_count: Option<i64>,
    pub chunk_workers: Option<i64>,
    pub partition_workers: Option<i64>,
    pub stale_after_secs: Option<i64>,
    pub stale_after_days: Option<i64>,
    pub shutdown_timeout_secs: Option<i64>,
    pub retry: Option<RetrySettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: Option<i64>,
    pub base_delay_ms: Option<i64>,
    pub max_delay_ms: Option<i64>,
}

impl BatchSettings {
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> Result<ValidatedSettings, SettingsError> {
        SettingsValidator::new().validate(self)
    }
}
