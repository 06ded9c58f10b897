// EngineSettings: engine-wide knobs loaded from a JSON file and/or the environment.

use crate::constants::{self, DEFAULT_MIN_SECRET_LENGTH};
use crate::errors::ConfigurationError;

use anyhow::{Context, Result};
use conveyor_sdk::StringUtil;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineSettings {
    /// Secret lines shorter than this are not masked.
    pub min_secret_length: usize,

    /// Echo engine log lines to stdout in addition to the tracing subscriber.
    pub print_log_to_stdout: bool,

    /// Emit debug-level lines from action loggers.
    pub debug: bool,

    /// Skip detection and use the named platform (`github`, `gitlab`, `buildkite`, `local`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forced_platform: Option<String>,

    /// `EnvFilter` directives for the tracing subscriber.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            min_secret_length: DEFAULT_MIN_SECRET_LENGTH,
            print_log_to_stdout: false,
            debug: false,
            forced_platform: None,
            log_filter: None,
        }
    }
}

impl EngineSettings {
    /// Defaults overlaid with `CONVEYOR_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        let mut settings = Self::default();
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Load settings from a JSON file, then overlay the environment.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {:?}", path))?;
        let mut settings: EngineSettings = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings from {:?}", path))?;
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Overlay values from `lookup` (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        use constants::settings as keys;

        if let Some(value) = lookup(keys::MIN_SECRET_LENGTH) {
            self.min_secret_length =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigurationError::InvalidSetting {
                        setting: keys::MIN_SECRET_LENGTH.to_string(),
                        value: value.clone(),
                    })?;
        }
        if let Some(value) = lookup(keys::PRINT_LOG_TO_STDOUT) {
            self.print_log_to_stdout = parse_bool(keys::PRINT_LOG_TO_STDOUT, &value)?;
        }
        if let Some(value) = lookup(keys::DEBUG) {
            self.debug = parse_bool(keys::DEBUG, &value)?;
        }
        if let Some(value) = lookup(keys::PLATFORM).filter(|v| !v.trim().is_empty()) {
            self.forced_platform = Some(value.trim().to_lowercase());
        }
        if let Some(value) = lookup(keys::LOG_FILTER).filter(|v| !v.trim().is_empty()) {
            self.log_filter = Some(value);
        }
        Ok(())
    }
}

fn parse_bool(setting: &str, value: &str) -> Result<bool, ConfigurationError> {
    StringUtil::convert_to_bool(value).ok_or_else(|| ConfigurationError::InvalidSetting {
        setting: setting.to_string(),
        value: value.to_string(),
    })
}
