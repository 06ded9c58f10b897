// Tracing infrastructure: per-component loggers with secret masking.

use crate::secret_masker::SecretMasker;
use chrono::Utc;
use conveyor_sdk::{LogLevel, Logger};
use std::sync::Arc;

/// Configuration for trace output.
#[derive(Debug, Clone)]
pub struct TraceSetting {
    /// Minimum severity level to emit.
    pub level: LogLevel,
    /// Whether to also print to stdout.
    pub print_to_stdout: bool,
}

impl Default for TraceSetting {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            print_to_stdout: false,
        }
    }
}

/// A logger that masks secrets before emitting lines.
///
/// Each component gets its own `MaskingLogger` with a specific name, but they
/// all share the same `SecretMasker`, so a secret registered anywhere is masked
/// everywhere from then on.
#[derive(Clone)]
pub struct MaskingLogger {
    name: String,
    secret_masker: Arc<SecretMasker>,
    setting: TraceSetting,
}

impl MaskingLogger {
    pub fn new(
        name: impl Into<String>,
        secret_masker: Arc<SecretMasker>,
        setting: TraceSetting,
    ) -> Self {
        Self {
            name: name.into(),
            secret_masker,
            setting,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn trace(&self, level: LogLevel, message: &str) {
        if level < self.setting.level {
            return;
        }

        let masked = self.secret_masker.mask_secrets(message);

        match level {
            LogLevel::Error => tracing::error!(component = %self.name, "{}", masked),
            LogLevel::Warning => tracing::warn!(component = %self.name, "{}", masked),
            LogLevel::Info => tracing::info!(component = %self.name, "{}", masked),
            LogLevel::Debug => tracing::debug!(component = %self.name, "{}", masked),
        }

        if self.setting.print_to_stdout {
            let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
            println!("[{}][{}] {:?}: {}", timestamp, self.name, level, masked);
        }
    }
}

impl Logger for MaskingLogger {
    fn info(&self, message: &str) {
        self.trace(LogLevel::Info, message);
    }

    fn debug(&self, message: &str) {
        self.trace(LogLevel::Debug, message);
    }

    fn warning(&self, message: &str) {
        self.trace(LogLevel::Warning, message);
    }

    fn error(&self, message: &str) {
        self.trace(LogLevel::Error, message);
    }
}

/// Hands out named `MaskingLogger`s that share one `SecretMasker`.
pub struct TraceManager {
    secret_masker: Arc<SecretMasker>,
    default_setting: TraceSetting,
}

impl TraceManager {
    pub fn new(secret_masker: Arc<SecretMasker>) -> Self {
        Self::with_setting(secret_masker, TraceSetting::default())
    }

    pub fn with_setting(secret_masker: Arc<SecretMasker>, setting: TraceSetting) -> Self {
        Self {
            secret_masker,
            default_setting: setting,
        }
    }

    /// Get (create) a named logger.
    pub fn get(&self, name: &str) -> MaskingLogger {
        MaskingLogger::new(
            name,
            Arc::clone(&self.secret_masker),
            self.default_setting.clone(),
        )
    }

    pub fn secret_masker(&self) -> &Arc<SecretMasker> {
        &self.secret_masker
    }
}
