// conveyor-common: Shared services and infrastructure for Conveyor pipelines.
// Depends only on `conveyor-sdk`.

pub mod config;
pub mod constants;
pub mod errors;
pub mod logging;
pub mod secret_masker;
pub mod trace;

// ---------------------------------------------------------------------------
// Re-exports for convenient access
// ---------------------------------------------------------------------------

pub use config::EngineSettings;
pub use errors::{ActionFailure, CleanupFailure, ConfigurationError};
pub use secret_masker::SecretMasker;
pub use trace::{MaskingLogger, TraceManager, TraceSetting};
