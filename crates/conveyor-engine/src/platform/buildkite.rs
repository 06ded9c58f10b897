use super::{directory_from_env, process_env, EnvLookup, Platform};

use conveyor_common::constants::platform::buildkite;
use conveyor_sdk::{CommandSink, StdoutSink};
use std::path::PathBuf;
use std::sync::Arc;

/// Buildkite. Groups are `---` headers, which Buildkite cannot nest and
/// closes implicitly when the next header starts.
pub struct Buildkite {
    env: EnvLookup,
    sink: Arc<dyn CommandSink>,
}

impl Buildkite {
    pub fn new() -> Self {
        Self::with(process_env(), Arc::new(StdoutSink))
    }

    pub fn with(env: EnvLookup, sink: Arc<dyn CommandSink>) -> Self {
        Self { env, sink }
    }
}

impl Default for Buildkite {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for Buildkite {
    fn name(&self) -> &str {
        buildkite::NAME
    }

    fn detect(&self) -> bool {
        (self.env)(buildkite::DETECT)
            .map(|value| value.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    fn working_directory(&self) -> anyhow::Result<PathBuf> {
        directory_from_env(&self.env, buildkite::CHECKOUT_PATH)
    }

    fn start_log_group(&self, name: &str) {
        self.sink.emit(&format!("--- {name}"));
    }

    fn end_log_group(&self) {}

    fn obfuscate(&self, _secret_line: &str) {}
}
