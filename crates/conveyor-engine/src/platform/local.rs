use super::Platform;

use conveyor_common::constants::platform::local;
use conveyor_sdk::{CommandSink, StdoutSink};
use std::path::PathBuf;
use std::sync::Arc;

/// A developer machine. Always detects.
pub struct Local {
    sink: Arc<dyn CommandSink>,
}

impl Local {
    pub fn new() -> Self {
        Self::with(Arc::new(StdoutSink))
    }

    pub fn with(sink: Arc<dyn CommandSink>) -> Self {
        Self { sink }
    }
}

impl Default for Local {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for Local {
    fn name(&self) -> &str {
        local::NAME
    }

    fn detect(&self) -> bool {
        true
    }

    fn working_directory(&self) -> anyhow::Result<PathBuf> {
        Ok(std::env::current_dir()?)
    }

    fn start_log_group(&self, name: &str) {
        self.sink.emit(&format!("==> {name}"));
    }

    fn end_log_group(&self) {}

    fn obfuscate(&self, _secret_line: &str) {}
}
