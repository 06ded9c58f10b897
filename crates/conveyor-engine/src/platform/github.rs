use super::{directory_from_env, process_env, EnvLookup, Platform};

use conveyor_common::constants::platform::github;
use conveyor_sdk::{CommandSink, StdoutSink};
use std::path::PathBuf;
use std::sync::Arc;

struct EscapeMapping {
    token: &'static str,
    replacement: &'static str,
}

/// Workflow command data escapes. `%` must be replaced first.
const ESCAPE_DATA_MAPPINGS: &[EscapeMapping] = &[
    EscapeMapping { token: "%",  replacement: "%25" },
    EscapeMapping { token: "\r", replacement: "%0D" },
    EscapeMapping { token: "\n", replacement: "%0A" },
];

fn escape_data(value: &str) -> String {
    let mut escaped = value.to_string();
    for mapping in ESCAPE_DATA_MAPPINGS {
        escaped = escaped.replace(mapping.token, mapping.replacement);
    }
    escaped
}

/// GitHub Actions, via `::` workflow commands on stdout.
pub struct GitHubActions {
    env: EnvLookup,
    sink: Arc<dyn CommandSink>,
}

impl GitHubActions {
    pub fn new() -> Self {
        Self::with(process_env(), Arc::new(StdoutSink))
    }

    pub fn with(env: EnvLookup, sink: Arc<dyn CommandSink>) -> Self {
        Self { env, sink }
    }
}

impl Default for GitHubActions {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for GitHubActions {
    fn name(&self) -> &str {
        github::NAME
    }

    fn detect(&self) -> bool {
        (self.env)(github::DETECT)
            .map(|value| value.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    fn working_directory(&self) -> anyhow::Result<PathBuf> {
        directory_from_env(&self.env, github::WORKSPACE)
    }

    fn start_log_group(&self, name: &str) {
        self.sink.emit(&format!("::group::{}", escape_data(name)));
    }

    fn end_log_group(&self) {
        self.sink.emit("::endgroup::");
    }

    fn obfuscate(&self, secret_line: &str) {
        self.sink
            .emit(&format!("::add-mask::{}", escape_data(secret_line)));
    }
}
