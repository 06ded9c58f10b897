use super::{directory_from_env, process_env, EnvLookup, Platform};

use chrono::Utc;
use conveyor_common::constants::platform::gitlab;
use conveyor_sdk::{CommandSink, StdoutSink};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Characters GitLab does not accept in a section identifier.
static INVALID_SECTION_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_.-]+").expect("Invalid section regex"));

/// Erases the marker text so only the section title is displayed.
const ERASE_LINE: &str = "\r\x1b[0K";

/// GitLab CI, via `section_start` / `section_end` job log markers.
///
/// GitLab has no runtime masking command; secrets registered at run time are
/// masked by the engine's own loggers only.
pub struct GitLabCi {
    env: EnvLookup,
    sink: Arc<dyn CommandSink>,
    /// Innermost last. Shared by every caller, so groups must not be opened
    /// from concurrent branches.
    open_sections: Mutex<Vec<String>>,
}

impl GitLabCi {
    pub fn new() -> Self {
        Self::with(process_env(), Arc::new(StdoutSink))
    }

    pub fn with(env: EnvLookup, sink: Arc<dyn CommandSink>) -> Self {
        Self {
            env,
            sink,
            open_sections: Mutex::new(Vec::new()),
        }
    }

    fn section_id(name: &str) -> String {
        let base = INVALID_SECTION_CHARS
            .replace_all(&name.to_lowercase(), "_")
            .into_owned();
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{}_{}", base.trim_matches('_'), &suffix[..8])
    }
}

impl Default for GitLabCi {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for GitLabCi {
    fn name(&self) -> &str {
        gitlab::NAME
    }

    fn detect(&self) -> bool {
        (self.env)(gitlab::DETECT)
            .map(|value| value.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    fn working_directory(&self) -> anyhow::Result<PathBuf> {
        directory_from_env(&self.env, gitlab::PROJECT_DIR)
    }

    fn start_log_group(&self, name: &str) {
        let id = Self::section_id(name);
        self.sink.emit(&format!(
            "section_start:{}:{}{}{}",
            Utc::now().timestamp(),
            id,
            ERASE_LINE,
            name
        ));
        self.open_sections.lock().push(id);
    }

    fn end_log_group(&self) {
        let Some(id) = self.open_sections.lock().pop() else {
            tracing::debug!("end_log_group called with no open GitLab section");
            return;
        };
        self.sink.emit(&format!(
            "section_end:{}:{}{}",
            Utc::now().timestamp(),
            id,
            ERASE_LINE
        ));
    }

    fn obfuscate(&self, _secret_line: &str) {}

    fn supports_nested_groups(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::tests::env_of;
    use conveyor_sdk::CollectingSink;

    fn gitlab(pairs: &[(&str, &str)]) -> (GitLabCi, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::new());
        (GitLabCi::with(env_of(pairs), sink.clone()), sink)
    }

    fn section_of(line: &str) -> String {
        line.split(':').nth(2).unwrap().split('\r').next().unwrap().to_string()
    }

    #[test]
    fn detects_from_gitlab_ci_variable() {
        assert!(gitlab(&[("GITLAB_CI", "true")]).0.detect());
        assert!(!gitlab(&[("GITHUB_ACTIONS", "true")]).0.detect());
    }

    #[test]
    fn sections_nest_and_close_innermost_first() {
        let (platform, sink) = gitlab(&[]);
        platform.start_log_group("Build & Test");
        platform.start_log_group("Unit");
        platform.end_log_group();
        platform.end_log_group();
        platform.end_log_group();

        let lines = sink.lines();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("section_start:"));
        assert!(lines[0].ends_with("\r\x1b[0KBuild & Test"));
        assert!(section_of(&lines[0]).starts_with("build_test_"));
        assert_eq!(section_of(&lines[2]), section_of(&lines[1]));
        assert_eq!(section_of(&lines[3]), section_of(&lines[0]));
        assert!(lines[3].starts_with("section_end:"));
        assert!(platform.supports_nested_groups());
    }

    #[test]
    fn obfuscate_emits_nothing() {
        let (platform, sink) = gitlab(&[]);
        platform.obfuscate("hunter22");
        assert!(sink.lines().is_empty());
    }
}
