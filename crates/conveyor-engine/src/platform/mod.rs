// CI platform adapters.
//
// A platform knows how to recognise itself from the environment, where the
// checkout lives, and how to speak the CI system's log protocol: collapsible
// groups and runtime secret masking.

mod buildkite;
mod github;
mod gitlab;
mod local;

pub use buildkite::Buildkite;
pub use github::GitHubActions;
pub use gitlab::GitLabCi;
pub use local::Local;

use conveyor_common::errors::ConfigurationError;
use once_cell::sync::OnceCell;
use std::path::PathBuf;
use std::sync::Arc;

/// Reads one environment variable. Injected so platforms can be tested
/// without touching the process environment.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Lookup against the real process environment.
pub fn process_env() -> EnvLookup {
    Arc::new(|name: &str| std::env::var(name).ok())
}

pub trait Platform: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the current environment is this platform.
    fn detect(&self) -> bool;

    /// Root of the checked-out repository.
    fn working_directory(&self) -> anyhow::Result<PathBuf>;

    /// Open a collapsible section in the job log.
    ///
    /// A CI log is one stream, so groups are for sequential use: each
    /// `end_log_group` closes the most recently opened group. Branches that
    /// run concurrently must not open groups of their own.
    fn start_log_group(&self, name: &str);

    fn end_log_group(&self);

    /// Ask the platform to hide one line of secret text in its own log.
    fn obfuscate(&self, secret_line: &str);

    fn supports_nested_groups(&self) -> bool {
        false
    }
}

/// Picks the first candidate whose `detect` succeeds. Detection runs once;
/// the answer is cached for the selector's lifetime.
pub struct PlatformSelector {
    candidates: Vec<Arc<dyn Platform>>,
    selected: OnceCell<Arc<dyn Platform>>,
}

impl PlatformSelector {
    pub fn new(candidates: Vec<Arc<dyn Platform>>) -> Self {
        Self {
            candidates,
            selected: OnceCell::new(),
        }
    }

    /// A selector whose answer is fixed up front.
    pub fn fixed(platform: Arc<dyn Platform>) -> Self {
        Self {
            candidates: vec![Arc::clone(&platform)],
            selected: OnceCell::with_value(platform),
        }
    }

    pub fn select(&self) -> Result<Arc<dyn Platform>, ConfigurationError> {
        self.selected
            .get_or_try_init(|| {
                for candidate in &self.candidates {
                    if candidate.detect() {
                        tracing::info!(platform = candidate.name(), "Detected CI platform");
                        return Ok(Arc::clone(candidate));
                    }
                }
                Err(ConfigurationError::NoPlatformDetected {
                    candidates: self
                        .candidates
                        .iter()
                        .map(|candidate| candidate.name().to_string())
                        .collect(),
                })
            })
            .map(Arc::clone)
    }

    pub fn candidate_names(&self) -> Vec<&str> {
        self.candidates.iter().map(|c| c.name()).collect()
    }
}

/// The stock candidates in detection order. `Local` detects unconditionally,
/// so it is last.
pub fn default_candidates() -> Vec<Arc<dyn Platform>> {
    vec![
        Arc::new(GitHubActions::new()),
        Arc::new(GitLabCi::new()),
        Arc::new(Buildkite::new()),
        Arc::new(Local::new()),
    ]
}

/// Working directory from a variable the platform guarantees to set.
/// Missing or blank is a configuration error, never a silent default.
pub(crate) fn directory_from_env(env: &EnvLookup, variable: &str) -> anyhow::Result<PathBuf> {
    match env(variable).filter(|value| !value.trim().is_empty()) {
        Some(value) => Ok(PathBuf::from(value)),
        None => Err(ConfigurationError::MissingEnvironment(variable.to_string()).into()),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Environment lookup backed by a fixed map.
    pub(crate) fn env_of(pairs: &[(&str, &str)]) -> EnvLookup {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Arc::new(move |name: &str| map.get(name).cloned())
    }

    /// Platform that records every call.
    pub(crate) struct RecordingPlatform {
        name: String,
        detects: bool,
        nesting: bool,
        detect_calls: AtomicUsize,
        events: Mutex<Vec<String>>,
        obfuscated: Mutex<Vec<String>>,
    }

    impl RecordingPlatform {
        pub(crate) fn new(name: &str, detects: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                detects,
                nesting: false,
                detect_calls: AtomicUsize::new(0),
                events: Mutex::new(Vec::new()),
                obfuscated: Mutex::new(Vec::new()),
            })
        }

        /// Always detects and can nest groups.
        pub(crate) fn nesting(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                detects: true,
                nesting: true,
                detect_calls: AtomicUsize::new(0),
                events: Mutex::new(Vec::new()),
                obfuscated: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn detect_calls(&self) -> usize {
            self.detect_calls.load(Ordering::SeqCst)
        }

        pub(crate) fn events(&self) -> Vec<String> {
            self.events.lock().clone()
        }

        pub(crate) fn obfuscated(&self) -> Vec<String> {
            self.obfuscated.lock().clone()
        }
    }

    impl Platform for RecordingPlatform {
        fn name(&self) -> &str {
            &self.name
        }

        fn detect(&self) -> bool {
            self.detect_calls.fetch_add(1, Ordering::SeqCst);
            self.detects
        }

        fn working_directory(&self) -> anyhow::Result<PathBuf> {
            Ok(PathBuf::from("/work"))
        }

        fn start_log_group(&self, name: &str) {
            self.events.lock().push(format!("start {name}"));
        }

        fn end_log_group(&self) {
            self.events.lock().push("end".to_string());
        }

        fn obfuscate(&self, secret_line: &str) {
            self.obfuscated.lock().push(secret_line.to_string());
        }

        fn supports_nested_groups(&self) -> bool {
            self.nesting
        }
    }

    #[test]
    fn first_detecting_candidate_wins_and_is_cached() {
        let first = RecordingPlatform::new("first", false);
        let second = RecordingPlatform::new("second", true);
        let selector = PlatformSelector::new(vec![first.clone(), second.clone()]);

        assert_eq!(selector.select().unwrap().name(), "second");
        assert_eq!(selector.select().unwrap().name(), "second");
        assert_eq!(first.detect_calls(), 1);
        assert_eq!(second.detect_calls(), 1);
    }

    #[test]
    fn no_detection_lists_candidates() {
        let selector = PlatformSelector::new(vec![
            RecordingPlatform::new("first", false),
            RecordingPlatform::new("second", false),
        ]);

        let err = selector.select().err().unwrap();
        assert_eq!(
            err,
            ConfigurationError::NoPlatformDetected {
                candidates: vec!["first".into(), "second".into()],
            }
        );
    }

    #[test]
    fn fixed_selector_never_detects() {
        let platform = RecordingPlatform::new("pinned", false);
        let selector = PlatformSelector::fixed(platform.clone());
        assert_eq!(selector.select().unwrap().name(), "pinned");
        assert_eq!(platform.detect_calls(), 0);
        assert_eq!(selector.candidate_names(), vec!["pinned"]);
    }

    #[test]
    fn local_is_the_last_resort() {
        let names: Vec<String> = default_candidates()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["github", "gitlab", "buildkite", "local"]);
    }

    #[test]
    fn directory_requires_the_platform_variable() {
        let env = env_of(&[("CHECKOUT", "/builds/app"), ("BLANK", " ")]);
        assert_eq!(
            directory_from_env(&env, "CHECKOUT").unwrap(),
            PathBuf::from("/builds/app")
        );
        for missing in ["MISSING", "BLANK"] {
            let err = directory_from_env(&env, missing).unwrap_err();
            assert_eq!(
                err.downcast_ref::<ConfigurationError>(),
                Some(&ConfigurationError::MissingEnvironment(missing.to_string()))
            );
        }
    }
}
