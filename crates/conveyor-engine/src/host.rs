// Host: THE process-scoped state object.
// Owns the memoized context defaults, the secret masker, the tool registry and
// the platform selector. Created once at program start, torn down once at the end.

use crate::context::{Context, ContextKey};
use crate::platform::{self, Platform, PlatformSelector};
use crate::tool::ToolRegistry;

use conveyor_common::config::EngineSettings;
use conveyor_common::errors::ConfigurationError;
use conveyor_common::secret_masker::SecretMasker;
use conveyor_common::trace::{MaskingLogger, TraceManager, TraceSetting};
use conveyor_sdk::LogLevel;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::any::{Any, TypeId};
use std::sync::Arc;

type DefaultSlot = Arc<OnceCell<Arc<dyn Any + Send + Sync>>>;

/// Process-wide engine state.
///
/// Every `Context` points back at one `Host`. Values a context does not
/// override are read from here: computed on first access, cached for the
/// lifetime of the host.
pub struct Host {
    settings: EngineSettings,

    /// Memoized default per context key, keyed by the key's `TypeId`.
    defaults: DashMap<TypeId, DefaultSlot>,

    /// Secret masker shared by every logger the host hands out.
    secret_masker: Arc<SecretMasker>,

    /// Creates named, masking loggers.
    trace_manager: TraceManager,

    /// Tools touched during this run.
    tools: Arc<ToolRegistry>,

    /// Detects the CI platform on first use.
    platforms: PlatformSelector,
}

impl Host {
    /// A host with the given settings and the stock platform candidates.
    pub fn new(settings: EngineSettings) -> Result<Arc<Self>, ConfigurationError> {
        Self::builder().settings(settings).build()
    }

    pub fn builder() -> HostBuilder {
        HostBuilder::default()
    }

    /// A scope with no overrides.
    pub fn root_context(self: &Arc<Self>) -> Context {
        Context::root(Arc::clone(self))
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn secret_masker(&self) -> &Arc<SecretMasker> {
        &self.secret_masker
    }

    /// Get a masking logger for the given component name.
    pub fn get_logger(&self, name: &str) -> MaskingLogger {
        self.trace_manager.get(name)
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// The detected platform. Detection runs on the first call only.
    pub fn platform(&self) -> Result<Arc<dyn Platform>, ConfigurationError> {
        self.platforms.select()
    }

    /// The memoized default for `K`, computing it on first access.
    ///
    /// Defaults are computed against the root scope so an override active at
    /// the first read never leaks into the cached value.
    pub(crate) fn default_value<K: ContextKey>(self: &Arc<Self>) -> K::Value {
        let slot: DefaultSlot = {
            let entry = self
                .defaults
                .entry(TypeId::of::<K>())
                .or_insert_with(|| Arc::new(OnceCell::new()));
            Arc::clone(entry.value())
        };

        let value = slot.get_or_init(|| {
            let root = self.root_context();
            Arc::new(K::default_value(&root)) as Arc<dyn Any + Send + Sync>
        });

        match value.downcast_ref::<K::Value>() {
            Some(value) => value.clone(),
            None => unreachable!("default slots are keyed by the type of their value"),
        }
    }

    /// Whether the default for `K` has been computed yet.
    pub fn has_default<K: ContextKey>(&self) -> bool {
        self.defaults
            .get(&TypeId::of::<K>())
            .map(|slot| slot.get().is_some())
            .unwrap_or(false)
    }
}

/// Builder for `Host`.
#[derive(Default)]
pub struct HostBuilder {
    settings: Option<EngineSettings>,
    platforms: Option<Vec<Arc<dyn Platform>>>,
}

impl HostBuilder {
    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Replace the stock platform candidates. Order matters: first match wins.
    pub fn platforms(mut self, candidates: Vec<Arc<dyn Platform>>) -> Self {
        self.platforms = Some(candidates);
        self
    }

    pub fn build(self) -> Result<Arc<Host>, ConfigurationError> {
        let settings = self.settings.unwrap_or_default();
        let candidates = match self.platforms {
            Some(candidates) => candidates,
            None => platform::default_candidates(),
        };

        let platforms = match settings.forced_platform.as_deref() {
            Some(forced) => {
                let chosen = candidates
                    .iter()
                    .find(|candidate| candidate.name().eq_ignore_ascii_case(forced))
                    .cloned()
                    .ok_or_else(|| ConfigurationError::UnknownPlatform(forced.to_string()))?;
                PlatformSelector::fixed(chosen)
            }
            None => PlatformSelector::new(candidates),
        };

        let secret_masker = Arc::new(SecretMasker::with_min_length(settings.min_secret_length));
        let trace_setting = TraceSetting {
            level: if settings.debug {
                LogLevel::Debug
            } else {
                LogLevel::Info
            },
            print_to_stdout: settings.print_log_to_stdout,
        };
        let trace_manager = TraceManager::with_setting(Arc::clone(&secret_masker), trace_setting);

        Ok(Arc::new(Host {
            settings,
            defaults: DashMap::new(),
            secret_masker,
            trace_manager,
            tools: Arc::new(ToolRegistry::new()),
            platforms,
        }))
    }
}
