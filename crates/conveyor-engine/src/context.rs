// Context: an immutable, cheaply cloned scope of typed values.
//
// A lookup checks this scope's overrides first and falls back to the Host's
// memoized default. Overriding produces a new scope; the parent is untouched,
// so concurrent branches never observe each other's overrides.

use crate::frame::Frame;
use crate::host::Host;
use crate::platform::Platform;
use crate::tool::ToolRegistry;

use conveyor_common::errors::ConfigurationError;
use conveyor_common::secret_masker::SecretMasker;
use conveyor_sdk::{FileAccessor, LocalFiles, Logger, Shell, StringUtil};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

/// A typed slot in the context store.
///
/// Implemented on a zero-sized marker type; the marker's `TypeId` is the key.
/// `default_value` runs at most once per host, against the root scope.
pub trait ContextKey: Send + Sync + 'static {
    type Value: Clone + Send + Sync + 'static;

    fn default_value(root: &Context) -> Self::Value;
}

type Overrides = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

/// A scope of context values. Cloning is cheap.
#[derive(Clone)]
pub struct Context {
    host: Arc<Host>,
    overrides: Arc<Overrides>,
}

impl Context {
    /// A scope with no overrides.
    pub fn root(host: Arc<Host>) -> Self {
        Self {
            host,
            overrides: Arc::new(HashMap::new()),
        }
    }

    pub fn host(&self) -> &Arc<Host> {
        &self.host
    }

    /// The innermost override for `K`, else its memoized default.
    pub fn get<K: ContextKey>(&self) -> K::Value {
        let overridden = self
            .overrides
            .get(&TypeId::of::<K>())
            .and_then(|value| value.downcast_ref::<K::Value>());
        match overridden {
            Some(value) => value.clone(),
            None => self.host.default_value::<K>(),
        }
    }

    pub fn is_overridden<K: ContextKey>(&self) -> bool {
        self.overrides.contains_key(&TypeId::of::<K>())
    }

    /// A child scope where `K` resolves to `value`.
    pub fn with<K: ContextKey>(&self, value: K::Value) -> Context {
        let mut overrides = Overrides::clone(&self.overrides);
        overrides.insert(TypeId::of::<K>(), Arc::new(value));
        Context {
            host: Arc::clone(&self.host),
            overrides: Arc::new(overrides),
        }
    }

    /// Run `op` in a child scope where `K` resolves to `value`. The override
    /// ends when `op` completes, however it completes.
    pub async fn scoped<K, F, Fut, T>(&self, value: K::Value, op: F) -> T
    where
        K: ContextKey,
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = T>,
    {
        op(self.with::<K>(value)).await
    }

    pub fn logger(&self) -> Arc<dyn Logger> {
        self.get::<LoggerKey>()
    }

    pub fn with_logger(&self, logger: Arc<dyn Logger>) -> Context {
        self.with::<LoggerKey>(logger)
    }

    pub fn shell(&self) -> Shell {
        self.get::<ShellKey>()
    }

    pub fn with_shell(&self, shell: Shell) -> Context {
        self.with::<ShellKey>(shell)
    }

    /// A child scope whose shell runs commands in `directory`.
    pub fn with_working_directory(&self, directory: impl Into<PathBuf>) -> Context {
        self.with::<ShellKey>(self.shell().in_directory(directory))
    }

    pub fn files(&self) -> Arc<dyn FileAccessor> {
        self.get::<FilesKey>()
    }

    pub fn with_files(&self, files: Arc<dyn FileAccessor>) -> Context {
        self.with::<FilesKey>(files)
    }

    /// The platform for this scope: an explicit override, else the host's
    /// detected platform.
    pub fn platform(&self) -> Result<Arc<dyn Platform>, ConfigurationError> {
        match self.get::<PlatformKey>() {
            Some(platform) => Ok(platform),
            None => self.host.platform(),
        }
    }

    pub fn with_platform(&self, platform: Arc<dyn Platform>) -> Context {
        self.with::<PlatformKey>(Some(platform))
    }

    pub fn tools(&self) -> Arc<ToolRegistry> {
        self.get::<ToolsKey>()
    }

    pub fn secret_masker(&self) -> Arc<SecretMasker> {
        self.get::<SecretMaskerKey>()
    }

    /// The frame of the innermost running action, if any.
    pub fn frame(&self) -> Option<Arc<Frame>> {
        self.get::<FrameKey>()
    }

    /// Register `text` as secret: every distinct line long enough to mask is
    /// added to the masker and announced to the platform exactly once.
    ///
    /// Returns the number of lines announced.
    pub fn register_secret(&self, text: &str) -> Result<usize, ConfigurationError> {
        let masker = self.secret_masker();
        let mut lines: Vec<&str> = Vec::new();
        for line in StringUtil::lines_without_cr(text) {
            if masker.is_maskable(line) && !lines.contains(&line) {
                lines.push(line);
            }
        }
        if lines.is_empty() {
            return Ok(0);
        }

        let platform = self.platform()?;
        for line in &lines {
            masker.add_value(line);
            platform.obfuscate(line);
        }
        Ok(lines.len())
    }
}

/// Logger for the current scope. Defaults to a masking logger from the host.
pub struct LoggerKey;

impl ContextKey for LoggerKey {
    type Value = Arc<dyn Logger>;

    fn default_value(root: &Context) -> Self::Value {
        Arc::new(root.host().get_logger("Pipeline"))
    }
}

/// Shell used to run external commands. Defaults to real child processes.
pub struct ShellKey;

impl ContextKey for ShellKey {
    type Value = Shell;

    fn default_value(_root: &Context) -> Self::Value {
        Shell::process()
    }
}

/// File accessor. Defaults to the local filesystem.
pub struct FilesKey;

impl ContextKey for FilesKey {
    type Value = Arc<dyn FileAccessor>;

    fn default_value(_root: &Context) -> Self::Value {
        Arc::new(LocalFiles)
    }
}

/// Explicit platform override. `None` means "use the detected platform".
pub struct PlatformKey;

impl ContextKey for PlatformKey {
    type Value = Option<Arc<dyn Platform>>;

    fn default_value(_root: &Context) -> Self::Value {
        None
    }
}

/// Registry of tools touched during the run.
pub struct ToolsKey;

impl ContextKey for ToolsKey {
    type Value = Arc<ToolRegistry>;

    fn default_value(root: &Context) -> Self::Value {
        Arc::clone(root.host().tools())
    }
}

/// Secret masker. Defaults to the host's, which every host logger shares.
pub struct SecretMaskerKey;

impl ContextKey for SecretMaskerKey {
    type Value = Arc<SecretMasker>;

    fn default_value(root: &Context) -> Self::Value {
        Arc::clone(root.host().secret_masker())
    }
}

/// Innermost running action.
pub struct FrameKey;

impl ContextKey for FrameKey {
    type Value = Option<Arc<Frame>>;

    fn default_value(_root: &Context) -> Self::Value {
        None
    }
}
