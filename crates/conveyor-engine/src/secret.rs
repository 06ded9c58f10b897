// Secrets: lazily fetched sensitive values.
//
// A Secret is a recipe (where the bytes come from, how they are transformed),
// not a value. Resolving it through `get` registers the resulting text with
// the masker and the platform before anyone can log it.

use crate::context::Context;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use conveyor_common::errors::ConfigurationError;
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

/// Where a secret's raw bytes come from.
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// A description safe to log. Never includes the value.
    fn describe(&self) -> String;

    async fn fetch(&self, ctx: &Context) -> Result<Vec<u8>>;
}

struct EnvSource {
    variable: String,
}

#[async_trait]
impl SecretSource for EnvSource {
    fn describe(&self) -> String {
        format!("env:{}", self.variable)
    }

    async fn fetch(&self, _ctx: &Context) -> Result<Vec<u8>> {
        match std::env::var_os(&self.variable) {
            Some(value) => os_bytes(value, &self.variable),
            None => Err(ConfigurationError::MissingEnvironment(self.variable.clone()).into()),
        }
    }
}

#[cfg(unix)]
fn os_bytes(value: std::ffi::OsString, _variable: &str) -> Result<Vec<u8>> {
    use std::os::unix::ffi::OsStringExt;
    Ok(value.into_vec())
}

#[cfg(not(unix))]
fn os_bytes(value: std::ffi::OsString, variable: &str) -> Result<Vec<u8>> {
    match value.into_string() {
        Ok(text) => Ok(text.into_bytes()),
        Err(_) => Err(ConfigurationError::InvalidSetting {
            setting: variable.to_string(),
            value: "<non-Unicode value>".to_string(),
        }
        .into()),
    }
}

struct FileSource {
    path: PathBuf,
}

#[async_trait]
impl SecretSource for FileSource {
    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }

    async fn fetch(&self, ctx: &Context) -> Result<Vec<u8>> {
        ctx.files().read(&self.path).await
    }
}

struct LiteralSource {
    value: Vec<u8>,
}

#[async_trait]
impl SecretSource for LiteralSource {
    fn describe(&self) -> String {
        "literal".to_string()
    }

    async fn fetch(&self, _ctx: &Context) -> Result<Vec<u8>> {
        Ok(self.value.clone())
    }
}

type Transform = dyn Fn(Vec<u8>) -> Result<Vec<u8>> + Send + Sync;

struct TransformSource {
    inner: Arc<dyn SecretSource>,
    label: String,
    transform: Arc<Transform>,
}

#[async_trait]
impl SecretSource for TransformSource {
    fn describe(&self) -> String {
        format!("{}({})", self.label, self.inner.describe())
    }

    async fn fetch(&self, ctx: &Context) -> Result<Vec<u8>> {
        let raw = self.inner.fetch(ctx).await?;
        (self.transform)(raw).with_context(|| format!("Failed to {} secret", self.label))
    }
}

/// A sensitive value, resolved on demand. Cloning shares the recipe.
#[derive(Clone)]
pub struct Secret {
    source: Arc<dyn SecretSource>,
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({})", self.source.describe())
    }
}

impl Secret {
    pub fn from_source(source: Arc<dyn SecretSource>) -> Self {
        Self { source }
    }

    /// Read from an environment variable. Missing is a configuration error.
    pub fn from_env(variable: impl Into<String>) -> Self {
        Self::from_source(Arc::new(EnvSource {
            variable: variable.into(),
        }))
    }

    /// Read a file through the context's file accessor.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self::from_source(Arc::new(FileSource { path: path.into() }))
    }

    pub fn from_value(value: impl Into<Vec<u8>>) -> Self {
        Self::from_source(Arc::new(LiteralSource {
            value: value.into(),
        }))
    }

    pub fn describe(&self) -> String {
        self.source.describe()
    }

    /// A secret whose bytes are `transform` applied to this one's.
    pub fn transform<F>(&self, label: impl Into<String>, transform: F) -> Secret
    where
        F: Fn(Vec<u8>) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        Self::from_source(Arc::new(TransformSource {
            inner: Arc::clone(&self.source),
            label: label.into(),
            transform: Arc::new(transform),
        }))
    }

    /// Standard base64, surrounding whitespace ignored.
    pub fn base64_decode(&self) -> Secret {
        self.transform("base64-decode", |raw| {
            let text = String::from_utf8_lossy(&raw);
            Ok(STANDARD.decode(text.trim())?)
        })
    }

    /// Interpret the bytes as JSON of type `T`.
    pub fn decode_as<T: DeserializeOwned>(&self) -> TypedSecret<T> {
        TypedSecret {
            secret: self.clone(),
            _marker: PhantomData,
        }
    }

    /// Fetch and transform the bytes. Textual results are registered for
    /// masking line by line before they are returned.
    pub async fn get(&self, ctx: &Context) -> Result<Vec<u8>> {
        let bytes = self
            .source
            .fetch(ctx)
            .await
            .with_context(|| format!("Failed to resolve secret {}", self.describe()))?;

        match std::str::from_utf8(&bytes) {
            Ok(text) => {
                ctx.register_secret(text)?;
            }
            Err(_) => ctx.logger().debug(&format!(
                "Secret {} is binary; not registered for masking",
                self.describe()
            )),
        }
        Ok(bytes)
    }

    pub async fn get_string(&self, ctx: &Context) -> Result<String> {
        let bytes = self.get(ctx).await?;
        String::from_utf8(bytes)
            .with_context(|| format!("Secret {} is not valid UTF-8", self.describe()))
    }
}

/// A secret decoded into `T` on resolution.
pub struct TypedSecret<T> {
    secret: Secret,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for TypedSecret<T> {
    fn clone(&self) -> Self {
        Self {
            secret: self.secret.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> TypedSecret<T> {
    /// Every string inside the document is registered for masking before
    /// the decoded value is returned.
    pub async fn get(&self, ctx: &Context) -> Result<T> {
        let bytes = self.secret.get(ctx).await?;
        let document: serde_json::Value = serde_json::from_slice(&bytes)
            .with_context(|| format!("Secret {} is not valid JSON", self.secret.describe()))?;
        register_strings(ctx, &document)?;
        serde_json::from_value(document).with_context(|| {
            format!("Secret {} does not match the expected shape", self.secret.describe())
        })
    }
}

fn register_strings(ctx: &Context, value: &serde_json::Value) -> Result<()> {
    match value {
        serde_json::Value::String(text) => {
            ctx.register_secret(text)?;
        }
        serde_json::Value::Array(items) => {
            for item in items {
                register_strings(ctx, item)?;
            }
        }
        serde_json::Value::Object(fields) => {
            for field in fields.values() {
                register_strings(ctx, field)?;
            }
        }
        _ => {}
    }
    Ok(())
}
