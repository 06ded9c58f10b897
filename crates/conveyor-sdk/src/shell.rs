// Shell / process boundary.
// Every external command a pipeline runs goes through `Shell`, which captures
// stdout and stderr and turns a non-zero exit status into a structured `ShellError`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// A fully resolved command to execute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub working_directory: Option<PathBuf>,
    pub environment: HashMap<String, String>,
}

impl Invocation {
    /// Human-readable command line, used in logs and error messages.
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Failure at the shell boundary.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("Failed to start process '{program}'")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Exit code {status} returned from '{command}': {}", stderr.trim())]
    NonZeroExit {
        command: String,
        status: i32,
        stdout: String,
        stderr: String,
    },
}

impl ShellError {
    /// Exit status, when the process got far enough to produce one.
    pub fn status(&self) -> Option<i32> {
        match self {
            ShellError::Spawn { .. } => None,
            ShellError::NonZeroExit { status, .. } => Some(*status),
        }
    }
}

/// The swappable seam behind `Shell`. Implementations return the captured output
/// whatever the exit status; `Shell` decides what counts as failure.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn execute(&self, invocation: &Invocation) -> Result<ShellOutput, ShellError>;
}

/// Runs commands as child processes via `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn execute(&self, invocation: &Invocation) -> Result<ShellOutput, ShellError> {
        tracing::debug!("Starting process: {}", invocation.command_line());

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        if let Some(dir) = &invocation.working_directory {
            tracing::debug!("  Working directory: '{}'", dir.display());
            cmd.current_dir(dir);
        }
        cmd.envs(&invocation.environment);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|source| ShellError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;
        let pid = child.id().unwrap_or(0);

        let stdout_task = tokio::spawn(collect_output(child.stdout.take()));
        let stderr_task = tokio::spawn(collect_output(child.stderr.take()));

        let status = child.wait().await.map_err(|source| ShellError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        let status = status.code().unwrap_or(-1);

        tracing::debug!(
            "Finished process {pid} with exit code {status}, and elapsed time {:.2?}.",
            start.elapsed()
        );

        Ok(ShellOutput {
            status,
            stdout,
            stderr,
        })
    }
}

/// Drains the stream to EOF so the child never blocks on a full pipe.
/// Bytes that are not UTF-8 are replaced rather than ending the read.
async fn collect_output<R: AsyncRead + Unpin>(stream: Option<R>) -> String {
    let mut raw = Vec::new();
    if let Some(mut stream) = stream {
        if let Err(err) = stream.read_to_end(&mut raw).await {
            tracing::warn!("Failed to read process output: {err}");
        }
    }
    String::from_utf8_lossy(&raw).into_owned()
}

/// Command executor with a working directory and environment.
///
/// `Shell` is a cheap value: deriving a shell for another directory returns a new
/// value and leaves the original untouched, which is what lets a context override
/// the working directory for one subtree only.
#[derive(Clone)]
pub struct Shell {
    runner: Arc<dyn CommandRunner>,
    working_directory: Option<PathBuf>,
    environment: HashMap<String, String>,
}

impl fmt::Debug for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shell")
            .field("working_directory", &self.working_directory)
            .field("environment", &self.environment.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for Shell {
    fn default() -> Self {
        Self::process()
    }
}

impl Shell {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            working_directory: None,
            environment: HashMap::new(),
        }
    }

    /// A shell that spawns real child processes.
    pub fn process() -> Self {
        Self::new(Arc::new(ProcessRunner))
    }

    /// Same runner and environment, different working directory.
    pub fn in_directory(&self, directory: impl Into<PathBuf>) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
            working_directory: Some(directory.into()),
            environment: self.environment.clone(),
        }
    }

    /// Same shell with one more environment variable set for every command.
    pub fn with_env(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut environment = self.environment.clone();
        environment.insert(key.into(), value.into());
        Self {
            runner: Arc::clone(&self.runner),
            working_directory: self.working_directory.clone(),
            environment,
        }
    }

    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    pub fn environment(&self) -> &HashMap<String, String> {
        &self.environment
    }

    /// Build the invocation this shell would execute.
    pub fn invocation<I, S>(&self, program: &str, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            working_directory: self.working_directory.clone(),
            environment: self.environment.clone(),
        }
    }

    /// Run a command; a non-zero exit status is an error.
    pub async fn run<I, S>(&self, program: &str, args: I) -> Result<ShellOutput, ShellError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let invocation = self.invocation(program, args);
        let output = self.runner.execute(&invocation).await?;
        if !output.success() {
            return Err(ShellError::NonZeroExit {
                command: invocation.command_line(),
                status: output.status,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }

    /// Run a command and hand back its output whatever the exit status.
    pub async fn run_unchecked<I, S>(
        &self,
        program: &str,
        args: I,
    ) -> Result<ShellOutput, ShellError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let invocation = self.invocation(program, args);
        self.runner.execute(&invocation).await
    }

    /// Run a script through the platform's command interpreter.
    pub async fn run_script(&self, script: &str) -> Result<ShellOutput, ShellError> {
        #[cfg(windows)]
        {
            self.run("cmd", ["/C", script]).await
        }
        #[cfg(not(windows))]
        {
            self.run("sh", ["-c", script]).await
        }
    }

    /// Locate an executable on `PATH`.
    pub fn find_executable(program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}
