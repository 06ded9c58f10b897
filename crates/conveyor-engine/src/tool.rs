// Tools: external programs a pipeline installs on demand and removes at the end.
//
// Every tool an action requires is recorded, whether or not this run had to
// install it. Teardown walks the records in reverse and uninstalls whatever is
// still present. It never fails; problems are logged and reported.

use crate::action::Action;
use crate::context::Context;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use conveyor_sdk::Shell;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

#[async_trait]
pub trait Tool: Send + Sync {
    /// Identity in the registry. Two tools with the same name are the same tool.
    fn name(&self) -> &str;

    async fn is_installed(&self, ctx: &Context) -> Result<bool>;

    async fn install(&self, ctx: &Context) -> Result<()>;

    async fn uninstall(&self, ctx: &Context) -> Result<()>;
}

/// Outcome of `ToolRegistry::teardown_all`, in teardown order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub uninstalled: Vec<String>,
    /// Recorded but already gone at teardown.
    pub skipped: Vec<String>,
    /// `(tool, error)` for every failed check or uninstall.
    pub failed: Vec<(String, String)>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Tools touched during the run, in first-require order.
///
/// Each tool name has its own install lock, so a tool whose install requires
/// another tool does not wait on itself.
#[derive(Default)]
pub struct ToolRegistry {
    recorded: Mutex<Vec<Arc<dyn Tool>>>,
    installing: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_recorded(&self, name: &str) -> bool {
        self.recorded.lock().iter().any(|known| known.name() == name)
    }

    /// Make sure `tool` is installed and record it for teardown.
    ///
    /// The check, the install and the record for one tool name happen under
    /// that name's lock, so concurrent requires of the same tool install it at
    /// most once.
    pub async fn require(&self, ctx: &Context, tool: Arc<dyn Tool>) -> Result<()> {
        if self.is_recorded(tool.name()) {
            return Ok(());
        }

        let lock = Arc::clone(
            self.installing
                .entry(tool.name().to_string())
                .or_default()
                .value(),
        );
        let _guard = lock.lock().await;
        if self.is_recorded(tool.name()) {
            return Ok(());
        }

        let logger = ctx.logger();
        let installed = tool
            .is_installed(ctx)
            .await
            .with_context(|| format!("Failed to check whether '{}' is installed", tool.name()))?;

        if installed {
            logger.debug(&format!("Tool '{}' is already installed", tool.name()));
        } else {
            logger.info(&format!("Installing tool '{}'", tool.name()));
            tool.install(ctx)
                .await
                .with_context(|| format!("Failed to install tool '{}'", tool.name()))?;
        }

        self.recorded.lock().push(tool);
        Ok(())
    }

    /// Names of recorded tools, in first-require order.
    pub fn recorded(&self) -> Vec<String> {
        self.recorded
            .lock()
            .iter()
            .map(|tool| tool.name().to_string())
            .collect()
    }

    /// Uninstall every recorded tool that is still installed, newest first.
    /// The registry is empty afterwards, so a second call does nothing.
    pub async fn teardown_all(&self, ctx: &Context) -> TeardownReport {
        let tools = std::mem::take(&mut *self.recorded.lock());
        let logger = ctx.logger();
        let mut report = TeardownReport::default();

        for tool in tools.iter().rev() {
            let name = tool.name().to_string();
            match tool.is_installed(ctx).await {
                Ok(true) => match tool.uninstall(ctx).await {
                    Ok(()) => {
                        logger.info(&format!("Uninstalled tool '{}'", name));
                        report.uninstalled.push(name);
                    }
                    Err(err) => {
                        logger.warning(&format!("Failed to uninstall tool '{}': {:#}", name, err));
                        report.failed.push((name, format!("{err:#}")));
                    }
                },
                Ok(false) => {
                    logger.debug(&format!("Tool '{}' is already gone", name));
                    report.skipped.push(name);
                }
                Err(err) => {
                    logger.warning(&format!(
                        "Failed to check tool '{}' during teardown: {:#}",
                        name, err
                    ));
                    report.failed.push((name, format!("{err:#}")));
                }
            }
        }
        report
    }
}

/// A tool found on `PATH` and managed through shell commands.
pub struct CommandTool {
    name: String,
    executable: String,
    install: Vec<String>,
    uninstall: Vec<String>,
}

impl CommandTool {
    pub fn new(name: impl Into<String>, executable: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            executable: executable.into(),
            install: Vec::new(),
            uninstall: Vec::new(),
        }
    }

    /// Command line (program first) that installs the tool.
    pub fn install_with<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.install = command.into_iter().map(Into::into).collect();
        self
    }

    /// Command line (program first) that removes the tool.
    pub fn uninstall_with<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.uninstall = command.into_iter().map(Into::into).collect();
        self
    }

    async fn run_command(&self, ctx: &Context, command: &[String], verb: &str) -> Result<()> {
        let Some((program, args)) = command.split_first() else {
            anyhow::bail!("No {} command configured for tool '{}'", verb, self.name);
        };
        ctx.shell().run(program, args.iter().cloned()).await?;
        Ok(())
    }
}

#[async_trait]
impl Tool for CommandTool {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_installed(&self, _ctx: &Context) -> Result<bool> {
        Ok(Shell::find_executable(&self.executable).is_some())
    }

    async fn install(&self, ctx: &Context) -> Result<()> {
        self.run_command(ctx, &self.install, "install").await
    }

    async fn uninstall(&self, ctx: &Context) -> Result<()> {
        self.run_command(ctx, &self.uninstall, "uninstall").await
    }
}

/// Action form of `ToolRegistry::require`.
pub struct RequireTool {
    tool: Arc<dyn Tool>,
}

impl RequireTool {
    pub fn new(tool: Arc<dyn Tool>) -> Self {
        Self { tool }
    }
}

#[async_trait]
impl Action for RequireTool {
    type Output = ();

    fn name(&self) -> String {
        format!("Require {}", self.tool.name())
    }

    async fn run(&self, ctx: &Context) -> Result<()> {
        ctx.tools().require(ctx, Arc::clone(&self.tool)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::test_context;
    use crate::engine;
    use conveyor_sdk::{CommandRunner, Invocation, ShellError, ShellOutput};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// In-memory tool whose install state is a flag.
    struct FakeTool {
        name: &'static str,
        installed: AtomicBool,
        installs: AtomicUsize,
        uninstalls: AtomicUsize,
        fail_uninstall: bool,
        journal: Arc<Mutex<Vec<String>>>,
    }

    impl FakeTool {
        fn new(name: &'static str, installed: bool, journal: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                installed: AtomicBool::new(installed),
                installs: AtomicUsize::new(0),
                uninstalls: AtomicUsize::new(0),
                fail_uninstall: false,
                journal: Arc::clone(journal),
            })
        }

        fn broken(name: &'static str, journal: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                installed: AtomicBool::new(true),
                installs: AtomicUsize::new(0),
                uninstalls: AtomicUsize::new(0),
                fail_uninstall: true,
                journal: Arc::clone(journal),
            })
        }
    }

    #[async_trait]
    impl Tool for FakeTool {
        fn name(&self) -> &str {
            self.name
        }

        async fn is_installed(&self, _ctx: &Context) -> Result<bool> {
            Ok(self.installed.load(Ordering::SeqCst))
        }

        async fn install(&self, _ctx: &Context) -> Result<()> {
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.installs.fetch_add(1, Ordering::SeqCst);
            self.installed.store(true, Ordering::SeqCst);
            self.journal.lock().push(format!("install {}", self.name));
            Ok(())
        }

        async fn uninstall(&self, _ctx: &Context) -> Result<()> {
            self.uninstalls.fetch_add(1, Ordering::SeqCst);
            self.journal.lock().push(format!("uninstall {}", self.name));
            if self.fail_uninstall {
                anyhow::bail!("permission denied");
            }
            self.installed.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_requires_install_once() {
        let (ctx, _, _) = test_context();
        let journal = Arc::new(Mutex::new(Vec::new()));
        let jq = FakeTool::new("jq", false, &journal);
        let registry = ctx.tools();

        let requires = (0..5).map(|_| registry.require(&ctx, jq.clone()));
        for result in futures::future::join_all(requires).await {
            result.unwrap();
        }

        assert_eq!(jq.installs.load(Ordering::SeqCst), 1);
        assert_eq!(registry.recorded(), vec!["jq"]);
    }

    /// A tool whose install needs another tool first.
    struct Formula {
        manager: Arc<FakeTool>,
        installed: AtomicBool,
    }

    #[async_trait]
    impl Tool for Formula {
        fn name(&self) -> &str {
            "formula"
        }

        async fn is_installed(&self, _ctx: &Context) -> Result<bool> {
            Ok(self.installed.load(Ordering::SeqCst))
        }

        async fn install(&self, ctx: &Context) -> Result<()> {
            ctx.tools().require(ctx, self.manager.clone()).await?;
            self.installed.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn uninstall(&self, _ctx: &Context) -> Result<()> {
            self.installed.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn install_may_require_another_tool() {
        let (ctx, _, _) = test_context();
        let journal = Arc::new(Mutex::new(Vec::new()));
        let manager = FakeTool::new("brew", false, &journal);
        let formula = Arc::new(Formula {
            manager: manager.clone(),
            installed: AtomicBool::new(false),
        });

        tokio::time::timeout(Duration::from_secs(5), ctx.tools().require(&ctx, formula))
            .await
            .expect("nested require must not wait on itself")
            .unwrap();

        assert_eq!(manager.installs.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.tools().recorded(), vec!["brew", "formula"]);
    }

    #[tokio::test]
    async fn preinstalled_tools_are_recorded_and_torn_down() {
        let (ctx, _, _) = test_context();
        let journal = Arc::new(Mutex::new(Vec::new()));
        let git = FakeTool::new("git", true, &journal);

        engine::run(&RequireTool::new(git.clone()), &ctx).await.unwrap();
        assert_eq!(git.installs.load(Ordering::SeqCst), 0);

        let report = ctx.tools().teardown_all(&ctx).await;
        assert_eq!(report.uninstalled, vec!["git"]);
        assert_eq!(git.uninstalls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_runs_in_reverse_and_survives_failures() {
        let (ctx, logger, _) = test_context();
        let journal = Arc::new(Mutex::new(Vec::new()));
        let first = FakeTool::new("first", false, &journal);
        let broken = FakeTool::broken("broken", &journal);
        let gone = FakeTool::new("gone", false, &journal);
        let last = FakeTool::new("last", false, &journal);

        let registry = ctx.tools();
        for tool in [first.clone(), broken.clone(), gone.clone(), last.clone()] {
            registry.require(&ctx, tool).await.unwrap();
        }
        gone.installed.store(false, Ordering::SeqCst);
        journal.lock().clear();

        let report = registry.teardown_all(&ctx).await;

        assert_eq!(
            *journal.lock(),
            vec!["uninstall last", "uninstall broken", "uninstall first"]
        );
        assert_eq!(report.uninstalled, vec!["last", "first"]);
        assert_eq!(report.skipped, vec!["gone"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "broken");
        assert!(!report.is_clean());
        assert!(logger.contains(conveyor_sdk::LogLevel::Warning, "permission denied"));

        let again = registry.teardown_all(&ctx).await;
        assert_eq!(again, TeardownReport::default());
    }

    #[tokio::test]
    async fn install_failure_is_not_recorded() {
        struct Unavailable;

        #[async_trait]
        impl Tool for Unavailable {
            fn name(&self) -> &str {
                "unavailable"
            }
            async fn is_installed(&self, _ctx: &Context) -> Result<bool> {
                Ok(false)
            }
            async fn install(&self, _ctx: &Context) -> Result<()> {
                anyhow::bail!("404 from mirror")
            }
            async fn uninstall(&self, _ctx: &Context) -> Result<()> {
                Ok(())
            }
        }

        let (ctx, _, _) = test_context();
        let err = engine::run(&RequireTool::new(Arc::new(Unavailable)), &ctx)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("Failed to install tool 'unavailable': 404 from mirror"));
        assert!(ctx.tools().recorded().is_empty());
    }

    struct RecordingRunner {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn execute(&self, invocation: &Invocation) -> Result<ShellOutput, ShellError> {
            self.seen.lock().push(invocation.command_line());
            Ok(ShellOutput {
                status: 0,
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    #[tokio::test]
    async fn command_tool_runs_configured_commands() {
        let (ctx, _, _) = test_context();
        let runner = Arc::new(RecordingRunner {
            seen: Mutex::new(Vec::new()),
        });
        let ctx = ctx.with_shell(Shell::new(runner.clone()));
        let tool = CommandTool::new("terraform", "conveyor-test-no-such-binary")
            .install_with(["apt-get", "install", "-y", "terraform"])
            .uninstall_with(["apt-get", "remove", "-y", "terraform"]);

        assert!(!tool.is_installed(&ctx).await.unwrap());
        tool.install(&ctx).await.unwrap();
        tool.uninstall(&ctx).await.unwrap();

        assert_eq!(
            *runner.seen.lock(),
            vec![
                "apt-get install -y terraform",
                "apt-get remove -y terraform"
            ]
        );
    }

    #[tokio::test]
    async fn command_tool_without_uninstall_command_fails() {
        let (ctx, _, _) = test_context();
        let tool = CommandTool::new("make", "make");
        let err = tool.uninstall(&ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "No uninstall command configured for tool 'make'");
    }
}
