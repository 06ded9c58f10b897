// Pipeline: runs a top-level action against a Host and always tears down
// the tools it touched, whatever the outcome.

use crate::action::Action;
use crate::context::Context;
use crate::engine;
use crate::host::Host;
use crate::tool::TeardownReport;

use anyhow::Result;
use conveyor_common::config::EngineSettings;
use conveyor_common::logging;
use std::sync::Arc;

pub struct Pipeline {
    host: Arc<Host>,
}

impl Pipeline {
    pub fn new(host: Arc<Host>) -> Self {
        Self { host }
    }

    /// Settings from `CONVEYOR_*` variables, global tracing installed, stock
    /// platform candidates.
    pub fn from_env() -> Result<Self> {
        let settings = EngineSettings::from_env()?;
        logging::init(&settings);
        Ok(Self::new(Host::new(settings)?))
    }

    pub fn host(&self) -> &Arc<Host> {
        &self.host
    }

    /// Run `action` from a fresh root scope.
    pub async fn run<A: Action + ?Sized>(&self, action: &A) -> Result<A::Output> {
        let ctx = self.host.root_context();
        self.run_in(&ctx, action).await
    }

    /// Run `action` in `ctx`, then tear down every recorded tool.
    ///
    /// Teardown problems are logged and never change the result.
    pub async fn run_in<A: Action + ?Sized>(&self, ctx: &Context, action: &A) -> Result<A::Output> {
        let logger = ctx.logger();
        let name = action.name();
        logger.info(&format!("Starting pipeline '{}'", name));

        let result = engine::run(action, ctx).await;
        match &result {
            Ok(_) => logger.info(&format!("Pipeline '{}' succeeded", name)),
            Err(err) => {
                logger.error(&format!("Pipeline '{}' failed", name));
                logger.error_chain(err);
            }
        }

        let report = self.teardown(ctx).await;
        if !report.is_clean() {
            logger.warning(&format!(
                "{} tool(s) could not be removed during teardown",
                report.failed.len()
            ));
        }
        result
    }

    async fn teardown(&self, ctx: &Context) -> TeardownReport {
        ctx.tools().teardown_all(ctx).await
    }
}
