use crate::action::Action;
use crate::context::Context;
use crate::engine;
use crate::frame::FrameKind;

use anyhow::Result;
use async_trait::async_trait;

/// Run an action inside a named, collapsible section of the platform log.
///
/// When already inside another group and the platform cannot nest sections,
/// no new section is opened and the action simply runs inside the outer one.
pub struct Group<A> {
    name: String,
    action: A,
}

impl<A> Group<A> {
    pub fn new(name: impl Into<String>, action: A) -> Self {
        Self {
            name: name.into(),
            action,
        }
    }
}

#[async_trait]
impl<A: Action> Action for Group<A> {
    type Output = A::Output;

    fn name(&self) -> String {
        self.name.clone()
    }

    fn kind(&self) -> FrameKind {
        FrameKind::Group
    }

    async fn run(&self, ctx: &Context) -> Result<A::Output> {
        let platform = ctx.platform()?;
        let nested = ctx
            .frame()
            .map(|frame| frame.enclosing_group().is_some())
            .unwrap_or(false);
        let open = !nested || platform.supports_nested_groups();

        if open {
            platform.start_log_group(&self.name);
        } else {
            ctx.logger()
                .debug(&format!("Not opening nested group '{}'", self.name));
        }

        let result = engine::run(&self.action, ctx).await;

        if open {
            platform.end_log_group();
        }
        result
    }
}
