// Action: the unit of work in a pipeline.
//
// An action has a name, a `run` producing a typed output, and a `clean_up`
// that the engine calls exactly once after `run`, whatever happened. Actions
// compose into trees through the combinators in `compose`, `group` and `retry`.

use crate::compose::{OutputSlot, Recover, Sequence, StoreOutput, Then, Timeout};
use crate::context::Context;
use crate::frame::FrameKind;
use crate::group::Group;
use crate::retry::{Retry, RetryPolicy};

use anyhow::Result;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// A unit of work. Never call `run` directly; go through `engine::run` so the
/// frame is pushed and `clean_up` is honoured.
#[async_trait]
pub trait Action: Send + Sync {
    type Output: Send;

    /// Display name. Used in logs and in failure messages.
    fn name(&self) -> String;

    fn kind(&self) -> FrameKind {
        FrameKind::Action
    }

    async fn run(&self, ctx: &Context) -> Result<Self::Output>;

    /// Called once after `run`, with `run`'s error if it failed.
    async fn clean_up(&self, _ctx: &Context, _error: Option<&anyhow::Error>) -> Result<()> {
        Ok(())
    }
}

/// Type-erased action, for heterogeneous lists and dynamic trees.
pub type BoxAction<O> = Box<dyn Action<Output = O>>;

#[async_trait]
impl<A: Action + ?Sized> Action for Box<A> {
    type Output = A::Output;

    fn name(&self) -> String {
        (**self).name()
    }

    fn kind(&self) -> FrameKind {
        (**self).kind()
    }

    async fn run(&self, ctx: &Context) -> Result<Self::Output> {
        (**self).run(ctx).await
    }

    async fn clean_up(&self, ctx: &Context, error: Option<&anyhow::Error>) -> Result<()> {
        (**self).clean_up(ctx, error).await
    }
}

#[async_trait]
impl<A: Action + ?Sized> Action for Arc<A> {
    type Output = A::Output;

    fn name(&self) -> String {
        (**self).name()
    }

    fn kind(&self) -> FrameKind {
        (**self).kind()
    }

    async fn run(&self, ctx: &Context) -> Result<Self::Output> {
        (**self).run(ctx).await
    }

    async fn clean_up(&self, ctx: &Context, error: Option<&anyhow::Error>) -> Result<()> {
        (**self).clean_up(ctx, error).await
    }
}

/// An action backed by an async closure. The closure receives its own clone
/// of the context.
pub struct FnAction<F> {
    name: String,
    f: F,
}

/// Build an action from a name and an async closure.
pub fn action_fn<F, Fut, T>(name: impl Into<String>, f: F) -> FnAction<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T>> + Send,
    T: Send,
{
    FnAction {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<F, Fut, T> Action for FnAction<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T>> + Send,
    T: Send,
{
    type Output = T;

    fn name(&self) -> String {
        self.name.clone()
    }

    async fn run(&self, ctx: &Context) -> Result<T> {
        (self.f)(ctx.clone()).await
    }
}

/// Does nothing and succeeds.
#[derive(Debug, Clone, Default)]
pub struct Noop;

#[async_trait]
impl Action for Noop {
    type Output = ();

    fn name(&self) -> String {
        "Noop".to_string()
    }

    async fn run(&self, _ctx: &Context) -> Result<()> {
        Ok(())
    }
}

/// Builder-style combinators available on every action.
pub trait ActionExt: Action + Sized {
    /// Run `self`, then `next`; the result is `next`'s output.
    fn followed_by<B: Action>(self, next: B) -> Sequence<Self, B> {
        Sequence::new(self, next)
    }

    /// On failure, build a fallback from the error and run it instead.
    fn recover<F, R>(self, on_error: F) -> Recover<Self, F>
    where
        F: Fn(&anyhow::Error) -> R + Send + Sync,
        R: Action<Output = Self::Output>,
    {
        Recover::new(self, on_error)
    }

    /// Feed this action's output into `next`, which builds the action to run.
    fn then<F, N>(self, next: F) -> Then<Self, F>
    where
        F: Fn(Self::Output) -> N + Send + Sync,
        N: Action,
    {
        Then::new(self, next)
    }

    /// Deposit the output into `slot` for a later action to read.
    fn store_output(self, slot: OutputSlot<Self::Output>) -> StoreOutput<Self> {
        StoreOutput::new(self, slot)
    }

    /// Wrap in a named log group.
    fn grouped(self, name: impl Into<String>) -> Group<Self> {
        Group::new(name, self)
    }

    fn retry(self, policy: RetryPolicy) -> Retry<Self> {
        Retry::new(self, policy)
    }

    fn timeout(self, limit: Duration) -> Timeout<Self> {
        Timeout::new(self, limit)
    }

    fn boxed(self) -> BoxAction<Self::Output>
    where
        Self: 'static,
    {
        Box::new(self)
    }
}

impl<A: Action> ActionExt for A {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::test_context;
    use crate::engine;

    #[tokio::test]
    async fn fn_action_sees_scope_values() {
        let (ctx, _, _) = test_context();
        let action = action_fn("Where", |ctx: Context| async move {
            Ok(ctx
                .shell()
                .working_directory()
                .map(|dir| dir.display().to_string()))
        });

        let scoped = ctx.with_working_directory("/srv/app");
        let dir = engine::run(&action, &scoped).await.unwrap();
        assert_eq!(dir.as_deref(), Some("/srv/app"));
        assert_eq!(action.name(), "Where");
    }

    #[tokio::test]
    async fn boxed_actions_mix_in_one_list() {
        let (ctx, _, _) = test_context();
        let actions: Vec<BoxAction<u32>> = vec![
            action_fn("One", |_| async { Ok(1u32) }).boxed(),
            action_fn("Two", |_| async { Ok(2u32) }).boxed(),
        ];
        let mut total = 0;
        for action in &actions {
            total += engine::run(action, &ctx).await.unwrap();
        }
        assert_eq!(total, 3);
        assert_eq!(actions[1].name(), "Two");
    }

    #[tokio::test]
    async fn noop_succeeds() {
        let (ctx, _, _) = test_context();
        engine::run(&Noop, &ctx).await.unwrap();
    }
}
