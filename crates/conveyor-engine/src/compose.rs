// Combinators: actions built from other actions.
//
// Every child runs through engine::run, so each gets its own frame and its
// own clean_up. Combinators report FrameKind::Composite and stay out of the
// trace log.

use crate::action::Action;
use crate::context::Context;
use crate::engine;
use crate::frame::FrameKind;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Run `first`, then `second`. Output is `second`'s. `second` never runs if
/// `first` fails.
pub struct Sequence<A, B> {
    first: A,
    second: B,
}

impl<A, B> Sequence<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

#[async_trait]
impl<A: Action, B: Action> Action for Sequence<A, B> {
    type Output = B::Output;

    fn name(&self) -> String {
        "Sequence".to_string()
    }

    fn kind(&self) -> FrameKind {
        FrameKind::Composite
    }

    async fn run(&self, ctx: &Context) -> Result<B::Output> {
        engine::run(&self.first, ctx).await?;
        engine::run(&self.second, ctx).await
    }
}

/// Run each action in order, collecting outputs. Stops at the first failure.
pub struct SequenceMany<A> {
    actions: Vec<A>,
}

impl<A> SequenceMany<A> {
    pub fn new(actions: Vec<A>) -> Self {
        Self { actions }
    }

    /// One action per item.
    pub fn for_each<I, F>(items: I, build: F) -> Self
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> A,
    {
        Self::new(items.into_iter().map(build).collect())
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl<A> From<Vec<A>> for SequenceMany<A> {
    fn from(actions: Vec<A>) -> Self {
        Self::new(actions)
    }
}

#[async_trait]
impl<A: Action> Action for SequenceMany<A> {
    type Output = Vec<A::Output>;

    fn name(&self) -> String {
        "SequenceMany".to_string()
    }

    fn kind(&self) -> FrameKind {
        FrameKind::Composite
    }

    async fn run(&self, ctx: &Context) -> Result<Vec<A::Output>> {
        let mut outputs = Vec::with_capacity(self.actions.len());
        for action in &self.actions {
            outputs.push(engine::run(action, ctx).await?);
        }
        Ok(outputs)
    }
}

/// One of two actions, chosen when the tree is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Either<A, B> {
    First(A),
    Second(B),
}

impl<A, B> Either<A, B> {
    /// `First(first)` when `condition` holds, else `Second(second)`.
    pub fn when(condition: bool, first: A, second: B) -> Self {
        if condition {
            Either::First(first)
        } else {
            Either::Second(second)
        }
    }
}

impl<T> Either<T, T> {
    pub fn into_inner(self) -> T {
        match self {
            Either::First(value) | Either::Second(value) => value,
        }
    }
}

#[async_trait]
impl<A: Action, B: Action> Action for Either<A, B> {
    type Output = Either<A::Output, B::Output>;

    fn name(&self) -> String {
        "Either".to_string()
    }

    fn kind(&self) -> FrameKind {
        FrameKind::Composite
    }

    async fn run(&self, ctx: &Context) -> Result<Self::Output> {
        match self {
            Either::First(action) => Ok(Either::First(engine::run(action, ctx).await?)),
            Either::Second(action) => Ok(Either::Second(engine::run(action, ctx).await?)),
        }
    }
}

/// An action included only when present.
#[async_trait]
impl<A: Action> Action for Option<A> {
    type Output = Option<A::Output>;

    fn name(&self) -> String {
        "Optional".to_string()
    }

    fn kind(&self) -> FrameKind {
        FrameKind::Composite
    }

    async fn run(&self, ctx: &Context) -> Result<Self::Output> {
        match self {
            Some(action) => Ok(Some(engine::run(action, ctx).await?)),
            None => Ok(None),
        }
    }
}

/// On failure of `action`, log a warning and run the fallback `on_error`
/// builds from the error. If the fallback fails, its error surfaces.
pub struct Recover<A, F> {
    action: A,
    on_error: F,
}

impl<A, F> Recover<A, F> {
    pub fn new(action: A, on_error: F) -> Self {
        Self { action, on_error }
    }
}

#[async_trait]
impl<A, F, R> Action for Recover<A, F>
where
    A: Action,
    F: Fn(&anyhow::Error) -> R + Send + Sync,
    R: Action<Output = A::Output>,
{
    type Output = A::Output;

    fn name(&self) -> String {
        "Recover".to_string()
    }

    fn kind(&self) -> FrameKind {
        FrameKind::Composite
    }

    async fn run(&self, ctx: &Context) -> Result<A::Output> {
        match engine::run(&self.action, ctx).await {
            Ok(output) => Ok(output),
            Err(err) => {
                ctx.logger()
                    .warning(&format!("Recovering from failure: {:#}", err));
                let fallback = (self.on_error)(&err);
                engine::run(&fallback, ctx).await
            }
        }
    }
}

/// Run `action`, hand its output to `next` and run the action it returns.
pub struct Then<A, F> {
    action: A,
    next: F,
}

impl<A, F> Then<A, F> {
    pub fn new(action: A, next: F) -> Self {
        Self { action, next }
    }
}

#[async_trait]
impl<A, F, N> Action for Then<A, F>
where
    A: Action,
    F: Fn(A::Output) -> N + Send + Sync,
    N: Action,
{
    type Output = N::Output;

    fn name(&self) -> String {
        "Then".to_string()
    }

    fn kind(&self) -> FrameKind {
        FrameKind::Composite
    }

    async fn run(&self, ctx: &Context) -> Result<N::Output> {
        let output = engine::run(&self.action, ctx).await?;
        let next = (self.next)(output);
        engine::run(&next, ctx).await
    }
}

/// A write-once-per-run cell that carries an output from one action to a
/// later one. Clones share the same cell.
pub struct OutputSlot<T> {
    value: Arc<Mutex<Option<T>>>,
}

impl<T> Clone for OutputSlot<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
        }
    }
}

impl<T> Default for OutputSlot<T> {
    fn default() -> Self {
        Self {
            value: Arc::new(Mutex::new(None)),
        }
    }
}

impl<T> OutputSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: T) {
        *self.value.lock() = Some(value);
    }

    pub fn take(&self) -> Option<T> {
        self.value.lock().take()
    }

    pub fn is_filled(&self) -> bool {
        self.value.lock().is_some()
    }
}

impl<T: Clone> OutputSlot<T> {
    pub fn get(&self) -> Option<T> {
        self.value.lock().clone()
    }
}

/// Run `action` and deposit its output into a slot.
pub struct StoreOutput<A: Action> {
    action: A,
    slot: OutputSlot<A::Output>,
}

impl<A: Action> StoreOutput<A> {
    pub fn new(action: A, slot: OutputSlot<A::Output>) -> Self {
        Self { action, slot }
    }
}

#[async_trait]
impl<A: Action> Action for StoreOutput<A> {
    type Output = ();

    fn name(&self) -> String {
        "StoreOutput".to_string()
    }

    fn kind(&self) -> FrameKind {
        FrameKind::Composite
    }

    async fn run(&self, ctx: &Context) -> Result<()> {
        let output = engine::run(&self.action, ctx).await?;
        self.slot.set(output);
        Ok(())
    }
}

/// The deadline passed before the action finished.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Timed out after {0:?}")]
pub struct TimedOut(pub Duration);

/// Fail `action` if it runs longer than `limit`.
///
/// Takes over the wrapped action's frame: only `run` is bounded, and the
/// action's own `clean_up` still runs afterwards with the timeout error.
pub struct Timeout<A> {
    action: A,
    limit: Duration,
}

impl<A> Timeout<A> {
    pub fn new(action: A, limit: Duration) -> Self {
        Self { action, limit }
    }

    pub fn inner(&self) -> &A {
        &self.action
    }
}

#[async_trait]
impl<A: Action> Action for Timeout<A> {
    type Output = A::Output;

    fn name(&self) -> String {
        self.action.name()
    }

    fn kind(&self) -> FrameKind {
        self.action.kind()
    }

    async fn run(&self, ctx: &Context) -> Result<A::Output> {
        match tokio::time::timeout(self.limit, self.action.run(ctx)).await {
            Ok(result) => result,
            Err(_) => Err(TimedOut(self.limit).into()),
        }
    }

    async fn clean_up(&self, ctx: &Context, error: Option<&anyhow::Error>) -> Result<()> {
        self.action.clean_up(ctx, error).await
    }
}
