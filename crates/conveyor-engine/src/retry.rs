// Bounded retry with caller-supplied delays.

use crate::action::Action;
use crate::context::Context;
use crate::engine;
use crate::frame::FrameKind;

use anyhow::Result;
use async_trait::async_trait;
use conveyor_common::errors::is_configuration_error;
use std::future::Future;
use std::time::Duration;

/// Default first delay for exponential backoff.
const MIN_BACKOFF: Duration = Duration::from_secs(1);

/// Default cap for exponential backoff.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Multiplier for exponential growth.
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Attempt `op`, sleeping for the next delay after each failure, until it
/// succeeds or the delays run out. `op` runs at most `delays.len() + 1` times.
///
/// Configuration errors are returned at once: retrying cannot fix them.
pub async fn retry<T, F, Fut>(ctx: &Context, delays: &[Duration], mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let logger = ctx.logger();
    let mut remaining = delays.iter();
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    logger.info(&format!("Succeeded after {} attempts", attempt));
                }
                return Ok(value);
            }
            Err(err) if is_configuration_error(&err) => return Err(err),
            Err(err) => match remaining.next() {
                Some(delay) => {
                    logger.warning(&format!(
                        "Attempt {} failed: {:#}. Retrying in {:.1}s",
                        attempt,
                        err,
                        delay.as_secs_f64()
                    ));
                    tokio::time::sleep(*delay).await;
                    attempt += 1;
                }
                None => {
                    if attempt > 1 {
                        logger.error(&format!("Giving up after {} attempts", attempt));
                    }
                    return Err(err);
                }
            },
        }
    }
}

/// The delays between attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl RetryPolicy {
    /// One attempt, no retry.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn fixed(delays: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            delays: delays.into_iter().collect(),
        }
    }

    /// `retries` delays starting at `initial`, doubling each time, capped at `max`.
    pub fn exponential(initial: Duration, max: Duration, retries: usize) -> Self {
        let mut delays = Vec::with_capacity(retries);
        let mut current = initial.min(max);
        for _ in 0..retries {
            delays.push(current);
            let next_ms = (current.as_millis() as f64 * BACKOFF_MULTIPLIER) as u64;
            current = Duration::from_millis(next_ms).min(max);
        }
        Self { delays }
    }

    /// Exponential backoff from 1s, capped at 60s.
    pub fn backoff(retries: usize) -> Self {
        Self::exponential(MIN_BACKOFF, MAX_BACKOFF, retries)
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}

/// Re-run an action's full lifecycle until it succeeds or the policy is spent.
pub struct Retry<A> {
    action: A,
    policy: RetryPolicy,
}

impl<A> Retry<A> {
    pub fn new(action: A, policy: RetryPolicy) -> Self {
        Self { action, policy }
    }
}

#[async_trait]
impl<A: Action> Action for Retry<A> {
    type Output = A::Output;

    fn name(&self) -> String {
        "Retry".to_string()
    }

    fn kind(&self) -> FrameKind {
        FrameKind::Composite
    }

    async fn run(&self, ctx: &Context) -> Result<A::Output> {
        retry(ctx, self.policy.delays(), || engine::run(&self.action, ctx)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{action_fn, ActionExt};
    use crate::context::tests::test_context;
    use anyhow::anyhow;
    use conveyor_common::errors::{failed_action, ConfigurationError};
    use conveyor_sdk::LogLevel;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn no_delays_means_one_attempt() {
        let (ctx, _, _) = test_context();
        let calls = &AtomicUsize::new(0);

        let err = retry(&ctx, &[], || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(anyhow!("flaky"))
        })
        .await
        .unwrap_err();

        assert_eq!(err.to_string(), "flaky");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let value = retry(&ctx, &[], || async { Ok(3) }).await.unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_runs_n_plus_one_times_and_returns_last_error() {
        let (ctx, _, _) = test_context();
        let calls = &AtomicUsize::new(0);
        let delays = [Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)];
        let started = tokio::time::Instant::now();

        let err = retry(&ctx, &delays, || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Err::<(), _>(anyhow!("failure {n}"))
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(err.to_string(), "failure 4");
        assert!(started.elapsed() >= Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn success_after_failure_logs_attempt_count() {
        let (ctx, logger, _) = test_context();
        let calls = &AtomicUsize::new(0);

        let value = retry(&ctx, &[Duration::from_millis(100); 5], || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(anyhow!("connection reset"))
            } else {
                Ok("uploaded")
            }
        })
        .await
        .unwrap();

        assert_eq!(value, "uploaded");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(logger.contains(LogLevel::Warning, "connection reset"));
        assert!(logger.contains(LogLevel::Info, "Succeeded after 3 attempts"));
    }

    #[tokio::test(start_paused = true)]
    async fn configuration_errors_are_not_retried() {
        let (ctx, _, _) = test_context();
        let calls = &AtomicUsize::new(0);

        let err = retry(&ctx, &[Duration::from_secs(1); 3], || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ConfigurationError::MissingEnvironment("API_TOKEN".into()).into())
        })
        .await
        .unwrap_err();

        assert!(is_configuration_error(&err));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exponential_policy_doubles_up_to_cap() {
        let policy = RetryPolicy::exponential(Duration::from_secs(1), Duration::from_secs(5), 5);
        assert_eq!(
            policy.delays(),
            &[1, 2, 4, 5, 5].map(Duration::from_secs)
        );
        assert_eq!(RetryPolicy::backoff(7).delays().last(), Some(&MAX_BACKOFF));
        assert!(RetryPolicy::none().delays().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn retry_action_reruns_full_lifecycle() {
        let (ctx, _, _) = test_context();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let upload = action_fn("Upload", move |_| {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(anyhow!("503"))
                } else {
                    Ok(201)
                }
            }
        });

        let status = engine::run(
            &upload.retry(RetryPolicy::fixed([Duration::from_secs(1)])),
            &ctx,
        )
        .await
        .unwrap();
        assert_eq!(status, 201);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_action_names_the_inner_failure() {
        let (ctx, _, _) = test_context();
        let always = action_fn("Notify", |_| async { Err::<(), _>(anyhow!("webhook down")) });

        let err = engine::run(&always.retry(RetryPolicy::backoff(2)), &ctx)
            .await
            .unwrap_err();
        assert_eq!(failed_action(&err), Some("Notify"));
    }
}
