// engine::run: the one primitive every action goes through.
//
// Pushes a frame for the action, runs it, then calls clean_up exactly once.
// The first action to fail names itself on the error; enclosing actions leave
// that name alone.

use crate::action::Action;
use crate::context::{Context, FrameKey};
use crate::frame::{Frame, FrameKind};

use anyhow::Result;
use conveyor_common::errors::{ActionFailure, CleanupFailure};
use std::sync::Arc;

/// Run `action` in a child scope of `ctx` carrying its frame.
pub async fn run<A: Action + ?Sized>(action: &A, ctx: &Context) -> Result<A::Output> {
    let name = action.name();
    let kind = action.kind();
    let frame = Arc::new(Frame::new(name.clone(), kind, ctx.frame()));
    let traced = kind != FrameKind::Composite;
    let path = frame.path();
    let scope = ctx.with::<FrameKey>(Some(frame));
    let logger = scope.logger();

    if traced {
        logger.debug(&format!("Starting '{}'", path));
    }

    let result = action.run(&scope).await;
    let cleanup = action.clean_up(&scope, result.as_ref().err()).await;

    match (result, cleanup) {
        (Ok(output), Ok(())) => {
            if traced {
                logger.debug(&format!("Finished '{}'", path));
            }
            Ok(output)
        }
        (Ok(_), Err(err)) => Err(name_failure(err, || CleanupFailure { action: name })),
        (Err(err), Ok(())) => Err(name_failure(err, || ActionFailure { action: name })),
        (Err(err), Err(cleanup_err)) => {
            logger.warning(&format!(
                "Cleanup of '{}' failed after the action itself failed: {:#}",
                path, cleanup_err
            ));
            Err(name_failure(err, || ActionFailure { action: name }))
        }
    }
}

/// Attach `failure` unless an inner action already named itself.
fn name_failure<C, F>(err: anyhow::Error, failure: F) -> anyhow::Error
where
    C: std::fmt::Display + Send + Sync + 'static,
    F: FnOnce() -> C,
{
    if err.downcast_ref::<ActionFailure>().is_some() || err.downcast_ref::<CleanupFailure>().is_some()
    {
        err
    } else {
        err.context(failure())
    }
}
