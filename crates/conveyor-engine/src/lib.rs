// conveyor-engine: the pipeline execution engine.
// Depends on `conveyor-sdk` and `conveyor-common`.
//
// Architecture:
//   Pipeline::run → engine::run(root action)
//     → Action::run / Action::clean_up, one Frame per action
//     → combinators (Sequence, Recover, Group, ...) recurse through engine::run
//   Ambient services (logger, shell, files, platform, tools, secret masker)
//   are looked up through the Context store, backed by the process-wide Host.

pub mod action;
pub mod compose;
pub mod context;
pub mod engine;
pub mod frame;
pub mod group;
pub mod host;
pub mod pipeline;
pub mod platform;
pub mod retry;
pub mod secret;
pub mod tool;

pub use action::{action_fn, Action, ActionExt, BoxAction, FnAction, Noop};
pub use compose::{Either, OutputSlot, Recover, Sequence, SequenceMany, StoreOutput, Then, Timeout};
pub use context::{Context, ContextKey};
pub use frame::{Frame, FrameKind};
pub use group::Group;
pub use host::{Host, HostBuilder};
pub use pipeline::Pipeline;
pub use platform::{Platform, PlatformSelector};
pub use retry::{retry, Retry, RetryPolicy};
pub use secret::{Secret, SecretSource, TypedSecret};
pub use tool::{CommandTool, RequireTool, TeardownReport, Tool, ToolRegistry};
