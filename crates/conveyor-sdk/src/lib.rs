// conveyor-sdk: Foundation layer for Conveyor pipelines.
// This crate has ZERO dependencies on other conveyor crates. It defines the narrow
// boundaries every action talks through: logging, raw platform output, shell
// invocation and file access.

pub mod files;
pub mod log;
pub mod shell;
pub mod sink;
pub mod string_util;

// Re-export commonly used items at crate root
pub use files::{FileAccessor, LocalFiles};
pub use log::{CollectingLogger, LogLevel, Logger, NullLogger, TracingLogger};
pub use shell::{CommandRunner, Invocation, ProcessRunner, Shell, ShellError, ShellOutput};
pub use sink::{CollectingSink, CommandSink, StdoutSink};
pub use string_util::StringUtil;
