/// Logging abstraction handed to every action through the context store.
///
/// Implementations decide where lines go (the `tracing` crate, a buffer, nowhere).
/// Secret masking is layered on top in `conveyor-common`.
pub trait Logger: Send + Sync {
    /// Log an informational message.
    fn info(&self, message: &str);

    /// Log a debug message.
    fn debug(&self, message: &str);

    /// Log a warning message.
    fn warning(&self, message: &str) {
        self.info(&format!("warning: {message}"));
    }

    /// Log an error message.
    fn error(&self, message: &str) {
        self.info(&format!("error: {message}"));
    }

    /// Log an error together with its full cause chain, one cause per line.
    fn error_chain(&self, err: &anyhow::Error) {
        self.error(&format!("{err}"));
        for cause in err.chain().skip(1) {
            self.error(&format!("  caused by: {cause}"));
        }
    }
}

/// Forwards every line to the `tracing` crate at the matching level.
#[derive(Debug, Clone, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, message: &str) {
        tracing::info!("{}", message);
    }

    fn debug(&self, message: &str) {
        tracing::debug!("{}", message);
    }

    fn warning(&self, message: &str) {
        tracing::warn!("{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!("{}", message);
    }
}

/// Discards everything.
#[derive(Debug, Clone, Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn info(&self, _message: &str) {}
    fn debug(&self, _message: &str) {}
    fn warning(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// Severity of a line, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// Buffers every line in memory, in order. Used heavily in tests to assert on
/// what an action reported.
#[derive(Debug, Default)]
pub struct CollectingLogger {
    lines: parking_lot::Mutex<Vec<(LogLevel, String)>>,
}

impl CollectingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all collected lines.
    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        self.lines.lock().clone()
    }

    /// Just the message text, in order.
    pub fn messages(&self) -> Vec<String> {
        self.lines.lock().iter().map(|(_, m)| m.clone()).collect()
    }

    /// Whether any line at `level` contains `needle`.
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.lines
            .lock()
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }

    fn push(&self, level: LogLevel, message: &str) {
        self.lines.lock().push((level, message.to_string()));
    }
}

impl Logger for CollectingLogger {
    fn info(&self, message: &str) {
        self.push(LogLevel::Info, message);
    }

    fn debug(&self, message: &str) {
        self.push(LogLevel::Debug, message);
    }

    fn warning(&self, message: &str) {
        self.push(LogLevel::Warning, message);
    }

    fn error(&self, message: &str) {
        self.push(LogLevel::Error, message);
    }
}
