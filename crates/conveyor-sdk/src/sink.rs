// Raw output channel used by platforms for workflow directives
// (group markers, mask registrations). Lines written here bypass secret masking.

use std::io::Write;

/// Destination for raw platform directives.
pub trait CommandSink: Send + Sync {
    fn emit(&self, line: &str);
}

/// Writes each directive as its own line on the process stdout, which is
/// where CI agents look for them.
#[derive(Debug, Clone, Default)]
pub struct StdoutSink;

impl CommandSink for StdoutSink {
    fn emit(&self, line: &str) {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        let _ = writeln!(handle, "{line}");
        let _ = handle.flush();
    }
}

/// Keeps directives in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    lines: parking_lot::Mutex<Vec<String>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl CommandSink for CollectingSink {
    fn emit(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}
