//! The write-message capability the engine displays diagnostics and monitor
//! lines through. Kept as a trait object so the core never depends on a
//! concrete GUI, log sink, or terminal.

/// A sink for human-readable lines. The GUI text pane, a terminal logger, or
/// a test double can all implement this.
pub trait MessageSink: Send + Sync {
    fn write_message(&self, line: &str);
}

/// Routes every line through the `log` crate at `info` level, for the
/// runnable binary.
pub struct LogSink;

impl MessageSink for LogSink {
    fn write_message(&self, line: &str) {
        log::info!("{line}");
    }
}

/// Collects every line in order, for tests.
#[derive(Default)]
pub struct RecordingSink {
    lines: std::sync::Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl MessageSink for RecordingSink {
    fn write_message(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }
}
