//! Progress reporting.
//!
//! Components take an explicit `Reporter` instead of writing to a
//! process-global logger, so tests can capture output per instance and
//! `--quiet` stays a display-only concern: it suppresses progress lines
//! but never changes control flow or exit codes.

use std::sync::Mutex;

enum Sink {
    Stdout,
    Memory(Mutex<Vec<String>>),
}

pub struct Reporter {
    quiet: bool,
    sink: Sink,
}

impl Reporter {
    /// Reporter writing to stdout.
    pub fn stdout(quiet: bool) -> Self {
        Self {
            quiet,
            sink: Sink::Stdout,
        }
    }

    /// Reporter capturing lines in memory, for tests.
    pub fn memory() -> Self {
        Self {
            quiet: false,
            sink: Sink::Memory(Mutex::new(Vec::new())),
        }
    }

    /// Emit a progress line. Suppressed in quiet mode.
    pub fn progress(&self, line: &str) {
        if !self.quiet {
            self.emit(line);
        }
    }

    /// Emit a status line. Always shown.
    pub fn status(&self, line: &str) {
        self.emit(line);
    }

    /// Lines captured so far. Empty for stdout reporters.
    pub fn lines(&self) -> Vec<String> {
        match &self.sink {
            Sink::Stdout => Vec::new(),
            Sink::Memory(lines) => lines.lock().map(|l| l.clone()).unwrap_or_default(),
        }
    }

    fn emit(&self, line: &str) {
        match &self.sink {
            Sink::Stdout => println!("{line}"),
            Sink::Memory(lines) => {
                if let Ok(mut lines) = lines.lock() {
                    lines.push(line.to_string());
                }
            }
        }
    }
}
