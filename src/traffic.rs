//! Operator-facing output.
//!
//! Traffic lines and heartbeat markers go to stdout; diagnostics go through
//! `tracing` on stderr, so the two streams can be redirected separately.

use std::cell::{Cell, RefCell};
use std::fmt::Write as _;
use std::io::{self, Write};

/// Format bytes as lowercase two-digit hex separated by single spaces.
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    for (i, byte) in data.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Sink for what the tools show the operator.
pub trait OperatorLog {
    /// One line: `<label>: <hex dump of data>`.
    fn traffic(&self, label: &str, data: &[u8]);

    /// A single progress marker.
    fn heartbeat(&self);
}

/// Writes to the process's stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutLog;

impl OperatorLog for StdoutLog {
    fn traffic(&self, label: &str, data: &[u8]) {
        let mut out = io::stdout().lock();
        let _ = writeln!(out, "{label}: {}", hex_dump(data));
    }

    fn heartbeat(&self) {
        let mut out = io::stdout().lock();
        let _ = out.write_all(b".");
        let _ = out.flush();
    }
}

/// Keeps everything in memory, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryLog {
    lines: RefCell<Vec<String>>,
    heartbeats: Cell<usize>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Traffic lines recorded so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }

    /// Heartbeat markers recorded so far.
    pub fn heartbeats(&self) -> usize {
        self.heartbeats.get()
    }
}

impl OperatorLog for MemoryLog {
    fn traffic(&self, label: &str, data: &[u8]) {
        self.lines
            .borrow_mut()
            .push(format!("{label}: {}", hex_dump(data)));
    }

    fn heartbeat(&self) {
        self.heartbeats.set(self.heartbeats.get() + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_dump() {
        assert_eq!(hex_dump(&[0x01, 0x02, 0x03]), "01 02 03");
        assert_eq!(hex_dump(&[0xff, 0x00, 0xab]), "ff 00 ab");
        assert_eq!(hex_dump(&[]), "");
    }

    #[test]
    fn test_memory_log() {
        let log = MemoryLog::new();
        log.traffic("[A --> E]", &[1, 2, 3]);
        log.heartbeat();
        log.heartbeat();

        assert_eq!(log.lines(), vec!["[A --> E]: 01 02 03".to_string()]);
        assert_eq!(log.heartbeats(), 2);
    }
}
