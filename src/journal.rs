//! Recent-error journal attached to user-facing failure notifications
//!
//! Failure events carry a human-readable diagnostic drawn from the last few
//! error lines recorded anywhere in the core. The journal is a bounded ring
//! shared by cloning; recording a line also emits it through `tracing` so the
//! normal log pipeline sees it too.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Default journal capacity in lines
const JOURNAL_CAPACITY: usize = 256;

/// Shared bounded ring of recent diagnostic lines
#[derive(Debug, Clone)]
pub struct LogJournal {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl LogJournal {
    /// Create a journal with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(JOURNAL_CAPACITY)
    }

    /// Create a journal holding at most `capacity` lines
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    /// Record an error line and forward it to the log pipeline
    pub fn record(&self, line: impl Into<String>) {
        let line = line.into();
        tracing::error!("{line}");
        if let Ok(mut lines) = self.lines.lock() {
            if lines.len() == self.capacity {
                lines.pop_front();
            }
            lines.push_back(line);
        }
    }

    /// Join the last `count` recorded lines, oldest first
    ///
    /// Returns an empty string when nothing has been recorded since the last
    /// [`flush`](Self::flush).
    pub fn tail(&self, count: usize) -> String {
        match self.lines.lock() {
            Ok(lines) => {
                let skip = lines.len().saturating_sub(count);
                lines
                    .iter()
                    .skip(skip)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            Err(_) => String::new(),
        }
    }

    /// Number of lines currently held
    pub fn len(&self) -> usize {
        self.lines.lock().map(|l| l.len()).unwrap_or(0)
    }

    /// Whether the journal holds no lines
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discard all recorded lines
    ///
    /// Called right before starting an Analyzer so a subsequent failure
    /// notification only carries lines from that attempt.
    pub fn flush(&self) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.clear();
        }
    }
}

impl Default for LogJournal {
    fn default() -> Self {
        Self::new()
    }
}
