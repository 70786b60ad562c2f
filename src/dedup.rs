//! Consecutive line-event suppression
//!
//! Tight loops over a single line would otherwise flood the log with
//! records carrying no new information. Only application-code line events
//! are ever suppressed; every other event kind always forwards.

use crate::event::EventKind;
use std::path::{Path, PathBuf};

/// Suppresses a line event repeating the immediately preceding forwarded one
#[derive(Debug, Default)]
pub struct LineDeduplicator {
    last: Option<(PathBuf, u32)>,
    suppressed: u64,
}

impl LineDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this event should be forwarded to the writer
    ///
    /// State is overwritten only when a line event is forwarded, so a run of
    /// identical (path, line) observations collapses to its first record.
    pub fn should_forward(
        &mut self,
        kind: EventKind,
        path: Option<&Path>,
        line: u32,
        is_application_code: bool,
    ) -> bool {
        if kind != EventKind::Line || !is_application_code {
            return true;
        }
        let Some(path) = path else {
            return true;
        };
        if let Some((last_path, last_line)) = &self.last {
            if last_path == path && *last_line == line {
                self.suppressed += 1;
                return false;
            }
        }
        self.last = Some((path.to_path_buf(), line));
        true
    }

    /// Total line events suppressed this session
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }
}
