//! Lazy per-file source line cache
//!
//! Files are read once on first request and retained for the session
//! lifetime. Read failures propagate as recoverable errors so the engine
//! can degrade to an error marker instead of aborting.

use anyhow::{Context, Result};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Memoized source file contents, one entry per file
#[derive(Debug, Default)]
pub struct SourceLineCache {
    files: HashMap<PathBuf, Vec<String>>,
}

impl SourceLineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// All lines of `path`, loading and memoizing on first request
    pub fn lines(&mut self, path: &Path) -> Result<&[String]> {
        let entry = match self.files.entry(path.to_path_buf()) {
            Entry::Occupied(occupied) => occupied.into_mut(),
            Entry::Vacant(vacant) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read source file {}", path.display()))?;
                vacant.insert(text.lines().map(str::to_string).collect())
            }
        };
        Ok(entry.as_slice())
    }

    /// Single 1-based line lookup; `None` when out of range
    pub fn line(&mut self, path: &Path, number: u32) -> Result<Option<&str>> {
        let lines = self.lines(path)?;
        Ok(number
            .checked_sub(1)
            .and_then(|index| lines.get(index as usize))
            .map(String::as_str))
    }

    /// Number of files currently cached
    pub fn cached_files(&self) -> usize {
        self.files.len()
    }
}
