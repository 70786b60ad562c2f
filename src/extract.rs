//! Method definition extraction
//!
//! On the first observed call into an application method, the engine
//! captures the method's full source text so the trace is self-contained.
//! Extraction walks the defining file from the declaration line until it
//! meets a body-closing token at an indentation no deeper than the
//! declaration's own.
//!
//! The indentation threshold is a known-imprecise heuristic: a line inside
//! a multi-line literal that happens to start with the closing token at the
//! declaration's indentation ends extraction early. Intentional; a full
//! block-depth counter is out of scope for this capture path.

use crate::source_cache::SourceLineCache;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Key identifying a method: enclosing type plus method name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodKey {
    pub owner: Option<String>,
    pub name: String,
}

impl MethodKey {
    pub fn new(owner: Option<String>, name: impl Into<String>) -> Self {
        Self {
            owner,
            name: name.into(),
        }
    }

    /// `Owner#name` form used in summaries and the definition index
    pub fn qualified(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{owner}#{}", self.name),
            None => format!("<main>#{}", self.name),
        }
    }
}

/// Extracted source of one method definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDefinition {
    /// Full source text, declaration through closing token
    pub source: String,
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
    /// Declaration line, trimmed
    pub signature: String,
}

/// Extracts method bodies by indentation from cached source files
#[derive(Debug, Clone)]
pub struct MethodDefinitionExtractor {
    closing_token: String,
}

impl Default for MethodDefinitionExtractor {
    fn default() -> Self {
        Self::new("end")
    }
}

impl MethodDefinitionExtractor {
    pub fn new(closing_token: impl Into<String>) -> Self {
        Self {
            closing_token: closing_token.into(),
        }
    }

    /// Extract the method declared at `start_line` of `path`
    ///
    /// Returns `Ok(None)` when the declared line is out of range. Read
    /// failures propagate so the caller can degrade to an error marker.
    pub fn extract(
        &self,
        cache: &mut SourceLineCache,
        path: &Path,
        start_line: u32,
    ) -> Result<Option<MethodDefinition>> {
        let lines = cache.lines(path)?;
        let Some(first_index) = start_line.checked_sub(1).map(|i| i as usize) else {
            return Ok(None);
        };
        let Some(first_line) = lines.get(first_index) else {
            return Ok(None);
        };

        let initial_indent = indent_width(first_line);
        let mut collected: Vec<&str> = vec![first_line];
        let mut end_index = first_index;

        for (offset, line) in lines[first_index + 1..].iter().enumerate() {
            collected.push(line);
            end_index = first_index + 1 + offset;
            let trimmed = line.trim_start();
            if trimmed.starts_with(self.closing_token.as_str())
                && indent_width(line) <= initial_indent
            {
                break;
            }
        }

        Ok(Some(MethodDefinition {
            source: collected.join("\n"),
            file: path.display().to_string(),
            start_line,
            end_line: (end_index + 1) as u32,
            signature: first_line.trim().to_string(),
        }))
    }
}

/// Leading-whitespace width in characters
fn indent_width(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}
