//! Session configuration
//!
//! Immutable for the session lifetime. Application roots are canonicalized
//! once at construction so classification never touches the filesystem on
//! the per-event path.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

/// Default source extension to trace
const DEFAULT_EXTENSION: &str = "rb";

/// Tracing configuration, fixed for the session lifetime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceConfig {
    /// Ordered application root directories (canonical form)
    pub application_roots: Vec<PathBuf>,
    /// Record line events in dependency/package code
    pub include_dependency_code: bool,
    /// Record line events in standard-library code
    pub include_standard_library_code: bool,
    /// Source extensions considered traceable
    pub traced_extensions: Vec<String>,
}

impl Default for TraceConfig {
    fn default() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::new(vec![cwd])
    }
}

impl TraceConfig {
    /// Create a configuration with the given application roots
    ///
    /// Each root is canonicalized via the filesystem when possible, with a
    /// lexical fallback for roots that do not exist yet.
    pub fn new(roots: Vec<PathBuf>) -> Self {
        let application_roots = roots.into_iter().map(|r| canonicalize_root(&r)).collect();
        Self {
            application_roots,
            include_dependency_code: false,
            include_standard_library_code: false,
            traced_extensions: vec![DEFAULT_EXTENSION.to_string()],
        }
    }

    /// Build from a loose options map; unrecognized keys are ignored
    pub fn from_options(options: &HashMap<String, serde_json::Value>) -> Self {
        let roots = options
            .get("application_roots")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(PathBuf::from)
                    .collect::<Vec<_>>()
            })
            .filter(|roots| !roots.is_empty())
            .unwrap_or_else(|| {
                vec![std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))]
            });

        let mut config = Self::new(roots);
        if let Some(flag) = options
            .get("include_dependency_code")
            .and_then(|v| v.as_bool())
        {
            config.include_dependency_code = flag;
        }
        if let Some(flag) = options
            .get("include_standard_library_code")
            .and_then(|v| v.as_bool())
        {
            config.include_standard_library_code = flag;
        }
        if let Some(exts) = options
            .get("traced_extensions")
            .and_then(|v| v.as_array())
        {
            let parsed: Vec<String> = exts
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim_start_matches('.').to_string())
                .collect();
            if !parsed.is_empty() {
                config.traced_extensions = parsed;
            }
        }
        config
    }

    /// Whether the path's extension is in the traced set
    pub fn traces_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.traced_extensions.iter().any(|t| t == ext))
            .unwrap_or(false)
    }
}

fn canonicalize_root(root: &Path) -> PathBuf {
    std::fs::canonicalize(root).unwrap_or_else(|_| normalize_path(root))
}

/// Lexical normalization: join to the current directory if relative, then
/// fold `.` and `..` components without touching the filesystem
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("/"))
            .join(path)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
