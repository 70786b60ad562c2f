//! Application-code classification
//!
//! Decides whether an event path belongs to the traced application itself,
//! to installed dependencies, or to the standard library. Recognized
//! external roots win over configured application roots, so a gem vendored
//! underneath an application root still classifies as dependency code.
//!
//! Both sides of the prefix comparison are canonical: roots are resolved
//! once at configuration time, event paths on first sight with the result
//! memoized, so symlinked deploy layouts (release `current` links, linked
//! temp dirs) classify the same as their targets.

use crate::config::{normalize_path, TraceConfig};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Path segments that mark installed dependency code
const DEPENDENCY_SEGMENTS: &[&str] = &["gems", "site-packages", "node_modules", "bundler"];

/// Substrings that mark a standard-library install directory
const STDLIB_MARKERS: &[&str] = &["/lib/ruby/", "/lib/python", "/rustc/", "/toolchains/"];

/// Where a source path originates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeOrigin {
    /// Under a configured application root
    Application,
    /// Under a recognized package/dependency directory
    Dependency,
    /// Under a standard-library install directory
    StandardLibrary,
    /// None of the above (or no resolvable path)
    Unknown,
}

/// Classifies event paths against the session's application roots
///
/// Classification is a pure function of the configuration; the per-path
/// memo only caches canonicalization work.
#[derive(Debug, Clone)]
pub struct CodeClassifier {
    roots: Vec<PathBuf>,
    origins: HashMap<PathBuf, CodeOrigin>,
}

impl CodeClassifier {
    pub fn new(config: &TraceConfig) -> Self {
        Self {
            roots: config.application_roots.clone(),
            origins: HashMap::new(),
        }
    }

    /// Partition a path into application / dependency / stdlib / unknown
    pub fn classify(&mut self, path: Option<&Path>) -> CodeOrigin {
        let Some(path) = path else {
            return CodeOrigin::Unknown;
        };
        if let Some(&origin) = self.origins.get(path) {
            return origin;
        }

        let canonical = canonicalize_event_path(path);
        let origin = match external_origin(&canonical) {
            Some(external) => external,
            None if self.roots.iter().any(|root| canonical.starts_with(root)) => {
                CodeOrigin::Application
            }
            None => CodeOrigin::Unknown,
        };
        self.origins.insert(path.to_path_buf(), origin);
        origin
    }

    /// True iff the path classifies as the traced application's own code
    pub fn is_application_code(&mut self, path: Option<&Path>) -> bool {
        self.classify(path) == CodeOrigin::Application
    }
}

/// Resolve an event path through the filesystem, falling back to lexical
/// normalization for paths that no longer exist
fn canonicalize_event_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| normalize_path(path))
}

fn external_origin(canonical: &Path) -> Option<CodeOrigin> {
    // Dependency segments win: installed gems commonly live underneath the
    // standard-library prefix (lib/ruby/gems/...)
    let is_dependency = canonical.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .map(|segment| DEPENDENCY_SEGMENTS.contains(&segment))
            .unwrap_or(false)
    });
    if is_dependency {
        return Some(CodeOrigin::Dependency);
    }
    let text = canonical.to_string_lossy();
    if STDLIB_MARKERS.iter().any(|marker| text.contains(marker)) {
        return Some(CodeOrigin::StandardLibrary);
    }
    None
}
