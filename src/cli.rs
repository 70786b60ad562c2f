//! CLI argument parsing for Cronista

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cronista")]
#[command(version)]
#[command(about = "Execution-tracing engine with durable, replayable output", long_about = None)]
pub struct Cli {
    /// Trace output destination (JSONL, created exclusively)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: PathBuf,

    /// Application root directory (repeatable; defaults to the current directory)
    #[arg(long = "app-root", value_name = "DIR")]
    pub app_roots: Vec<PathBuf>,

    /// Record line events in dependency/package code
    #[arg(long = "include-deps")]
    pub include_deps: bool,

    /// Record line events in standard-library code
    #[arg(long = "include-std")]
    pub include_std: bool,

    /// Source extension to trace (repeatable; defaults to rb)
    #[arg(long = "ext", value_name = "EXT")]
    pub extensions: Vec<String>,

    /// Enable debug diagnostics on stderr
    #[arg(long)]
    pub debug: bool,

    /// Instrumentation event stream to replay (JSON lines; omit for stdin)
    #[arg(value_name = "EVENTS")]
    pub events: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_output_and_events() {
        let cli = Cli::parse_from(["cronista", "-o", "trace.jsonl", "events.jsonl"]);
        assert_eq!(cli.output, PathBuf::from("trace.jsonl"));
        assert_eq!(cli.events, Some(PathBuf::from("events.jsonl")));
    }

    #[test]
    fn test_cli_defaults_to_stdin_events() {
        let cli = Cli::parse_from(["cronista", "-o", "trace.jsonl"]);
        assert!(cli.events.is_none());
        assert!(!cli.include_deps);
        assert!(!cli.include_std);
        assert!(!cli.debug);
    }

    #[test]
    fn test_cli_repeatable_roots_and_extensions() {
        let cli = Cli::parse_from([
            "cronista",
            "-o",
            "trace.jsonl",
            "--app-root",
            "/srv/app",
            "--app-root",
            "/srv/shared",
            "--ext",
            "rb",
            "--ext",
            "erb",
        ]);
        assert_eq!(cli.app_roots.len(), 2);
        assert_eq!(cli.extensions, vec!["rb", "erb"]);
    }

    #[test]
    fn test_cli_include_flags() {
        let cli = Cli::parse_from(["cronista", "-o", "t.jsonl", "--include-deps", "--include-std"]);
        assert!(cli.include_deps);
        assert!(cli.include_std);
    }
}
