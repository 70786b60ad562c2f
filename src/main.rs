use anyhow::{Context, Result};
use clap::Parser;
use cronista::{cli::Cli, config::TraceConfig, event::TraceEvent, session};
use std::io::BufRead;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn build_config(cli: &Cli) -> TraceConfig {
    let roots = if cli.app_roots.is_empty() {
        vec![std::env::current_dir().unwrap_or_else(|_| ".".into())]
    } else {
        cli.app_roots.clone()
    };
    let mut config = TraceConfig::new(roots);
    config.include_dependency_code = cli.include_deps;
    config.include_standard_library_code = cli.include_std;
    if !cli.extensions.is_empty() {
        config.traced_extensions = cli
            .extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_string())
            .collect();
    }
    config
}

fn open_events(cli: &Cli) -> Result<Box<dyn BufRead>> {
    match &cli.events {
        Some(path) => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("failed to open event stream {}", path.display()))?;
            Ok(Box::new(std::io::BufReader::new(file)))
        }
        None => Ok(Box::new(std::io::BufReader::new(std::io::stdin()))),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let config = build_config(&cli);
    let reader = open_events(&cli)?;

    let malformed = session::run(&cli.output, config, |session| {
        let mut malformed = 0u64;
        for line in reader.lines() {
            let line = line.context("failed to read event stream")?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TraceEvent>(&line) {
                Ok(event) => session.dispatch(&event)?,
                Err(err) => {
                    malformed += 1;
                    tracing::warn!("skipping malformed event: {err}");
                }
            }
        }
        Ok(malformed)
    })?;

    eprintln!("[cronista: trace written to {}]", cli.output.display());
    if malformed > 0 {
        eprintln!("[cronista: {malformed} malformed events skipped]");
    }
    Ok(())
}
