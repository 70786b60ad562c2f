//! Session lifecycle
//!
//! `run` owns the whole span of a trace session: open the destination
//! exclusively, engage the engine, execute the traced work, disengage,
//! write the summary, and release the destination. The work's own outcome
//! is never swallowed; an error from the traced block still gets a summary
//! and then propagates unchanged.

use crate::config::TraceConfig;
use crate::engine::TraceEngine;
use crate::event::TraceEvent;
use crate::writer::RecordWriter;
use anyhow::Result;
use std::path::Path;
use tracing::warn;

/// Handle through which the instrumentation source delivers events
pub struct SessionHandle<'a> {
    engine: &'a mut TraceEngine,
}

impl SessionHandle<'_> {
    /// Deliver one instrumentation event for synchronous processing
    pub fn dispatch(&mut self, event: &TraceEvent) -> Result<()> {
        self.engine.process(event)
    }
}

/// Run `work` under tracing, producing a complete record stream at
/// `destination`
///
/// Failing to open the destination is fatal and returns before `work`
/// runs. Whatever `work` returns (or the error it raises) is the return
/// value of `run`; finalization happens on both paths. Instrumentation is
/// disengaged before the summary is written, so the engine's own
/// finalization work is never self-traced.
pub fn run<T, F>(destination: &Path, config: TraceConfig, work: F) -> Result<T>
where
    F: FnOnce(&mut SessionHandle<'_>) -> Result<T>,
{
    let writer = RecordWriter::create(destination)?;
    let mut engine = TraceEngine::new(writer, config);
    engine.activate()?;

    let outcome = {
        let mut handle = SessionHandle {
            engine: &mut engine,
        };
        work(&mut handle)
    };

    let finalized = engine.finalize();
    match outcome {
        Ok(value) => {
            finalized?;
            Ok(value)
        }
        Err(err) => {
            // The traced program's failure takes precedence
            if let Err(finalize_err) = finalized {
                warn!("failed to finalize trace session: {finalize_err:#}");
            }
            Err(err)
        }
    }
}
