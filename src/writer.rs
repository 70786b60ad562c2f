//! Durable record writer
//!
//! Assigns sequence ids in strict arrival order, serializes each record to a
//! single JSON line, appends it, and forces the bytes to durable storage
//! before returning. The destination is opened with `create_new` so exactly
//! one engine instance owns it.

use crate::record::{SummaryRecord, TraceRecord};
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Output resource that can force written bytes to durable storage
pub trait RecordSink: Write {
    fn commit(&mut self) -> std::io::Result<()>;
}

impl RecordSink for File {
    fn commit(&mut self) -> std::io::Result<()> {
        self.sync_data()
    }
}

/// In-memory sink for tests and dry runs
#[derive(Debug, Default)]
pub struct MemorySink(pub Vec<u8>);

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl RecordSink for MemorySink {
    fn commit(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Appends sequence-numbered records to an exclusively owned destination
pub struct RecordWriter {
    sink: Box<dyn RecordSink>,
    next_id: u64,
}

impl std::fmt::Debug for RecordWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordWriter")
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

impl RecordWriter {
    /// Open `path` for exclusive writing; fails if the file already exists
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .with_context(|| format!("failed to open trace destination {}", path.display()))?;
        Ok(Self::with_sink(Box::new(file)))
    }

    pub fn with_sink(sink: Box<dyn RecordSink>) -> Self {
        Self { sink, next_id: 1 }
    }

    /// Id the next written record will receive
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Count of records written so far
    pub fn records_written(&self) -> u64 {
        self.next_id - 1
    }

    /// Assign the next id to `record`, append it, and sync
    pub fn write_trace(&mut self, record: &mut TraceRecord) -> Result<u64> {
        record.id = self.next_id;
        let json = serde_json::to_string(record).context("failed to serialize trace record")?;
        self.append(&json)?;
        self.next_id += 1;
        Ok(record.id)
    }

    /// Assign the next id to the summary, append it, and sync
    pub fn write_summary(&mut self, record: &mut SummaryRecord) -> Result<u64> {
        record.id = self.next_id;
        let json = serde_json::to_string(record).context("failed to serialize summary record")?;
        self.append(&json)?;
        self.next_id += 1;
        Ok(record.id)
    }

    fn append(&mut self, json: &str) -> Result<()> {
        self.sink
            .write_all(json.as_bytes())
            .context("failed to append trace record")?;
        self.sink
            .write_all(b"\n")
            .context("failed to append record delimiter")?;
        self.sink.flush().context("failed to flush trace output")?;
        self.sink
            .commit()
            .context("failed to sync trace output to durable storage")?;
        Ok(())
    }
}
