//! Cronista - Execution-tracing engine with durable, replayable output
//!
//! This library provides the core functionality for recording instrumentation
//! events from a running program into an append-only JSONL trace log, enriched
//! with program state (locals, object attributes, type attributes, constants)
//! for offline time-travel review.

pub mod classifier;
pub mod cli;
pub mod config;
pub mod dedup;
pub mod engine;
pub mod event;
pub mod extract;
pub mod record;
pub mod session;
pub mod source_cache;
pub mod state;
pub mod summary;
pub mod value;
pub mod writer;
