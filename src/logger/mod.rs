//! Diagnostics pipeline: explicit sinks plus a JSONL activity log.

pub mod activity;
pub mod diagnostics;
pub mod jsonl;
