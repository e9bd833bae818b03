//! # Pipeline Runtime Layer
//!
//! Wires the compliance core into running tasks:
//!
//! - `config` - `PipelineConfig` loaded from the environment and validated once
//! - `source` - newline-delimited input from stdin or a (followed) file
//! - `engine` - `ComplianceEngine`, the per-shard owner of all keyed state
//! - `ingestion` - router, shard workers, dispatcher loop and `spawn_pipeline`
//! - `sink` - optional JSONL audit trail
//!
//! Keys never move between shards, so engines need no locking.

pub mod config;
pub mod engine;
pub mod ingestion;
pub mod sink;
pub mod source;

pub use config::{ConfigError, PipelineConfig};
pub use engine::{ComplianceEngine, EngineOutput, EngineStats};
pub use ingestion::{
    run_dispatcher, run_router, run_shard, spawn_pipeline, DispatchStats, EventRouter,
    PipelineHandle, PipelineSummary, RouterStats, ShardOutputs,
};
pub use sink::{AuditEntry, AuditWriter, SinkError};
pub use source::{FileLineReader, LineSource};
