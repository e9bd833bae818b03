//! JSONL audit trail of deduplicated joined records and dispatch outcomes

use crate::compliance_core::JoinedRecord;
use crate::dispatch::DispatchOutcome;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

#[derive(Debug)]
pub enum SinkError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError::Io(err)
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        SinkError::Serialization(err)
    }
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Io(e) => write!(f, "IO error: {}", e),
            SinkError::Serialization(e) => write!(f, "Serialization error: {}", e),
        }
    }
}

impl std::error::Error for SinkError {}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEntry {
    Joined { at_ms: i64, record: JoinedRecord },
    Dispatch { at_ms: i64, outcome: DispatchOutcome },
}

pub struct AuditWriter {
    file: BufWriter<File>,
    last_flush: Instant,
    flush_interval: Duration,
    written: u64,
}

impl AuditWriter {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        log::info!("📝 Writing audit trail to: {}", path.display());

        Ok(Self {
            file: BufWriter::new(file),
            last_flush: Instant::now(),
            flush_interval: Duration::from_secs(5),
            written: 0,
        })
    }

    pub fn write_entry(&mut self, entry: &AuditEntry) -> Result<(), SinkError> {
        let json = serde_json::to_string(entry)?;
        writeln!(self.file, "{}", json)?;
        self.written += 1;

        if self.last_flush.elapsed() > self.flush_interval {
            self.flush()?;
        }

        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), SinkError> {
        self.file.flush()?;
        self.last_flush = Instant::now();
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl Drop for AuditWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// Drain audit entries into the writer until every sender is gone
pub async fn run_audit_writer(mut rx: mpsc::Receiver<AuditEntry>, mut writer: AuditWriter) {
    while let Some(entry) = rx.recv().await {
        if let Err(e) = writer.write_entry(&entry) {
            log::error!("❌ Failed to write audit entry: {}", e);
        }
    }

    if let Err(e) = writer.flush() {
        log::error!("❌ Failed final audit flush: {}", e);
    }
    log::info!("✅ Audit writer stopped ({} entries)", writer.written());
}
