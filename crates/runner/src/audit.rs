//! Audit trail sinks
//!
//! [`JsonlAuditLog`] appends one JSON object per line to a file;
//! [`MemoryAuditSink`] keeps records in memory for tests and reports.
//! Both are best-effort: a failed write is logged and the engine carries on.

use meridian_ports::{AuditRecord, AuditSink};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type AuditResult<T> = std::result::Result<T, AuditError>;

/// Append-only JSON-lines file
pub struct JsonlAuditLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlAuditLog {
    /// Open `path` for appending, creating it if needed
    pub fn open(path: impl AsRef<Path>) -> AuditResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize and flush one record
    pub fn append(&self, record: &AuditRecord) -> AuditResult<()> {
        let line = serde_json::to_string(record)?;
        let mut writer = match self.writer.lock() {
            Ok(writer) => writer,
            // A panic mid-write leaves at worst a torn line
            Err(poisoned) => poisoned.into_inner(),
        };
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

impl AuditSink for JsonlAuditLog {
    fn record(&self, record: AuditRecord) {
        if let Err(e) = self.append(&record) {
            log::error!(
                "[AUDIT] failed to append {} record to {}: {}",
                record.symbol,
                self.path.display(),
                e
            );
        }
    }
}

/// Keeps every record in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}
