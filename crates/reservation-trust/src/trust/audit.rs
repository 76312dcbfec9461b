//! Audit delivery. Entries are emitted after the state change commits; a failed
//! delivery never rolls the change back. Undelivered entries wait in a backlog that
//! the maintenance sweep retries.
//!
//! The backlog is in-memory and unbounded: entries still queued when the process
//! exits are lost. The sink always receives entries in emission order.

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::{error, warn};

use super::domain::AuditEntry;

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
    #[error("failed to write audit log: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode audit entry: {0}")]
    Csv(#[from] csv::Error),
}

/// Destination for audit entries.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError>;
}

/// Keeps entries in memory; used by tests and the demo.
#[derive(Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
        Ok(())
    }
}

/// Appends entries to a CSV file, writing the header when the file is new.
pub struct CsvAuditSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Serialize)]
struct AuditRow<'a> {
    id: &'a str,
    created_at: String,
    actor_id: &'a str,
    action: &'a str,
    target_type: &'a str,
    target_id: &'a str,
    source_ip: Option<&'a str>,
    details: String,
}

impl AuditSink for CsvAuditSink {
    fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let needs_header = std::fs::metadata(&self.path)
            .map(|meta| meta.len() == 0)
            .unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);

        writer.serialize(AuditRow {
            id: &entry.id,
            created_at: entry.created_at.to_rfc3339(),
            actor_id: &entry.actor_id,
            action: &entry.action,
            target_type: &entry.target_type,
            target_id: &entry.target_id,
            source_ip: entry.source_ip.as_deref(),
            details: entry.details.to_string(),
        })?;
        writer.flush()?;
        Ok(())
    }
}

/// At-least-once delivery in front of a sink.
pub struct AuditTrail {
    sink: Arc<dyn AuditSink>,
    backlog: Mutex<VecDeque<AuditEntry>>,
    alert_threshold: usize,
}

impl AuditTrail {
    pub fn new(sink: Arc<dyn AuditSink>, alert_threshold: usize) -> Self {
        Self {
            sink,
            backlog: Mutex::new(VecDeque::new()),
            alert_threshold,
        }
    }

    /// Queues `entry` behind any backlog and delivers as much as the sink accepts.
    pub fn emit(&self, entry: AuditEntry) {
        let mut backlog = self.backlog.lock().unwrap_or_else(PoisonError::into_inner);
        backlog.push_back(entry);
        self.deliver(&mut backlog);

        if backlog.len() >= self.alert_threshold {
            error!(
                backlog = backlog.len(),
                threshold = self.alert_threshold,
                "audit backlog above alert threshold"
            );
        }
    }

    /// Redelivers queued entries in order, stopping at the first failure.
    /// Returns how many were delivered.
    pub fn retry_backlog(&self) -> usize {
        let mut backlog = self.backlog.lock().unwrap_or_else(PoisonError::into_inner);
        self.deliver(&mut backlog)
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Delivers from the front of the queue until it is empty or the sink fails.
    fn deliver(&self, backlog: &mut VecDeque<AuditEntry>) -> usize {
        let mut delivered = 0;
        while let Some(entry) = backlog.front() {
            if let Err(err) = self.sink.record(entry) {
                warn!(
                    action = %entry.action,
                    target_id = %entry.target_id,
                    pending = backlog.len(),
                    error = %err,
                    "audit delivery failed; queued for retry"
                );
                break;
            }
            backlog.pop_front();
            delivered += 1;
        }
        delivered
    }
}
