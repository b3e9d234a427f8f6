//! Send journal
//!
//! Appends one JSON line per finished send. Failed broadcasts are recorded
//! with their signature so an uncertain transaction can be looked up later.

use crate::types::{Environment, Pubkey, Signature};
use crate::wallet::transfer::{PendingTransfer, SendState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Entry in the send journal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub timestamp: DateTime<Utc>,
    pub transfer_id: Uuid,
    pub environment: Environment,
    pub sender: Pubkey,
    pub recipient: Pubkey,
    pub lamports: u64,
    pub signature: Option<Signature>,
    pub outcome: SendState,
    pub error: Option<String>,
}

impl JournalEntry {
    pub fn new(
        transfer: &PendingTransfer,
        signature: Option<Signature>,
        outcome: SendState,
        error: Option<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            transfer_id: transfer.id,
            environment: transfer.environment,
            sender: transfer.sender,
            recipient: transfer.recipient,
            lamports: transfer.lamports,
            signature,
            outcome,
            error,
        }
    }
}

/// Writer for journal entries
struct JournalWriter {
    path: PathBuf,
}

impl JournalWriter {
    fn write(&self, entry: &JournalEntry) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let json = serde_json::to_string(entry)?;
        writeln!(file, "{}", json)?;
        Ok(())
    }
}

/// Append-only JSONL record of send outcomes
#[derive(Clone)]
pub struct SendJournal {
    writer: Arc<Mutex<JournalWriter>>,
}

impl SendJournal {
    /// # Arguments
    /// * `path` - Path to the journal file (JSONL format)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(JournalWriter { path: path.into() })),
        }
    }

    /// Append an entry; journal failures are logged, never propagated
    pub async fn record(&self, entry: JournalEntry) {
        let writer = self.writer.lock().await;
        if let Err(e) = writer.write(&entry) {
            tracing::warn!(error = %e, path = %writer.path.display(), "Failed to write send journal entry");
        }
    }

    /// Read back every entry in a journal file
    pub fn read_entries(path: &Path) -> crate::Result<Vec<JournalEntry>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(Into::into))
            .collect()
    }
}
