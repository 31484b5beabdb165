//! Append-only usage log consumed by the learning loop.
//!
//! Records are newline-delimited JSON. A learning cycle moves the live log
//! aside to `<path>.pending` (atomic rename), learns from it, and removes it
//! only after the store has been saved. A pending batch left over from a
//! failed cycle is retried before the live log is touched again.

use polyglot_core::entry::UsageRecord;
use polyglot_core::error::PolyglotError;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// File-backed usage log.
#[derive(Debug)]
pub struct UsageLog {
    path: PathBuf,
    lock: Mutex<()>,
}

/// Records taken from the log but not yet committed.
#[derive(Debug)]
pub struct Batch {
    pub records: Vec<UsageRecord>,
    path: PathBuf,
}

impl UsageLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn pending_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".pending");
        PathBuf::from(name)
    }

    /// Append one record.
    pub async fn append(&self, record: &UsageRecord) -> Result<(), PolyglotError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Take the next batch to learn from, or `None` when nothing is queued.
    pub async fn take_batch(&self) -> Result<Option<Batch>, PolyglotError> {
        let pending = self.pending_path();
        {
            let _guard = self.lock.lock().await;
            if !tokio::fs::try_exists(&pending).await? {
                match tokio::fs::rename(&self.path, &pending).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                    Err(e) => return Err(e.into()),
                }
            } else {
                debug!("usage log: retrying pending batch {}", pending.display());
            }
        }

        let content = tokio::fs::read_to_string(&pending).await?;
        let records = parse_lines(&content);
        Ok(Some(Batch {
            records,
            path: pending,
        }))
    }

    /// Drop a batch whose records have been learned and saved.
    pub async fn commit(&self, batch: Batch) -> Result<(), PolyglotError> {
        match tokio::fs::remove_file(&batch.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Parse newline-delimited records, skipping malformed lines.
fn parse_lines(content: &str) -> Vec<UsageRecord> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(n, line)| match serde_json::from_str::<UsageRecord>(line) {
            Ok(r) => Some(r),
            Err(e) => {
                warn!("usage log: skipping malformed line {}: {e}", n + 1);
                None
            }
        })
        .collect()
}
