//! Append-only per-conversation transcript.
//!
//! One JSONL line per processed inbound event: what arrived, how it was
//! routed, which nodes ran, what went out. Audit-oriented; the router
//! treats append failures as non-fatal.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::domain::ConversationId;

/// One processed event in a conversation's transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub timestamp: DateTime<Utc>,

    pub conversation: String,

    /// External message id of the inbound event
    pub message_id: String,

    /// Resolved trigger key (e.g. "menu:3")
    pub trigger: String,

    /// Handler that produced the decision
    pub matched_by: String,

    /// Nodes executed, in order
    pub nodes: Vec<String>,

    /// Number of outbound messages produced
    pub replies: usize,

    pub terminal: bool,
}

/// JSONL transcript writer, one file per conversation
pub struct TranscriptLogger {
    dir: PathBuf,
}

impl TranscriptLogger {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create transcript directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, id: &ConversationId) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(id.channel_id.as_bytes());
        let digest = hasher.finalize();
        let hash: String = digest[..8].iter().map(|b| format!("{:02x}", b)).collect();
        self.dir.join(format!("{}-{}.jsonl", id.tenant_id, hash))
    }

    pub async fn append(&self, id: &ConversationId, entry: &TranscriptEntry) -> Result<()> {
        let path = self.path_for(id);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open transcript: {}", path.display()))?;

        let json = serde_json::to_string(entry).context("Failed to serialize transcript entry")?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write transcript entry")?;
        file.flush().await?;

        Ok(())
    }

    /// Replay a conversation's transcript in order
    pub async fn replay(&self, id: &ConversationId) -> Result<Vec<TranscriptEntry>> {
        let path = self.path_for(id);
        Self::read_entries(&path).await
    }

    async fn read_entries(path: &Path) -> Result<Vec<TranscriptEntry>> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(path).await?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut entries = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }

        Ok(entries)
    }
}
