//! Append-only JSONL conversation store.
//!
//! Each conversation gets one newline-delimited JSON file of state
//! snapshots; the current state is the last line. The log doubles as an
//! audit trail and makes recovery after a crash a replay of the tail.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::domain::{ConversationId, ConversationState};

use super::conversation::ConversationStore;

/// One snapshot line in a conversation log
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    timestamp: DateTime<Utc>,
    state: ConversationState,
}

/// File-based conversation store using JSONL snapshots
pub struct JsonlConversationStore {
    dir: PathBuf,
}

impl JsonlConversationStore {
    /// Create or open a store rooted at `dir`
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create store directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Log path for a conversation: `{tenant}-{channel_hash}.jsonl`. The
    /// channel id is hashed so raw phone numbers never become file names.
    fn path_for(&self, id: &ConversationId) -> PathBuf {
        self.dir
            .join(format!("{}-{}.jsonl", id.tenant_id, hash_channel(&id.channel_id)))
    }

    async fn read_last_snapshot(path: &Path) -> Result<Option<Snapshot>> {
        if !path.exists() {
            return Ok(None);
        }

        let file = File::open(path)
            .await
            .with_context(|| format!("Failed to open conversation log: {}", path.display()))?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut last = None;

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let snapshot: Snapshot = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse snapshot: {}", line))?;
            last = Some(snapshot);
        }

        Ok(last)
    }

    /// Full snapshot history for a conversation (audit, diagnostics)
    pub async fn history(&self, id: &ConversationId) -> Result<Vec<ConversationState>> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&path).await?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut history = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let snapshot: Snapshot = serde_json::from_str(&line)?;
            history.push(snapshot.state);
        }

        Ok(history)
    }
}

#[async_trait]
impl ConversationStore for JsonlConversationStore {
    async fn load(&self, id: &ConversationId) -> Result<Option<ConversationState>> {
        let path = self.path_for(id);
        Ok(Self::read_last_snapshot(&path).await?.map(|s| s.state))
    }

    async fn save(&self, state: &ConversationState) -> Result<()> {
        let path = self.path_for(&state.conversation_id);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open conversation log: {}", path.display()))?;

        let snapshot = Snapshot {
            timestamp: Utc::now(),
            state: state.clone(),
        };
        let json = serde_json::to_string(&snapshot).context("Failed to serialize snapshot")?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write snapshot")?;
        file.flush().await.context("Failed to flush snapshot")?;

        Ok(())
    }
}

/// First 16 hex chars of the channel id's SHA256
fn hash_channel(channel_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(channel_id.as_bytes());
    let digest = hasher.finalize();
    digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = JsonlConversationStore::open(temp.path()).await.unwrap();
        let id = ConversationId::new("acme", "5215550001");

        let mut state = ConversationState::new(id.clone());
        state.visit("welcome");
        store.save(&state).await.unwrap();

        let loaded = store.load(&id).await.unwrap().unwrap();
        assert_eq!(loaded.current_node.as_deref(), Some("welcome"));
    }

    #[tokio::test]
    async fn test_load_returns_latest_snapshot() {
        let temp = TempDir::new().unwrap();
        let store = JsonlConversationStore::open(temp.path()).await.unwrap();
        let id = ConversationId::new("acme", "5215550001");

        let mut state = ConversationState::new(id.clone());
        state.visit("welcome");
        store.save(&state).await.unwrap();
        state.visit("book_date");
        store.save(&state).await.unwrap();

        let loaded = store.load(&id).await.unwrap().unwrap();
        assert_eq!(loaded.current_node.as_deref(), Some("book_date"));

        let history = store.history(&id).await.unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_channel_id_not_in_file_name() {
        let temp = TempDir::new().unwrap();
        let store = JsonlConversationStore::open(temp.path()).await.unwrap();
        let id = ConversationId::new("acme", "5215550001");

        let state = ConversationState::new(id.clone());
        store.save(&state).await.unwrap();

        let mut entries = tokio::fs::read_dir(temp.path()).await.unwrap();
        let entry = entries.next_entry().await.unwrap().unwrap();
        let name = entry.file_name().to_string_lossy().to_string();

        assert!(name.starts_with("acme-"));
        assert!(!name.contains("5215550001"));
    }
}
