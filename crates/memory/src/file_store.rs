//! JSON-file turn store, one file per conversation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::store::{insert_ordered, MemoryStore, SnapshotHub, SnapshotStream};
use crate::turn::{Turn, TurnId};
use crate::Result;

/// On-disk layout of a conversation
#[derive(Debug, Serialize, Deserialize)]
struct ConversationFile {
    conversation_id: String,
    updated_at: DateTime<Utc>,
    turns: Vec<Turn>,
}

/// Persists every conversation as `<dir>/<conversation>.json`
pub struct FileStore {
    dir: PathBuf,
    cache: Mutex<HashMap<String, Vec<Turn>>>,
    hub: SnapshotHub,
}

impl FileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!("◆ Could not create conversation dir {}: {}", dir.display(), e);
        }

        Self {
            dir,
            cache: Mutex::new(HashMap::new()),
            hub: SnapshotHub::default(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Conversation ids with a file on disk
    pub async fn list(&self) -> Vec<String> {
        let mut ids = Vec::new();

        if let Ok(mut entries) = tokio::fs::read_dir(&self.dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                match read_file(&path).await {
                    Ok(file) => ids.push(file.conversation_id),
                    Err(e) => warn!("◆ Skipping unreadable conversation {:?}: {}", path, e),
                }
            }
        }

        ids.sort();
        ids
    }

    fn conversation_path(&self, conversation_id: &str) -> PathBuf {
        let safe_id = conversation_id.replace([':', '/', '\\'], "_");
        self.dir.join(format!("{}.json", safe_id))
    }

    /// Cached turns, loading from disk on first access
    async fn loaded<'a>(
        &self,
        cache: &'a mut HashMap<String, Vec<Turn>>,
        conversation_id: &str,
    ) -> Result<&'a mut Vec<Turn>> {
        if !cache.contains_key(conversation_id) {
            let path = self.conversation_path(conversation_id);
            let turns = if path.exists() {
                let file = read_file(&path).await?;
                debug!("◆ Loaded conversation {} ({} turns)", conversation_id, file.turns.len());
                file.turns
            } else {
                Vec::new()
            };
            cache.insert(conversation_id.to_string(), turns);
        }
        Ok(cache.entry(conversation_id.to_string()).or_default())
    }

    async fn persist(&self, conversation_id: &str, turns: &[Turn]) -> Result<()> {
        let path = self.conversation_path(conversation_id);
        let file = ConversationFile {
            conversation_id: conversation_id.to_string(),
            updated_at: Utc::now(),
            turns: turns.to_vec(),
        };
        let content = serde_json::to_string_pretty(&file)?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!("◆ Saved conversation {}", conversation_id);
        Ok(())
    }
}

async fn read_file(path: &Path) -> Result<ConversationFile> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

#[async_trait]
impl MemoryStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn insert(&self, turn: Turn) -> Result<TurnId> {
        let id = turn.id.clone();
        let conversation_id = turn.conversation_id.clone();
        let mut cache = self.cache.lock().await;
        let turns = self.loaded(&mut cache, &conversation_id).await?;

        let mut updated = turns.clone();
        if !insert_ordered(&mut updated, turn) {
            debug!("◆ Duplicate turn {} ignored", id);
            return Ok(id);
        }
        self.persist(&conversation_id, &updated).await?;
        *turns = updated;
        self.hub.publish(&conversation_id, turns);
        Ok(id)
    }

    async fn query(&self, conversation_id: &str) -> Result<Vec<Turn>> {
        let mut cache = self.cache.lock().await;
        Ok(self.loaded(&mut cache, conversation_id).await?.clone())
    }

    async fn subscribe(&self, conversation_id: &str) -> Result<SnapshotStream> {
        let mut cache = self.cache.lock().await;
        let current = self.loaded(&mut cache, conversation_id).await?.clone();
        Ok(self.hub.subscribe(conversation_id, current))
    }

    async fn correct(
        &self,
        conversation_id: &str,
        turn_id: &TurnId,
        content: String,
    ) -> Result<bool> {
        let mut cache = self.cache.lock().await;
        let turns = self.loaded(&mut cache, conversation_id).await?;

        let mut updated = turns.clone();
        let Some(turn) = updated.iter_mut().find(|t| &t.id == turn_id) else {
            return Ok(false);
        };
        turn.content = content;
        self.persist(conversation_id, &updated).await?;
        *turns = updated;
        self.hub.publish(conversation_id, turns);
        Ok(true)
    }

    async fn clear(&self, conversation_id: &str) -> Result<()> {
        let mut cache = self.cache.lock().await;
        let path = self.conversation_path(conversation_id);
        if path.exists() {
            tokio::fs::remove_file(&path).await?;
        }
        cache.insert(conversation_id.to_string(), Vec::new());
        self.hub.publish(conversation_id, &[]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryError;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_path_sanitizes_separators() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        let path = store.conversation_path("tutor:u1/a");
        assert_eq!(path.file_name().unwrap(), "tutor_u1_a.json");
    }

    #[tokio::test]
    async fn test_unusable_dir_fails_on_write() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a dir").unwrap();

        let store = FileStore::new(blocker.join("conversations"));
        assert!(matches!(
            store.insert(Turn::user("c", "hi")).await,
            Err(MemoryError::Io(_))
        ));
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_cache_untouched() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("gone"));
        store.insert(Turn::user("c", "kept")).await.unwrap();

        std::fs::remove_dir_all(dir.path().join("gone")).unwrap();
        assert!(store.insert(Turn::user("c", "lost")).await.is_err());

        let turns = store.query("c").await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].content, "kept");
    }
}
