//! Durable turn log abstraction

use async_trait::async_trait;
use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Mutex as StdMutex;
use tokio::sync::{watch, Mutex};
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

use crate::turn::{Turn, TurnId};
use crate::Result;

/// Live view of one conversation: the full ordered snapshot on subscribe,
/// then again after every change.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Vec<Turn>> + Send>>;

/// Append-only turn log, keyed by conversation
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Store name for logging
    fn name(&self) -> &str;

    /// Persist a turn. Inserting an id that is already present is a no-op.
    async fn insert(&self, turn: Turn) -> Result<TurnId>;

    /// All turns of a conversation in chronological order
    async fn query(&self, conversation_id: &str) -> Result<Vec<Turn>>;

    /// Observe a conversation
    async fn subscribe(&self, conversation_id: &str) -> Result<SnapshotStream>;

    /// Rewrite the content of an existing turn. Returns false if it is unknown.
    async fn correct(&self, conversation_id: &str, turn_id: &TurnId, content: String)
        -> Result<bool>;

    /// Drop every turn of a conversation
    async fn clear(&self, conversation_id: &str) -> Result<()>;
}

/// Insert keeping chronological order; ties keep insertion order.
/// Returns false when a turn with the same id is already present.
pub(crate) fn insert_ordered(turns: &mut Vec<Turn>, turn: Turn) -> bool {
    if turns.iter().any(|t| t.id == turn.id) {
        return false;
    }
    let at = turns.partition_point(|t| t.created_at <= turn.created_at);
    turns.insert(at, turn);
    true
}

/// Per-conversation watch channels shared by the store implementations.
///
/// Callers publish and subscribe while holding their own data lock, so a
/// subscriber never misses a change made between reading and registering.
#[derive(Default)]
pub(crate) struct SnapshotHub {
    senders: StdMutex<HashMap<String, watch::Sender<Vec<Turn>>>>,
}

impl SnapshotHub {
    pub(crate) fn publish(&self, conversation_id: &str, snapshot: &[Turn]) {
        let senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = senders.get(conversation_id) {
            tx.send_replace(snapshot.to_vec());
        }
    }

    pub(crate) fn subscribe(&self, conversation_id: &str, current: Vec<Turn>) -> SnapshotStream {
        let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        let rx = match senders.get(conversation_id) {
            Some(tx) => {
                tx.send_replace(current);
                tx.subscribe()
            }
            None => {
                let (tx, rx) = watch::channel(current);
                senders.insert(conversation_id.to_string(), tx);
                rx
            }
        };
        Box::pin(WatchStream::new(rx))
    }
}

/// Process-local store, mostly for tests and ephemeral sessions
#[derive(Default)]
pub struct InMemoryStore {
    conversations: Mutex<HashMap<String, Vec<Turn>>>,
    hub: SnapshotHub,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn insert(&self, turn: Turn) -> Result<TurnId> {
        let id = turn.id.clone();
        let conversation_id = turn.conversation_id.clone();
        let mut conversations = self.conversations.lock().await;
        let turns = conversations.entry(conversation_id.clone()).or_default();
        if insert_ordered(turns, turn) {
            self.hub.publish(&conversation_id, turns);
        } else {
            debug!("◆ Duplicate turn {} ignored", id);
        }
        Ok(id)
    }

    async fn query(&self, conversation_id: &str) -> Result<Vec<Turn>> {
        let conversations = self.conversations.lock().await;
        Ok(conversations
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn subscribe(&self, conversation_id: &str) -> Result<SnapshotStream> {
        let conversations = self.conversations.lock().await;
        let current = conversations
            .get(conversation_id)
            .cloned()
            .unwrap_or_default();
        Ok(self.hub.subscribe(conversation_id, current))
    }

    async fn correct(
        &self,
        conversation_id: &str,
        turn_id: &TurnId,
        content: String,
    ) -> Result<bool> {
        let mut conversations = self.conversations.lock().await;
        let Some(turns) = conversations.get_mut(conversation_id) else {
            return Ok(false);
        };
        let Some(turn) = turns.iter_mut().find(|t| &t.id == turn_id) else {
            return Ok(false);
        };
        turn.content = content;
        self.hub.publish(conversation_id, turns);
        Ok(true)
    }

    async fn clear(&self, conversation_id: &str) -> Result<()> {
        let mut conversations = self.conversations.lock().await;
        conversations.remove(conversation_id);
        self.hub.publish(conversation_id, &[]);
        Ok(())
    }
}
