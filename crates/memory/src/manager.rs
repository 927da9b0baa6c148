//! Memory manager: owns the window and keeps it in step with the store

use futures::FutureExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, info};

use crate::session::SessionContext;
use crate::store::MemoryStore;
use crate::turn::{Role, Turn, TurnId};
use crate::window::ConversationWindow;
use crate::{MemoryError, Result};

/// Binds one conversation of a store to a bounded in-process window.
///
/// Appends write through to the store first; the window only changes after
/// the store accepted the turn. While subscribed, every store snapshot
/// replaces the window wholesale, so edits made elsewhere show up here too.
pub struct MemoryManager {
    store: Arc<dyn MemoryStore>,
    session: SessionContext,
    window: Arc<RwLock<ConversationWindow>>,
    writer: Arc<Mutex<()>>,
    sync_task: StdMutex<Option<JoinHandle<()>>>,
}

impl MemoryManager {
    pub fn new(store: Arc<dyn MemoryStore>, session: SessionContext, capacity: usize) -> Self {
        Self {
            store,
            session,
            window: Arc::new(RwLock::new(ConversationWindow::new(capacity))),
            writer: Arc::new(Mutex::new(())),
            sync_task: StdMutex::new(None),
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn conversation_id(&self) -> &str {
        &self.session.conversation_id
    }

    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    pub fn capacity(&self) -> usize {
        self.read_window().capacity()
    }

    pub fn len(&self) -> usize {
        self.read_window().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_window().is_empty()
    }

    /// Fill the window from the store once
    pub async fn load(&self) -> Result<usize> {
        let _guard = self.writer.lock().await;
        let turns = self.store.query(self.conversation_id()).await?;
        let mut window = write_window(&self.window);
        window.replace(turns);
        debug!("◆ Loaded {} turn(s) into window", window.len());
        Ok(window.len())
    }

    /// Write a turn through to the store, then into the window
    pub async fn append(&self, turn: Turn) -> Result<TurnId> {
        if turn.conversation_id != self.session.conversation_id {
            return Err(MemoryError::ConversationMismatch {
                expected: self.session.conversation_id.clone(),
                turn: turn.conversation_id,
            });
        }

        let _guard = self.writer.lock().await;
        let id = self.store.insert(turn.clone()).await?;
        write_window(&self.window).push(turn);
        Ok(id)
    }

    /// Build a turn for this conversation and append it
    pub async fn record(
        &self,
        role: Role,
        content: impl Into<String>,
        metadata: HashMap<String, String>,
    ) -> Result<TurnId> {
        let mut turn = Turn::new(self.session.conversation_id.clone(), role, content);
        turn.metadata = metadata;
        self.append(turn).await
    }

    /// The last `n` turns of the window, or all of them
    pub fn window(&self, n: Option<usize>) -> Vec<Turn> {
        self.read_window().latest(n)
    }

    /// Cheap consistent copy of the whole window
    pub fn snapshot(&self) -> ConversationWindow {
        self.read_window().clone()
    }

    /// Replace the window with a snapshot, keeping its most recent turns
    pub async fn replace(&self, snapshot: Vec<Turn>) {
        let _guard = self.writer.lock().await;
        write_window(&self.window).replace(snapshot);
    }

    /// Follow the store: every emitted snapshot replaces the window.
    /// A previous subscription is cancelled first.
    pub async fn subscribe(&self) -> Result<()> {
        let mut stream = self.store.subscribe(self.conversation_id()).await?;
        let window = Arc::clone(&self.window);
        let writer = Arc::clone(&self.writer);
        let conversation_id = self.session.conversation_id.clone();

        let task = tokio::spawn(async move {
            while let Some(mut snapshot) = stream.next().await {
                let _guard = writer.lock().await;
                // Writers may have published while we waited; take the newest.
                loop {
                    match stream.next().now_or_never() {
                        Some(Some(newer)) => snapshot = newer,
                        Some(None) => break,
                        None => break,
                    }
                }
                let mut window = write_window(&window);
                window.replace(snapshot);
                debug!(
                    "◆ Window for {} synced ({} turns)",
                    conversation_id,
                    window.len()
                );
            }
            debug!("◆ Store stream for {} ended", conversation_id);
        });

        let previous = self
            .sync_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
        info!("◆ Memory subscribed to {}", self.conversation_id());
        Ok(())
    }

    /// Stop following the store
    pub fn unsubscribe(&self) {
        let task = self
            .sync_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.sync_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// Correct a stored turn and mirror the change in the window
    pub async fn correct(&self, turn_id: &TurnId, content: impl Into<String>) -> Result<bool> {
        let content = content.into();
        let _guard = self.writer.lock().await;
        let found = self
            .store
            .correct(self.conversation_id(), turn_id, content.clone())
            .await?;
        if found {
            write_window(&self.window).amend(turn_id, &content);
        }
        Ok(found)
    }

    /// Drop the conversation from the store and empty the window
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.writer.lock().await;
        self.store.clear(self.conversation_id()).await?;
        write_window(&self.window).clear();
        Ok(())
    }

    /// Empty the window only; the store keeps its turns
    pub async fn clear_window(&self) {
        let _guard = self.writer.lock().await;
        write_window(&self.window).clear();
    }

    fn read_window(&self) -> std::sync::RwLockReadGuard<'_, ConversationWindow> {
        self.window.read().unwrap_or_else(|e| e.into_inner())
    }
}

fn write_window(window: &RwLock<ConversationWindow>) -> std::sync::RwLockWriteGuard<'_, ConversationWindow> {
    window.write().unwrap_or_else(|e| e.into_inner())
}

impl Drop for MemoryManager {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
