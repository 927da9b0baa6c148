//! Bounded, ordered view of the most recent turns

use std::sync::Arc;
use tracing::debug;

use crate::turn::Turn;

/// FIFO window over a conversation.
///
/// Clones share the underlying buffer; a write after a clone copies it, so a
/// reader holding an older clone keeps a consistent snapshot.
#[derive(Debug, Clone)]
pub struct ConversationWindow {
    capacity: usize,
    turns: Arc<Vec<Turn>>,
}

impl ConversationWindow {
    /// Capacity is at least one
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            turns: Arc::new(Vec::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Append, evicting from the front once over capacity
    pub fn push(&mut self, turn: Turn) {
        let turns = Arc::make_mut(&mut self.turns);
        turns.push(turn);
        if turns.len() > self.capacity {
            let overflow = turns.len() - self.capacity;
            turns.drain(..overflow);
            debug!("◆ Window evicted {} turn(s)", overflow);
        }
    }

    /// Swap in a store snapshot, keeping only its most recent `capacity` turns
    pub fn replace(&mut self, mut snapshot: Vec<Turn>) {
        if snapshot.len() > self.capacity {
            snapshot.drain(..snapshot.len() - self.capacity);
        }
        self.turns = Arc::new(snapshot);
    }

    /// The last `n` turns in order, or all of them
    pub fn latest(&self, n: Option<usize>) -> Vec<Turn> {
        let n = n.unwrap_or(self.turns.len()).min(self.turns.len());
        self.turns[self.turns.len() - n..].to_vec()
    }

    /// Update a turn's content in place. Returns false if it is not in the window.
    pub fn amend(&mut self, turn_id: &crate::TurnId, content: &str) -> bool {
        let Some(index) = self.turns.iter().position(|t| &t.id == turn_id) else {
            return false;
        };
        Arc::make_mut(&mut self.turns)[index].content = content.to_string();
        true
    }

    pub fn clear(&mut self) {
        self.turns = Arc::new(Vec::new());
    }
}
