//! Conversation memory
//!
//! Turns are appended to a `MemoryStore` (the durable log) and mirrored in a
//! bounded `ConversationWindow` owned by the `MemoryManager`, which is what
//! the agent reads its prompt context from.

use thiserror::Error;

pub mod file_store;
pub mod manager;
pub mod session;
pub mod store;
pub mod turn;
pub mod window;

pub use file_store::FileStore;
pub use manager::MemoryManager;
pub use session::SessionContext;
pub use store::{InMemoryStore, MemoryStore, SnapshotStream};
pub use turn::{Role, Turn, TurnId, META_TOOL_CALLS, META_TOOL_CALL_ID};
pub use window::ConversationWindow;

/// Default number of turns kept in a window
pub const DEFAULT_CAPACITY: usize = 100;

/// Memory errors
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("◆ STORAGE IO ERROR: {0}")]
    Io(#[from] std::io::Error),

    #[error("◆ STORAGE DECODE ERROR: {0}")]
    Json(#[from] serde_json::Error),

    #[error("◆ INVALID ROLE: {0}")]
    InvalidRole(String),

    #[error("◆ TURN BELONGS TO '{turn}', MANAGER IS BOUND TO '{expected}'")]
    ConversationMismatch { expected: String, turn: String },

    #[error("◆ STORE UNAVAILABLE: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, MemoryError>;
