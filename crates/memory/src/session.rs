//! Explicit session identity handed to the memory layer

use serde::{Deserialize, Serialize};

/// Who is talking and in which conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub user_id: String,
    pub conversation_id: String,
}

impl SessionContext {
    pub fn new(user_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
        }
    }

    /// Conversation dedicated to one agent persona and one user: `<agent>_<user>`
    pub fn for_agent(agent_name: &str, user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let conversation_id = format!("{}_{}", agent_name, user_id);
        Self {
            user_id,
            conversation_id,
        }
    }
}
