//! Ends the current task

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Tool, ToolError, ToolResult};

/// Signals that the task is complete; the run ends with `message`
pub struct FinishTool {
    message: String,
}

impl FinishTool {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Default for FinishTool {
    fn default() -> Self {
        Self::new("done")
    }
}

#[async_trait]
impl Tool for FinishTool {
    fn name(&self) -> &str {
        "finish"
    }

    fn description(&self) -> &str {
        "End the current conversation or task once it is complete."
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn invoke(&self, _args: Value) -> Result<ToolResult, ToolError> {
        Ok(ToolResult::executed(self.message.clone()))
    }
}
