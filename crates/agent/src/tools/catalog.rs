//! Built-in tool catalog and tool manifests

use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

use super::{FinishTool, MathTool, StringTool, TimeTool, Tool};
use crate::{AgentError, Result};

/// Tools that can be created from their name alone
pub const BUILTIN_TOOLS: [&str; 4] = ["finish", "math_calculator", "string_processor", "time_utils"];

/// Create a built-in tool by name
pub fn builtin_tool(name: &str) -> Option<Arc<dyn Tool>> {
    let tool: Arc<dyn Tool> = match name {
        "finish" => Arc::new(FinishTool::default()),
        "math_calculator" => Arc::new(MathTool),
        "string_processor" => Arc::new(StringTool),
        "time_utils" => Arc::new(TimeTool),
        _ => return None,
    };
    Some(tool)
}

/// `{"tools": ["name", ...]}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolManifest {
    #[serde(default)]
    pub tools: Vec<String>,
}

impl ToolManifest {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| AgentError::ToolManifest(e.to_string()))
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AgentError::ToolManifest(format!("{}: {}", path.display(), e)))?;
        Self::parse(&text)
    }

    /// Trimmed names, blanks dropped
    pub fn names(&self) -> Vec<String> {
        self.tools
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect()
    }
}
