//! Tool contract, registry and dispatcher

pub mod catalog;
pub mod finish;
pub mod math;
pub mod navigation;
pub mod schema;
pub mod text;
pub mod time;

pub use catalog::{builtin_tool, ToolManifest, BUILTIN_TOOLS};
pub use finish::FinishTool;
pub use math::MathTool;
pub use navigation::{NavigationCommand, NavigationTool};
pub use schema::SchemaError;
pub use text::StringTool;
pub use time::TimeTool;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, warn};

use reagent_provider::ToolSpec;

/// Outcome of a tool call
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResult {
    /// Information for the model to interpret
    Query(Value),
    /// An action was performed (or attempted). A successful one ends the run
    /// with `message` as the answer.
    Execute { message: String, success: bool },
}

impl ToolResult {
    pub fn query(data: impl Into<Value>) -> Self {
        Self::Query(data.into())
    }

    pub fn executed(message: impl Into<String>) -> Self {
        Self::Execute {
            message: message.into(),
            success: true,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Execute {
            message: message.into(),
            success: false,
        }
    }

    /// True for a successful `Execute`
    pub fn is_short_circuit(&self) -> bool {
        matches!(self, Self::Execute { success: true, .. })
    }

    /// Text stored in the transcript
    pub fn render(&self) -> String {
        match self {
            Self::Query(Value::String(text)) => text.clone(),
            Self::Query(data) => data.to_string(),
            Self::Execute {
                message,
                success: true,
            } => format!("success: {}", message),
            Self::Execute {
                message,
                success: false,
            } => format!("error: {}", message),
        }
    }
}

/// Tool failures. These are shown to the model, never returned to callers.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("tool '{0}' not found")]
    NotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Execution(String),

    #[error("tool panicked: {0}")]
    Panicked(String),
}

impl From<SchemaError> for ToolError {
    fn from(err: SchemaError) -> Self {
        Self::InvalidArguments(err.to_string())
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidArguments(err.to_string())
    }
}

/// A locally registered capability the model can call by name
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON schema of the arguments object
    fn parameters(&self) -> Value;
    async fn invoke(&self, args: Value) -> Result<ToolResult, ToolError>;
}

pub fn to_spec(tool: &dyn Tool) -> ToolSpec {
    ToolSpec::new(tool.name(), tool.description(), tool.parameters())
}

/// Ordered set of tools, unique by name. Tools can be added while runs are
/// in flight; lookups clone the tool handle and release the lock before
/// invoking.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<Vec<Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool; returns false (and keeps the existing one) on a name clash
    pub fn register<T: Tool + 'static>(&self, tool: T) -> bool {
        self.register_shared(Arc::new(tool))
    }

    pub fn register_shared(&self, tool: Arc<dyn Tool>) -> bool {
        let mut tools = self.tools.write().unwrap_or_else(|e| e.into_inner());
        if tools.iter().any(|t| t.name() == tool.name()) {
            warn!("◆ Tool '{}' already registered, skipping", tool.name());
            return false;
        }
        debug!("◆ Registered tool '{}'", tool.name());
        tools.push(tool);
        true
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|t| t.name() == name)
            .cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Names in registration order
    pub fn names(&self) -> Vec<String> {
        self.tools
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|t| t.name().to_string())
            .collect()
    }

    /// Specs in registration order
    pub fn list_specs(&self) -> Vec<ToolSpec> {
        self.tools
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|t| to_spec(t.as_ref()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke a tool. Never fails: dispatch errors and panics come back as a
    /// failed `Execute`.
    pub async fn invoke(&self, name: &str, args: Value) -> ToolResult {
        match self.dispatch(name, args).await {
            Ok(result) => result,
            Err(e) => {
                warn!("◆ Tool '{}' failed: {}", name, e);
                ToolResult::failed(e.to_string())
            }
        }
    }

    /// Look up, validate and run a tool, surfacing the failure kind
    pub async fn dispatch(&self, name: &str, args: Value) -> Result<ToolResult, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        let args = schema::validate_arguments(&tool.parameters(), args)?;

        debug!("◆ Invoking tool '{}'", name);
        AssertUnwindSafe(tool.invoke(args))
            .catch_unwind()
            .await
            .map_err(|payload| ToolError::Panicked(panic_message(payload)))?
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
