//! Agent core
//!
//! A bounded reason-act loop: one user input in, one answer out, with the
//! model allowed to call registered tools for a limited number of rounds.

use thiserror::Error;

use reagent_memory::MemoryError;
use reagent_provider::ProviderError;

pub mod agent;
pub mod context;
pub mod state;
pub mod tools;

pub use agent::{Agent, AgentOptions, BatchReport, RunOutcome, RunReport};
pub use context::ContextBuilder;
pub use state::RunState;
pub use tools::{Tool, ToolError, ToolRegistry, ToolResult};

/// Lowest accepted tool iteration bound
pub const MIN_TOOL_ITERATIONS: u32 = 1;
/// Highest accepted tool iteration bound
pub const MAX_TOOL_ITERATIONS: u32 = 10;
/// Tool iteration bound when none is configured
pub const DEFAULT_TOOL_ITERATIONS: u32 = 3;

/// Returned when the model's final answer is empty
pub const FALLBACK_RESPONSE: &str = "Sorry, I couldn't generate a response.";

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("◆ EMPTY INPUT")]
    EmptyInput,

    #[error("◆ RUN ALREADY IN PROGRESS")]
    ConcurrentRunRejected,

    #[error("◆ MODEL UNAVAILABLE: {0}")]
    ModelUnavailable(String),

    #[error("◆ INVALID MODEL OUTPUT: {0}")]
    InvalidModelOutput(String),

    #[error("◆ MEMORY ERROR: {0}")]
    Memory(#[from] MemoryError),

    #[error("◆ TOOL MANIFEST ERROR: {0}")]
    ToolManifest(String),
}

impl From<ProviderError> for AgentError {
    fn from(err: ProviderError) -> Self {
        if err.is_malformed() {
            Self::InvalidModelOutput(err.to_string())
        } else {
            Self::ModelUnavailable(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
