//! Shared fakes for agent tests

#![allow(dead_code)]

use async_trait::async_trait;
use reagent_agent::{Agent, AgentOptions, Tool, ToolError, ToolResult};
use reagent_memory::{InMemoryStore, MemoryManager, SessionContext, Turn};
use reagent_provider::{
    LanguageModel, Message, ModelOutput, ModelRequest, ProviderError, ToolCall,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Replays canned outputs and records every request it receives.
/// When the script runs dry it answers with plain text "(end of script)".
#[derive(Clone, Default)]
pub struct ScriptedModel {
    outputs: Arc<Mutex<VecDeque<Result<ModelOutput, ProviderError>>>>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
    gate: Option<Gate>,
}

/// Lets a test hold a model call open
#[derive(Clone, Default)]
pub struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl ScriptedModel {
    pub fn new(outputs: Vec<Result<ModelOutput, ProviderError>>) -> Self {
        Self {
            outputs: Arc::new(Mutex::new(outputs.into())),
            ..Default::default()
        }
    }

    pub fn replies(outputs: Vec<ModelOutput>) -> Self {
        Self::new(outputs.into_iter().map(Ok).collect())
    }

    pub fn gated(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, request: ModelRequest) -> Result<ModelOutput, ProviderError> {
        self.requests.lock().unwrap().push(request);
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        self.outputs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ModelOutput::text("(end of script)")))
    }

    fn default_model(&self) -> String {
        "scripted".to_string()
    }

    fn is_configured(&self) -> bool {
        true
    }
}

/// Model output requesting the given tools, ids `call_<n>`
pub fn calling(names: &[&str]) -> ModelOutput {
    let calls = names
        .iter()
        .enumerate()
        .map(|(i, name)| ToolCall::new(format!("call_{}", i), *name, json!({})))
        .collect();
    ModelOutput::with_tool_calls("", calls)
}

/// A tool with a fixed answer that counts its invocations
pub struct FixedTool {
    name: String,
    result: ToolResult,
    pub invocations: Arc<AtomicUsize>,
}

impl FixedTool {
    pub fn new(name: &str, result: ToolResult) -> Self {
        Self {
            name: name.to_string(),
            result,
            invocations: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.invocations)
    }
}

#[async_trait]
impl Tool for FixedTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Returns a fixed result"
    }

    fn parameters(&self) -> Value {
        json!({"type": "object"})
    }

    async fn invoke(&self, _args: Value) -> Result<ToolResult, ToolError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Ok(self.result.clone())
    }
}

pub fn memory(capacity: usize) -> (Arc<InMemoryStore>, Arc<MemoryManager>) {
    let store = Arc::new(InMemoryStore::new());
    let manager = MemoryManager::new(store.clone(), SessionContext::new("u1", "conv"), capacity);
    (store, Arc::new(manager))
}

pub fn agent(model: ScriptedModel, capacity: usize) -> Agent<ScriptedModel> {
    let (_, memory) = memory(capacity);
    Agent::new(AgentOptions::new("Tester"), model, memory)
}

/// `role: content` lines of the window
pub fn transcript(turns: &[Turn]) -> Vec<String> {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role, t.content))
        .collect()
}

/// Asserts every assistant tool call is answered by the tool messages right
/// after it, and that no tool message stands on its own
pub fn assert_tool_pairing(messages: &[Message]) {
    let mut i = 0;
    while i < messages.len() {
        let message = &messages[i];
        assert_ne!(message.role, "tool", "message {} answers no call", i);
        i += 1;

        if message.role != "assistant" || message.tool_calls.is_empty() {
            continue;
        }
        let mut requested: Vec<&str> = message.tool_calls.iter().map(|c| c.id.as_str()).collect();
        let mut answered = Vec::new();
        while i < messages.len() && messages[i].role == "tool" {
            answered.push(messages[i].tool_call_id.as_deref().unwrap_or(""));
            i += 1;
        }
        requested.sort_unstable();
        answered.sort_unstable();
        assert_eq!(requested, answered, "calls and replies differ before message {}", i);
    }
}
