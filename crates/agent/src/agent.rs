//! Agent - the reason-act loop

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use reagent_config::AgentDefaults;
use reagent_memory::{MemoryManager, Role, META_TOOL_CALLS, META_TOOL_CALL_ID};
use reagent_provider::{LanguageModel, ModelRequest, ToolCall};

use crate::context::ContextBuilder;
use crate::state::{RunState, SingleFlight};
use crate::tools::{builtin_tool, Tool, ToolManifest, ToolRegistry, ToolResult};
use crate::{
    AgentError, Result, DEFAULT_TOOL_ITERATIONS, FALLBACK_RESPONSE, MAX_TOOL_ITERATIONS,
    MIN_TOOL_ITERATIONS,
};

/// Persona and generation settings
#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub name: String,
    pub description: Option<String>,
    /// Replaces the generated system prompt entirely
    pub system_prompt: Option<String>,
    pub max_tool_iterations: u32,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl AgentOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            system_prompt: None,
            max_tool_iterations: DEFAULT_TOOL_ITERATIONS,
            model: None,
            temperature: None,
            top_p: None,
            max_tokens: None,
        }
    }

    /// Options carrying every configured default
    pub fn from_config(defaults: &AgentDefaults) -> Self {
        Self {
            name: defaults.name.clone(),
            description: defaults.description.clone(),
            system_prompt: defaults.system_prompt.clone(),
            max_tool_iterations: defaults.max_tool_iterations,
            model: Some(defaults.model.clone()),
            temperature: Some(defaults.temperature),
            top_p: Some(defaults.top_p),
            max_tokens: Some(defaults.max_tokens),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_tool_iterations(mut self, limit: u32) -> Self {
        self.max_tool_iterations = limit;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The model answered without requesting more tools
    Completed,
    /// A tool performed the action and its message is the answer
    ActionExecuted { tool: String },
    /// The tool round-trip budget ran out
    BudgetExhausted { limit: u32 },
}

/// Result of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub content: String,
    pub outcome: RunOutcome,
    /// Tool round-trips performed
    pub iterations: u32,
}

/// Result of a multi-input batch
#[derive(Debug)]
pub struct BatchReport {
    /// One entry per processed input, in order
    pub results: Vec<Result<String>>,
    /// True when the batch halted on a stop request before the last input
    pub stopped: bool,
}

/// A persona bound to a model, a tool set and a conversation.
///
/// At most one run is in flight at a time; a concurrent call is rejected
/// rather than queued.
pub struct Agent<M: LanguageModel> {
    options: AgentOptions,
    model: Arc<M>,
    memory: Arc<MemoryManager>,
    tools: ToolRegistry,
    system_prompt: OnceLock<String>,
    flight: SingleFlight,
    state: watch::Sender<RunState>,
    stop_requested: AtomicBool,
}

impl<M: LanguageModel> Agent<M> {
    /// Create an agent. The tool iteration bound is clamped to [1, 10].
    pub fn new(mut options: AgentOptions, model: M, memory: Arc<MemoryManager>) -> Self {
        let requested = options.max_tool_iterations;
        options.max_tool_iterations = requested.clamp(MIN_TOOL_ITERATIONS, MAX_TOOL_ITERATIONS);
        if options.max_tool_iterations != requested {
            warn!(
                "◆ max_tool_iterations {} out of range, using {}",
                requested, options.max_tool_iterations
            );
        }

        let (state, _) = watch::channel(RunState::Idle);
        Self {
            options,
            model: Arc::new(model),
            memory,
            tools: ToolRegistry::new(),
            system_prompt: OnceLock::new(),
            flight: SingleFlight::default(),
            state,
            stop_requested: AtomicBool::new(false),
        }
    }

    /// Register tools at construction
    pub fn with_tools(self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        for tool in tools {
            self.tools.register_shared(tool);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.options.name
    }

    pub fn description(&self) -> String {
        self.options.description.clone().unwrap_or_else(|| {
            format!(
                "An intelligent agent named {} capable of using tools and maintaining conversation context",
                self.options.name
            )
        })
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    pub fn max_tool_iterations(&self) -> u32 {
        self.options.max_tool_iterations
    }

    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.flight.is_busy()
    }

    /// Attach a tool after construction. Duplicates (by name) are skipped.
    /// The cached system prompt is not rebuilt, but the tool's spec is sent
    /// with every later model call.
    pub fn add_tool(&self, tool: Arc<dyn Tool>) -> bool {
        self.tools.register_shared(tool)
    }

    /// Invoke a tool directly, outside of any run
    pub async fn call_tool(&self, name: &str, args: Value) -> ToolResult {
        self.tools.invoke(name, args).await
    }

    /// Attach tools listed in a manifest file. Each name is looked up in the
    /// built-in catalog first, then in `factory`. Returns how many were added.
    pub async fn load_tools_from_manifest<F>(&self, path: &Path, factory: F) -> Result<usize>
    where
        F: Fn(&str) -> Option<Arc<dyn Tool>>,
    {
        let manifest = ToolManifest::load(path).await?;
        Ok(self.load_tools(&manifest.names(), factory))
    }

    /// Attach tools by name; unknown names are skipped with a warning
    pub fn load_tools<F>(&self, names: &[String], factory: F) -> usize
    where
        F: Fn(&str) -> Option<Arc<dyn Tool>>,
    {
        let mut added = 0;
        for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            match builtin_tool(name).or_else(|| factory(name)) {
                Some(tool) => {
                    if self.add_tool(tool) {
                        added += 1;
                    }
                }
                None => warn!("◆ Unknown tool '{}' in manifest, skipping", name),
            }
        }
        info!("◆ {} tool(s) loaded for {}", added, self.options.name);
        added
    }

    /// The system prompt, built on first use and cached
    pub fn system_prompt(&self) -> &str {
        self.system_prompt.get_or_init(|| match &self.options.system_prompt {
            Some(prompt) => prompt.clone(),
            None => ContextBuilder::system_prompt(
                &self.options.name,
                &self.description(),
                &self.tools.names(),
            ),
        })
    }

    /// Process one user input and return the answer
    pub async fn run(&self, input: &str) -> Result<String> {
        Ok(self.run_detailed(input).await?.content)
    }

    /// Process one user input, reporting how the run ended
    pub async fn run_detailed(&self, input: &str) -> Result<RunReport> {
        if input.trim().is_empty() {
            return Err(AgentError::EmptyInput);
        }

        let Some(guard) = self.flight.try_acquire(&self.state) else {
            warn!("◆ {} is busy, run rejected", self.options.name);
            return Err(AgentError::ConcurrentRunRejected);
        };

        info!("◆ {} run started", self.options.name);
        match self.reason_act(input).await {
            Ok(report) => {
                guard.complete();
                info!(
                    "◆ {} run finished: {:?} after {} tool round(s)",
                    self.options.name, report.outcome, report.iterations
                );
                Ok(report)
            }
            Err(e) => {
                guard.fail();
                error!("◆ {} run failed: {}", self.options.name, e);
                Err(e)
            }
        }
    }

    async fn reason_act(&self, input: &str) -> Result<RunReport> {
        self.memory
            .record(Role::User, input, HashMap::new())
            .await?;

        let limit = self.options.max_tool_iterations;
        let mut iterations = 0;

        loop {
            let request = self.build_request();
            debug!(
                "◆ Model call {} with {} message(s), {} tool(s)",
                iterations + 1,
                request.messages.len(),
                request.tools.len()
            );
            let output = self.model.generate(request).await?;

            let mut calls: Vec<ToolCall> = output
                .tool_calls
                .into_iter()
                .filter(|call| {
                    let keep = !call.name.trim().is_empty();
                    if !keep {
                        warn!("◆ Ignoring tool call {} without a name", call.id);
                    }
                    keep
                })
                .collect();
            assign_call_ids(&mut calls, iterations);

            let mut metadata = HashMap::new();
            if !calls.is_empty() {
                let encoded = serde_json::to_string(&calls)
                    .map_err(|e| AgentError::InvalidModelOutput(e.to_string()))?;
                metadata.insert(META_TOOL_CALLS.to_string(), encoded);
            }
            self.memory
                .record(Role::Assistant, output.content.clone(), metadata)
                .await?;

            if calls.is_empty() {
                return Ok(RunReport {
                    content: final_content(output.content),
                    outcome: RunOutcome::Completed,
                    iterations,
                });
            }

            for call in &calls {
                debug!("◆ Dispatching tool '{}' ({})", call.name, call.id);
                let result = self.tools.invoke(&call.name, call.arguments.clone()).await;

                let metadata = HashMap::from([(META_TOOL_CALL_ID.to_string(), call.id.clone())]);
                self.memory
                    .record(Role::tool(call.name.as_str()), result.render(), metadata)
                    .await?;

                match result {
                    ToolResult::Execute {
                        message,
                        success: true,
                    } => {
                        return Ok(RunReport {
                            content: message,
                            outcome: RunOutcome::ActionExecuted {
                                tool: call.name.clone(),
                            },
                            iterations: iterations + 1,
                        });
                    }
                    ToolResult::Execute {
                        message,
                        success: false,
                    } => warn!("◆ Tool '{}' reported failure: {}", call.name, message),
                    ToolResult::Query(_) => {}
                }
            }

            iterations += 1;
            if iterations >= limit {
                warn!(
                    "◆ {} exhausted its tool budget of {}",
                    self.options.name, limit
                );
                return Ok(RunReport {
                    content: exhausted_content(&output.content, limit),
                    outcome: RunOutcome::BudgetExhausted { limit },
                    iterations,
                });
            }
        }
    }

    fn build_request(&self) -> ModelRequest {
        let turns = self.memory.window(None);
        let mut request = ModelRequest::new(
            ContextBuilder::build_messages(self.system_prompt(), &turns),
            self.tools.list_specs(),
        );
        request.model = self.options.model.clone();
        request.temperature = self.options.temperature;
        request.top_p = self.options.top_p;
        request.max_tokens = self.options.max_tokens;
        request
    }

    /// Process inputs in order. A stop request is honoured before each input;
    /// the current input always runs to completion.
    pub async fn run_many<I, S>(&self, inputs: I) -> BatchReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut results = Vec::new();
        let mut stopped = false;

        for input in inputs {
            if self.stop_requested.load(Ordering::Acquire) {
                info!(
                    "◆ {} batch stopped after {} input(s)",
                    self.options.name,
                    results.len()
                );
                stopped = true;
                break;
            }

            let result = self.run(input.as_ref()).await;
            if let Err(e) = &result {
                warn!("◆ Batch input {} failed: {}", results.len() + 1, e);
            }
            results.push(result);
        }

        self.stop_requested.store(false, Ordering::Release);
        BatchReport { results, stopped }
    }

    /// Ask a running batch to halt before its next input
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    /// Same as `stop`
    pub fn pause(&self) {
        self.stop();
    }

    pub fn resume(&self) {
        self.stop_requested.store(false, Ordering::Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Stop any batch and detach from the store
    pub fn close(&self) {
        self.stop();
        self.memory.unsubscribe();
    }
}

/// Gives every call in a batch a distinct id. Missing or repeated ids become
/// `call_<iteration>_<index>`.
fn assign_call_ids(calls: &mut [ToolCall], iteration: u32) {
    let mut seen = HashSet::new();
    for (index, call) in calls.iter_mut().enumerate() {
        if call.id.trim().is_empty() || !seen.insert(call.id.clone()) {
            let id = format!("call_{}_{}", iteration, index);
            debug!("◆ Tool call '{}' recorded as {}", call.name, id);
            call.id = id;
            seen.insert(call.id.clone());
        }
    }
}

fn final_content(content: String) -> String {
    if content.trim().is_empty() {
        FALLBACK_RESPONSE.to_string()
    } else {
        content
    }
}

fn exhausted_content(content: &str, limit: u32) -> String {
    let marker = format!("[tool iteration budget of {} exhausted]", limit);
    if content.trim().is_empty() {
        marker
    } else {
        format!("{}\n\n{}", content, marker)
    }
}
