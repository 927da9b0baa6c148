//! reagent command implementations

use anyhow::{Context, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use reagent_agent::tools::{builtin_tool, NavigationCommand, NavigationTool};
use reagent_agent::{Agent, AgentOptions, Tool, ToolRegistry, MAX_TOOL_ITERATIONS, MIN_TOOL_ITERATIONS};
use reagent_config::{self, Config, MemoryBackend};
use reagent_memory::{FileStore, InMemoryStore, MemoryManager, MemoryStore, SessionContext};
use reagent_provider::compat::DEFAULT_API_BASE;
use reagent_provider::{CompatProvider, GenerationDefaults};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

fn store_for(config: &Config) -> Arc<dyn MemoryStore> {
    match config.memory.backend {
        MemoryBackend::File => Arc::new(FileStore::new(config.conversations_dir())),
        MemoryBackend::Memory => Arc::new(InMemoryStore::new()),
    }
}

/// Explicit conversation, or the agent's default conversation for the user
fn session_for(config: &Config, conversation: Option<String>, user: Option<String>) -> SessionContext {
    let user = user.unwrap_or_else(|| config.user.id.clone());
    match conversation {
        Some(id) => SessionContext::new(user, id),
        None => SessionContext::for_agent(&config.agent.defaults.name, user),
    }
}

/// Resolves tools that need host wiring
fn host_tools(
    sender: mpsc::UnboundedSender<NavigationCommand>,
    user_id: String,
) -> impl Fn(&str) -> Option<Arc<dyn Tool>> {
    move |name: &str| {
        if name != "navigate_to_screen" {
            return None;
        }
        let tool: Arc<dyn Tool> = Arc::new(NavigationTool::new(sender.clone(), Some(user_id.clone())));
        Some(tool)
    }
}

async fn build_agent(
    config: &Config,
    session: SessionContext,
) -> Result<(Agent<CompatProvider>, mpsc::UnboundedReceiver<NavigationCommand>)> {
    let api_key = config
        .api_key()
        .context("No API key configured. Set provider.api_key in ~/.reagent/config.json or REAGENT_API_KEY")?;

    let defaults = &config.agent.defaults;
    let provider = CompatProvider::new(
        api_key,
        config.api_base(),
        GenerationDefaults {
            model: defaults.model.clone(),
            temperature: defaults.temperature,
            top_p: defaults.top_p,
            max_tokens: defaults.max_tokens,
        },
    );

    let user_id = session.user_id.clone();
    let memory = Arc::new(MemoryManager::new(
        store_for(config),
        session,
        defaults.memory_capacity,
    ));
    let loaded = memory
        .load()
        .await
        .context("Failed to load conversation")?;
    info!(
        "◆ Conversation {} resumed with {} turn(s)",
        memory.conversation_id(),
        loaded
    );

    let agent = Agent::new(AgentOptions::from_config(defaults), provider, memory);
    let (tx, rx) = mpsc::unbounded_channel();
    agent.load_tools(&config.tools.enabled, host_tools(tx, user_id));

    Ok((agent, rx))
}

/// Prints navigation requests until every sender is gone
fn spawn_navigation_printer(mut rx: mpsc::UnboundedReceiver<NavigationCommand>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            println!("◆ Navigate → {}", command.route);
        }
    })
}

/// Initialize config and data directories
pub async fn init_command() -> Result<()> {
    println!("◆ Initializing reagent...");
    println!("{}", RULE);

    let config = reagent_config::init()
        .await
        .context("Failed to initialize config")?;

    println!("✓ Config: {}", reagent_config::config_path().display());
    println!("✓ Conversations: {}", config.conversations_dir().display());

    println!("\n◆ reagent initialized");
    println!("\nNext steps:");
    println!("  1. Add your API key to ~/.reagent/config.json (provider.api_key)");
    println!("     or export REAGENT_API_KEY");
    println!("  2. Start chatting: reagent chat -m \"Hello!\"");

    Ok(())
}

/// Chat with the agent
pub async fn chat_command(
    message: Option<String>,
    conversation: Option<String>,
    user: Option<String>,
) -> Result<()> {
    let config = Config::load().await?;
    let session = session_for(&config, conversation, user);
    let (agent, nav_rx) = build_agent(&config, session).await?;
    let printer = spawn_navigation_printer(nav_rx);

    if let Some(msg) = message {
        let response = agent.run(&msg).await?;
        println!("\n◆ {}", response);
    } else {
        println!("◆ Interactive mode (type 'exit' to quit)");
        println!("{}", RULE);

        loop {
            print!("◆ ");
            std::io::stdout().flush()?;

            let mut input = String::new();
            if std::io::stdin().read_line(&mut input)? == 0 {
                break;
            }
            let input = input.trim();

            if input.is_empty() {
                continue;
            }
            if input == "exit" || input == "quit" {
                break;
            }

            match agent.run(input).await {
                Ok(response) => println!("\n◆ {}\n", response),
                Err(e) => println!("\n✗ {}\n", e),
            }
        }
    }

    agent.close();
    drop(agent);
    let _ = printer.await;
    Ok(())
}

/// Run every non-blank line of a file through the agent. Ctrl-C halts the
/// batch once the current input is done.
pub async fn batch_command(file: PathBuf, conversation: Option<String>) -> Result<()> {
    let text = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let inputs: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();

    if inputs.is_empty() {
        println!("No inputs in {}", file.display());
        return Ok(());
    }

    let config = Config::load().await?;
    let session = session_for(&config, conversation, None);
    let (agent, nav_rx) = build_agent(&config, session).await?;
    let agent = Arc::new(agent);
    let printer = spawn_navigation_printer(nav_rx);

    let interrupt = {
        let agent = Arc::clone(&agent);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("◆ Interrupt received, stopping after the current input");
                agent.stop();
            }
        })
    };

    let report = agent.run_many(&inputs).await;
    interrupt.abort();
    let _ = interrupt.await;

    for (input, result) in inputs.iter().zip(&report.results) {
        match result {
            Ok(answer) => println!("◆ {}\n  {}\n", input, answer),
            Err(e) => println!("✗ {}\n  {}\n", input, e),
        }
    }

    let failed = report.results.iter().filter(|r| r.is_err()).count();
    println!("{}", RULE);
    println!(
        "Processed {}/{} input(s), {} failed",
        report.results.len(),
        inputs.len(),
        failed
    );
    if report.stopped {
        println!("Stopped before the last input");
    }

    agent.close();
    drop(agent);
    let _ = printer.await;
    Ok(())
}

/// Show stored turns of a conversation
pub async fn history_command(conversation: Option<String>, limit: Option<usize>) -> Result<()> {
    let config = Config::load().await?;
    let session = session_for(&config, conversation, None);

    if config.memory.backend == MemoryBackend::Memory {
        println!("Memory backend is ephemeral, no history is kept");
        return Ok(());
    }

    let store = FileStore::new(config.conversations_dir());
    let turns = store
        .query(&session.conversation_id)
        .await
        .context("Failed to read conversation")?;

    if turns.is_empty() {
        println!("No turns in {}", session.conversation_id);
        let known = store.list().await;
        if !known.is_empty() {
            println!("Known conversations: {}", known.join(", "));
        }
        return Ok(());
    }

    let skip = limit.map_or(0, |n| turns.len().saturating_sub(n));
    println!("◆ Conversation {}", session.conversation_id);
    println!("{}", RULE);
    for turn in &turns[skip..] {
        println!(
            "[{}] {}: {}",
            turn.created_at.format("%Y-%m-%d %H:%M:%S"),
            turn.role,
            turn.content
        );
    }

    Ok(())
}

/// List enabled tools
pub async fn tools_command() -> Result<()> {
    let config = Config::load().await?;
    let registry = ToolRegistry::new();
    let (tx, _rx) = mpsc::unbounded_channel();
    let factory = host_tools(tx, config.user.id.clone());

    let mut unknown = Vec::new();
    for name in config.tools.enabled.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        match builtin_tool(name).or_else(|| factory(name)) {
            Some(tool) => {
                registry.register_shared(tool);
            }
            None => unknown.push(name.to_string()),
        }
    }

    println!("◆ Enabled tools");
    println!("{}", RULE);
    for spec in registry.list_specs() {
        println!("  {} - {}", spec.name, spec.description);
    }
    if registry.is_empty() {
        println!("  (none)");
    }
    if !unknown.is_empty() {
        println!("Unknown: {}", unknown.join(", "));
    }

    Ok(())
}

/// Show system status
pub async fn status_command() -> Result<()> {
    let config_path = reagent_config::config_path();
    let config = Config::load().await?;
    let defaults = &config.agent.defaults;

    println!("◆ reagent Status");
    println!("{}", RULE);

    let config_state = if config_path.exists() {
        "✓"
    } else {
        "✗ (run `reagent init`)"
    };
    println!("Config: {} {}", config_path.display(), config_state);
    println!("Data dir: {}", reagent_config::data_dir().display());

    let backend = match config.memory.backend {
        MemoryBackend::File => "file",
        MemoryBackend::Memory => "memory",
    };
    println!(
        "Conversations: {} ({} backend)",
        config.conversations_dir().display(),
        backend
    );

    println!("Agent: {}", defaults.name);
    println!("Model: {}", defaults.model);
    println!(
        "API base: {}",
        config.api_base().as_deref().unwrap_or(DEFAULT_API_BASE)
    );
    println!(
        "API key: {}",
        if config.has_api_key() { "[Set]" } else { "[Not set]" }
    );
    println!("Memory capacity: {} turns", defaults.memory_capacity);
    println!(
        "Tool iterations: {}",
        defaults
            .max_tool_iterations
            .clamp(MIN_TOOL_ITERATIONS, MAX_TOOL_ITERATIONS)
    );
    println!("User: {}", config.user.id);

    Ok(())
}
