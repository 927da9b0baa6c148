//! Context builder for assembling model prompts

use std::collections::HashSet;
use tracing::debug;

use reagent_memory::{Role, Turn, META_TOOL_CALLS, META_TOOL_CALL_ID};
use reagent_provider::{Message, ToolCall};

/// Builds the system prompt and turns the window into provider messages
pub struct ContextBuilder;

impl ContextBuilder {
    /// Persona line followed by the tools the agent had when it was built
    pub fn system_prompt(name: &str, description: &str, tool_names: &[String]) -> String {
        let mut prompt = format!("You are {}. {}", name, description);

        if !tool_names.is_empty() {
            prompt.push_str("\n\n## Tools\n");
            for tool in tool_names {
                prompt.push_str("- ");
                prompt.push_str(tool);
                prompt.push('\n');
            }
            prompt.push_str(
                "\nCall a tool when it helps you answer. When an action tool reports success, \
                 the task is done. Otherwise reply directly with text.",
            );
        }

        prompt
    }

    /// System message followed by the window, oldest first.
    ///
    /// Each assistant turn gets back the tool calls it requested, limited to
    /// the calls answered by the tool turns directly after it. A tool turn is
    /// kept only when it answers one of those calls; its assistant turn may
    /// have been evicted, or the call may belong to another round.
    pub fn build_messages(system_prompt: &str, turns: &[Turn]) -> Vec<Message> {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(Message::system(system_prompt));

        let mut open_calls: HashSet<String> = HashSet::new();
        for (index, turn) in turns.iter().enumerate() {
            match &turn.role {
                Role::User => {
                    open_calls.clear();
                    messages.push(Message::user(&turn.content));
                }
                Role::Assistant => {
                    let replies: HashSet<&str> = turns[index + 1..]
                        .iter()
                        .take_while(|t| matches!(t.role, Role::Tool(_)))
                        .filter_map(|t| t.meta(META_TOOL_CALL_ID))
                        .collect();
                    let calls: Vec<ToolCall> = Self::tool_calls(turn)
                        .into_iter()
                        .filter(|c| replies.contains(c.id.as_str()))
                        .collect();
                    open_calls = calls.iter().map(|c| c.id.clone()).collect();
                    messages.push(Message::assistant(&turn.content).with_tool_calls(calls));
                }
                Role::Tool(name) => match turn.meta(META_TOOL_CALL_ID) {
                    // Each call takes one reply
                    Some(id) if open_calls.remove(id) => {
                        messages.push(Message::tool(Some(id.to_string()), name, &turn.content));
                    }
                    _ => debug!("◆ Dropping orphaned tool turn {}", turn.id),
                },
            }
        }

        messages
    }

    /// Tool calls recorded on an assistant turn
    pub fn tool_calls(turn: &Turn) -> Vec<ToolCall> {
        turn.meta(META_TOOL_CALLS)
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }
}
