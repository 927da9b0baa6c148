//! Reason-act loop behaviour

mod common;

use common::{
    agent, assert_tool_pairing, calling, memory, transcript, FixedTool, ScriptedModel,
};
use reagent_agent::tools::FinishTool;
use reagent_agent::{
    Agent, AgentError, AgentOptions, RunOutcome, RunState, ToolResult, FALLBACK_RESPONSE,
};
use reagent_memory::{
    MemoryError, MemoryManager, MemoryStore, SessionContext, SnapshotStream, Turn, TurnId,
    META_TOOL_CALLS, META_TOOL_CALL_ID,
};
use reagent_provider::{ModelOutput, ProviderError, ToolCall};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[test]
fn test_iteration_bound_is_clamped() {
    for (requested, expected) in [(0, 1), (1, 1), (5, 5), (10, 10), (11, 10), (u32::MAX, 10)] {
        let (_, memory) = memory(10);
        let agent = Agent::new(
            AgentOptions::new("A").with_max_tool_iterations(requested),
            ScriptedModel::default(),
            memory,
        );
        assert_eq!(agent.max_tool_iterations(), expected);
    }
}

#[tokio::test]
async fn test_plain_answer() {
    let model = ScriptedModel::replies(vec![ModelOutput::text("Hi there")]);
    let agent = agent(model.clone(), 10);

    let report = agent.run_detailed("hello").await.unwrap();
    assert_eq!(report.content, "Hi there");
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.iterations, 0);
    assert_eq!(agent.state(), RunState::Idle);
    assert_eq!(
        transcript(&agent.memory().window(None)),
        vec!["user: hello", "assistant: Hi there"]
    );
    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn test_tool_results_follow_request_order() {
    let model = ScriptedModel::replies(vec![calling(&["a", "b"]), ModelOutput::text("final")]);
    let agent = agent(model.clone(), 20);
    agent.add_tool(Arc::new(FixedTool::new("a", ToolResult::query("from a"))));
    agent.add_tool(Arc::new(FixedTool::new("b", ToolResult::query("from b"))));

    let report = agent.run_detailed("go").await.unwrap();
    assert_eq!(report.content, "final");
    assert_eq!(report.iterations, 1);

    assert_eq!(
        transcript(&agent.memory().window(None)),
        vec!["user: go", "assistant: ", "tool:a: from a", "tool:b: from b", "assistant: final"]
    );
    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn test_successful_execute_short_circuits() {
    let model = ScriptedModel::replies(vec![calling(&["a", "b"]), ModelOutput::text("never")]);
    let agent = agent(model.clone(), 20);
    let b = FixedTool::new("b", ToolResult::query("unused"));
    let b_count = b.count();
    agent.add_tool(Arc::new(FixedTool::new("a", ToolResult::executed("X"))));
    agent.add_tool(Arc::new(b));

    let report = agent.run_detailed("act").await.unwrap();
    assert_eq!(report.content, "X");
    assert_eq!(
        report.outcome,
        RunOutcome::ActionExecuted {
            tool: "a".to_string()
        }
    );

    let window = agent.memory().window(None);
    assert!(window.iter().all(|t| t.role.tool_name() != Some("b")));
    assert_eq!(b_count.load(Ordering::SeqCst), 0);
    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn test_failed_execute_gets_a_follow_up_call() {
    let model = ScriptedModel::replies(vec![
        calling(&["a"]),
        ModelOutput::text("I could not do that"),
    ]);
    let agent = agent(model.clone(), 20);
    agent.add_tool(Arc::new(FixedTool::new("a", ToolResult::failed("Y"))));

    let answer = agent.run("try").await.unwrap();
    assert_eq!(answer, "I could not do that");
    assert_eq!(model.calls(), 2);

    let window = agent.memory().window(None);
    let tool_turn = window
        .iter()
        .find(|t| t.role.tool_name() == Some("a"))
        .unwrap();
    assert!(tool_turn.content.contains('Y'));
    assert_eq!(tool_turn.content, "error: Y");

    // The follow-up request replays the failed result
    let requests = model.requests();
    let second = &requests[1];
    let last = second.messages.last().unwrap();
    assert_eq!(last.role, "tool");
    assert_eq!(last.content, "error: Y");
}

#[tokio::test]
async fn test_finish_scenario_with_small_window() {
    let model = ScriptedModel::replies(vec![calling(&["finish"])]);
    let agent = agent(model, 3);
    agent.add_tool(Arc::new(FinishTool::default()));

    assert_eq!(agent.run("hello").await.unwrap(), "done");
    assert_eq!(
        transcript(&agent.memory().window(None)),
        vec!["user: hello", "assistant: ", "tool:finish: success: done"]
    );

    agent
        .memory()
        .append(Turn::user("conv", "again"))
        .await
        .unwrap();
    let window = agent.memory().window(None);
    assert_eq!(window.len(), 3);
    assert!(window.iter().all(|t| t.content != "hello"));
    assert_eq!(window.last().unwrap().content, "again");
}

#[tokio::test]
async fn test_budget_exhaustion_is_not_an_error() {
    let model = ScriptedModel::replies(vec![
        ModelOutput::with_tool_calls("thinking", vec![ToolCall::new("c1", "lookup", json!({}))]),
        calling(&["lookup"]),
    ]);
    let (_, memory) = memory(20);
    let agent = Agent::new(
        AgentOptions::new("A").with_max_tool_iterations(1),
        model.clone(),
        memory,
    );
    agent.add_tool(Arc::new(FixedTool::new("lookup", ToolResult::query("data"))));

    let report = agent.run_detailed("search").await.unwrap();
    assert_eq!(report.outcome, RunOutcome::BudgetExhausted { limit: 1 });
    assert_eq!(report.iterations, 1);
    assert_eq!(
        report.content,
        "thinking\n\n[tool iteration budget of 1 exhausted]"
    );
    assert_eq!(model.calls(), 1);
    assert_eq!(agent.state(), RunState::Idle);
}

#[tokio::test]
async fn test_budget_allows_configured_round_trips() {
    let model = ScriptedModel::replies(vec![
        calling(&["lookup"]),
        calling(&["lookup"]),
        calling(&["lookup"]),
    ]);
    let (_, memory) = memory(50);
    let agent = Agent::new(
        AgentOptions::new("A").with_max_tool_iterations(3),
        model.clone(),
        memory,
    );
    let tool = FixedTool::new("lookup", ToolResult::query("data"));
    let count = tool.count();
    agent.add_tool(Arc::new(tool));

    let report = agent.run_detailed("search").await.unwrap();
    assert_eq!(report.outcome, RunOutcome::BudgetExhausted { limit: 3 });
    assert_eq!(model.calls(), 3);
    assert_eq!(count.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_unknown_tool_is_reported_to_the_model() {
    let model = ScriptedModel::replies(vec![calling(&["ghost"]), ModelOutput::text("sorry")]);
    let agent = agent(model.clone(), 20);

    assert_eq!(agent.run("haunt").await.unwrap(), "sorry");
    let window = agent.memory().window(None);
    let ghost = window
        .iter()
        .find(|t| t.role.tool_name() == Some("ghost"))
        .unwrap();
    assert_eq!(ghost.content, "error: tool 'ghost' not found");
    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn test_nameless_calls_are_ignored() {
    let model = ScriptedModel::replies(vec![ModelOutput::with_tool_calls(
        "just text",
        vec![ToolCall::new("c0", "  ", json!({}))],
    )]);
    let agent = agent(model.clone(), 20);

    let report = agent.run_detailed("x").await.unwrap();
    assert_eq!(report.content, "just text");
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn test_empty_answer_falls_back() {
    let agent = agent(ScriptedModel::replies(vec![ModelOutput::text("   ")]), 10);
    assert_eq!(agent.run("hi").await.unwrap(), FALLBACK_RESPONSE);
}

#[tokio::test]
async fn test_empty_input_is_rejected_before_anything_happens() {
    let model = ScriptedModel::default();
    let agent = agent(model.clone(), 10);

    assert!(matches!(agent.run("  \n").await, Err(AgentError::EmptyInput)));
    assert_eq!(agent.state(), RunState::Idle);
    assert!(agent.memory().is_empty());
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn test_gateway_failure_is_fatal_and_keeps_transcript() {
    let model = ScriptedModel::new(vec![
        Err(ProviderError::Api("overloaded".to_string())),
        Ok(ModelOutput::text("back")),
    ]);
    let agent = agent(model, 10);

    let err = agent.run("first").await.unwrap_err();
    assert!(matches!(err, AgentError::ModelUnavailable(_)));
    assert_eq!(agent.state(), RunState::Error);
    assert_eq!(transcript(&agent.memory().window(None)), vec!["user: first"]);

    // A new run leaves the error state
    assert_eq!(agent.run("second").await.unwrap(), "back");
    assert_eq!(agent.state(), RunState::Idle);
}

#[tokio::test]
async fn test_malformed_output_maps_to_invalid_model_output() {
    let model = ScriptedModel::new(vec![Err(ProviderError::InvalidResponse(
        "no choices".to_string(),
    ))]);
    let agent = agent(model, 10);
    assert!(matches!(
        agent.run("x").await,
        Err(AgentError::InvalidModelOutput(_))
    ));
    assert_eq!(agent.state(), RunState::Error);
}

#[tokio::test]
async fn test_transcript_metadata_links_calls_and_results() {
    let model = ScriptedModel::replies(vec![calling(&["a"]), ModelOutput::text("ok")]);
    let agent = agent(model.clone(), 20);
    agent.add_tool(Arc::new(FixedTool::new("a", ToolResult::query(json!({"n": 1})))));
    agent.run("x").await.unwrap();

    let window = agent.memory().window(None);
    let calls: Vec<ToolCall> = serde_json::from_str(window[1].meta(META_TOOL_CALLS).unwrap()).unwrap();
    assert_eq!(calls[0].name, "a");
    assert_eq!(window[2].meta(META_TOOL_CALL_ID), Some("call_0"));
    assert_eq!(window[2].content, r#"{"n":1}"#);
    assert!(window[3].meta(META_TOOL_CALLS).is_none());

    let requests = model.requests();
    let follow_up = &requests[1];
    let assistant = &follow_up.messages[2];
    assert_eq!(assistant.tool_calls[0].id, "call_0");
}

#[tokio::test]
async fn test_requests_carry_prompt_tools_and_overrides() {
    let model = ScriptedModel::replies(vec![ModelOutput::text("one"), ModelOutput::text("two")]);
    let (_, memory) = memory(10);
    let agent = Agent::new(
        AgentOptions::new("Tutor")
            .with_model("qwen-plus")
            .with_temperature(0.2)
            .with_max_tokens(256),
        model.clone(),
        memory,
    );
    agent.add_tool(Arc::new(FinishTool::default()));

    agent.run("first").await.unwrap();
    agent.add_tool(Arc::new(FixedTool::new("late", ToolResult::query("x"))));
    agent.run("second").await.unwrap();

    let requests = model.requests();
    let first = &requests[0];
    assert_eq!(first.model.as_deref(), Some("qwen-plus"));
    assert_eq!(first.temperature, Some(0.2));
    assert_eq!(first.max_tokens, Some(256));
    assert_eq!(first.messages[0].role, "system");
    assert!(first.messages[0].content.contains("Tutor"));
    assert!(first.messages[0].content.contains("finish"));

    // Late tools are offered but the cached prompt is unchanged
    let second = &requests[1];
    assert!(second.tools.iter().any(|t| t.name == "late"));
    assert_eq!(second.messages[0].content, first.messages[0].content);
    assert!(!second.messages[0].content.contains("late"));
    // system + user + assistant + user
    assert_eq!(second.messages.len(), 4);
}

#[tokio::test]
async fn test_explicit_system_prompt_and_default_description() {
    let (_, memory) = memory(10);
    let agent = Agent::new(
        AgentOptions::new("Home"),
        ScriptedModel::default(),
        memory.clone(),
    );
    assert_eq!(
        agent.description(),
        "An intelligent agent named Home capable of using tools and maintaining conversation context"
    );

    let custom = Agent::new(
        AgentOptions::new("Home").with_system_prompt("Be brief."),
        ScriptedModel::default(),
        memory,
    );
    assert_eq!(custom.system_prompt(), "Be brief.");
}

#[tokio::test]
async fn test_call_tool_directly() {
    let agent = agent(ScriptedModel::default(), 10);
    agent.add_tool(Arc::new(FinishTool::new("bye")));
    assert!(!agent.add_tool(Arc::new(FinishTool::default())));

    assert_eq!(agent.call_tool("finish", json!({})).await, ToolResult::executed("bye"));
    assert!(!agent.call_tool("missing", json!({})).await.is_short_circuit());
}

struct FailingStore;

#[async_trait::async_trait]
impl MemoryStore for FailingStore {
    fn name(&self) -> &str {
        "failing"
    }
    async fn insert(&self, _turn: Turn) -> reagent_memory::Result<TurnId> {
        Err(MemoryError::Unavailable("read-only".to_string()))
    }
    async fn query(&self, _c: &str) -> reagent_memory::Result<Vec<Turn>> {
        Ok(Vec::new())
    }
    async fn subscribe(&self, _c: &str) -> reagent_memory::Result<SnapshotStream> {
        Err(MemoryError::Unavailable("read-only".to_string()))
    }
    async fn correct(&self, _c: &str, _id: &TurnId, _content: String) -> reagent_memory::Result<bool> {
        Ok(false)
    }
    async fn clear(&self, _c: &str) -> reagent_memory::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_memory_write_failure_is_returned() {
    let memory = Arc::new(MemoryManager::new(
        Arc::new(FailingStore),
        SessionContext::new("u", "conv"),
        10,
    ));
    let model = ScriptedModel::default();
    let agent = Agent::new(AgentOptions::new("A"), model.clone(), memory);

    assert!(matches!(agent.run("hi").await, Err(AgentError::Memory(_))));
    assert_eq!(agent.state(), RunState::Error);
    assert!(!agent.is_running());
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn test_query_result_without_call_id_reaches_next_request() {
    let model = ScriptedModel::replies(vec![
        ModelOutput::with_tool_calls("", vec![ToolCall::new("", "lookup", json!({}))]),
        ModelOutput::text("It is FACT-42"),
    ]);
    let agent = agent(model.clone(), 20);
    agent.add_tool(Arc::new(FixedTool::new("lookup", ToolResult::query("FACT-42"))));

    assert_eq!(agent.run("q").await.unwrap(), "It is FACT-42");

    let requests = model.requests();
    let follow_up = &requests[1].messages;
    assert_eq!(follow_up.len(), 4);
    assert_tool_pairing(follow_up);

    let reply = &follow_up[3];
    assert_eq!(reply.role, "tool");
    assert_eq!(reply.content, "FACT-42");
    assert_eq!(reply.name.as_deref(), Some("lookup"));
    let id = reply.tool_call_id.clone().unwrap();
    assert!(!id.is_empty());
    assert_eq!(follow_up[2].tool_calls[0].id, id);

    // The stored transcript carries the same id on both sides
    let window = agent.memory().window(None);
    let calls: Vec<ToolCall> = serde_json::from_str(window[1].meta(META_TOOL_CALLS).unwrap()).unwrap();
    assert_eq!(calls[0].id, id);
    assert_eq!(window[2].meta(META_TOOL_CALL_ID), Some(id.as_str()));
}

#[tokio::test]
async fn test_failed_action_without_call_ids_reaches_next_request() {
    let model = ScriptedModel::replies(vec![
        ModelOutput::with_tool_calls(
            "",
            vec![
                ToolCall::new("", "save", json!({})),
                ToolCall::new("", "save", json!({})),
            ],
        ),
        ModelOutput::text("could not save"),
    ]);
    let agent = agent(model.clone(), 20);
    agent.add_tool(Arc::new(FixedTool::new("save", ToolResult::failed("disk full"))));

    let report = agent.run_detailed("save it").await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);

    let requests = model.requests();
    let follow_up = &requests[1].messages;
    assert_tool_pairing(follow_up);

    let replies: Vec<_> = follow_up.iter().filter(|m| m.role == "tool").collect();
    assert_eq!(replies.len(), 2);
    assert!(replies.iter().all(|m| m.content == "error: disk full"));
    assert_ne!(replies[0].tool_call_id, replies[1].tool_call_id);
}

#[tokio::test]
async fn test_call_ids_reused_across_runs_stay_paired() {
    let model = ScriptedModel::replies(vec![
        // The first action ends the run, so call_1 never executes
        calling(&["act", "look"]),
        calling(&["look", "look"]),
        ModelOutput::text("seen twice"),
        ModelOutput::text("third"),
    ]);
    let agent = agent(model.clone(), 50);
    agent.add_tool(Arc::new(FixedTool::new("act", ToolResult::executed("acted"))));
    agent.add_tool(Arc::new(FixedTool::new("look", ToolResult::query("seen"))));

    assert_eq!(agent.run("one").await.unwrap(), "acted");
    assert_eq!(agent.run("two").await.unwrap(), "seen twice");
    assert_eq!(agent.run("three").await.unwrap(), "third");

    let requests = model.requests();
    assert_eq!(requests.len(), 4);
    for request in &requests {
        assert_tool_pairing(&request.messages);
    }

    let last = &requests[3].messages;
    let first_round: Vec<_> = last[2].tool_calls.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(first_round, vec!["call_0"]);
    assert_eq!(last[3].content, "success: acted");
    assert_eq!(last[5].tool_calls.len(), 2);
    assert_eq!(last[6].content, "seen");
    assert_eq!(last[7].content, "seen");
}
