//! Sidekick 循环集成测试：脚本化 LLM + 桩工具，不访问网络

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use product_intel::core::{AgentError, SessionId, SessionResource};
use product_intel::llm::ScriptedLlmClient;
use product_intel::memory::{ChatTurn, InMemorySessionStore, Message, SessionStore, ToolCallRequest};
use product_intel::sidekick::{LoopLimits, RunStats, SidekickEvent};
use product_intel::tools::{Tool, ToolRegistry};
use product_intel::Sidekick;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

const GOAL: &str = "competitor analysis: produce positioning vs. Anthropic and Google";
const REPORT: &str = "# GPT-5 Positioning\n\n- Strong reasoning\n\n## Sources\n- https://openai.com/index/gpt-5";

struct StubSearch;

#[async_trait]
impl Tool for StubSearch {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Stub web search"
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        Ok(format!("results for {}", args["query"].as_str().unwrap_or("")))
    }
}

struct Broken;

#[async_trait]
impl Tool for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    async fn execute(&self, _args: Value) -> Result<String, String> {
        Err("upstream returned 500".to_string())
    }
}

struct Slow;

#[async_trait]
impl Tool for Slow {
    fn name(&self) -> &str {
        "slow"
    }

    fn description(&self) -> &str {
        "Never finishes in time"
    }

    async fn execute(&self, _args: Value) -> Result<String, String> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok("late".to_string())
    }
}

fn registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(StubSearch);
    registry.register(Broken);
    registry.register(Slow);
    registry
}

fn sidekick(llm: &Arc<ScriptedLlmClient>, limits: LoopLimits) -> Sidekick {
    Sidekick::new(llm.clone(), llm.clone(), registry(), 120, limits)
}

fn tool_call(id: &str, name: &str, args: &str) -> Message {
    Message::assistant_with_tools("", vec![ToolCallRequest::new(id, name, args)])
}

fn verdict(feedback: &str, goal_met: bool, needs_user_input: bool) -> Value {
    json!({ "feedback": feedback, "goal_met": goal_met, "needs_user_input": needs_user_input })
}

#[tokio::test]
async fn test_tool_round_then_accepted_report() {
    let llm = Arc::new(
        ScriptedLlmClient::new()
            .with_completion(tool_call("c1", "search", r#"{"query":"GPT-5 launch"}"#))
            .with_completion(Message::assistant(REPORT))
            .with_verdict(verdict("ok", true, false)),
    );
    let sidekick = sidekick(&llm, LoopLimits::default());

    let (out, stats) = sidekick
        .run_with_stats("OpenAI GPT-5 launch", GOAL, &[], &CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(
        out,
        vec![
            ChatTurn::user("OpenAI GPT-5 launch"),
            ChatTurn::assistant(REPORT),
            ChatTurn::assistant("Evaluator Feedback: ok"),
        ]
    );
    assert_eq!(
        stats,
        RunStats {
            worker_calls: 2,
            tool_dispatches: 1,
            evaluator_calls: 1,
            forced_stop: false,
        }
    );
    assert_eq!(llm.worker_calls(), 2);
    assert_eq!(llm.evaluator_calls(), 1);

    // 第二次 Worker 调用看到了工具结果，且 system 指令唯一
    let second = &llm.calls()[1];
    assert!(second.messages.contains(&Message::tool("c1", "results for GPT-5 launch")));
    assert_eq!(second.messages.iter().filter(|m| m.is_system()).count(), 1);
    assert!(second.messages[0].is_system());
    assert!(second.tool_names.contains(&"search".to_string()));
    assert!(llm.worker_directive(0).unwrap().contains("Competitor"));
}

#[tokio::test]
async fn test_rejected_report_feeds_back_into_next_directive() {
    let llm = Arc::new(
        ScriptedLlmClient::new()
            .with_completion(Message::assistant("draft v1"))
            .with_completion(Message::assistant("draft v2"))
            .with_verdict(verdict("Add a pricing comparison table", false, false))
            .with_verdict(verdict("ok", true, false)),
    );
    let sidekick = sidekick(&llm, LoopLimits::default());

    let out = sidekick.run("OpenAI GPT-5 launch", GOAL, &[]).await.unwrap();

    let contents: Vec<&str> = out.iter().map(|t| t.content.as_str()).collect();
    assert_eq!(
        contents,
        vec![
            "OpenAI GPT-5 launch",
            "draft v1",
            "Evaluator Feedback: Add a pricing comparison table",
            "draft v2",
            "Evaluator Feedback: ok",
        ]
    );
    assert!(!llm.worker_directive(0).unwrap().contains("Feedback to address"));
    assert!(llm
        .worker_directive(1)
        .unwrap()
        .contains("Add a pricing comparison table"));
}

#[tokio::test]
async fn test_failing_tool_does_not_abort_run() {
    let llm = Arc::new(
        ScriptedLlmClient::new()
            .with_completion(tool_call("c1", "broken", "{}"))
            .with_completion(Message::assistant(REPORT))
            .with_verdict(verdict("ok", true, false)),
    );
    let sidekick = sidekick(&llm, LoopLimits::default());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let out = sidekick
        .run_with("launch", GOAL, &[], &CancellationToken::new(), Some(&tx))
        .await
        .unwrap();

    assert_eq!(out.last().unwrap().content, "Evaluator Feedback: ok");
    let tool_result = llm.calls()[1]
        .messages
        .iter()
        .find(|m| matches!(m, Message::Tool { .. }))
        .cloned()
        .unwrap();
    assert!(tool_result.content().starts_with("Error: "));
    assert!(tool_result.content().contains("upstream returned 500"));

    let mut saw_failure = false;
    let mut saw_verdict = false;
    while let Ok(ev) = rx.try_recv() {
        match ev {
            SidekickEvent::ToolFailure { tool, .. } => saw_failure = tool == "broken",
            SidekickEvent::Verdict { goal_met, .. } => saw_verdict = goal_met,
            _ => {}
        }
    }
    assert!(saw_failure && saw_verdict);
}

#[tokio::test]
async fn test_evaluator_asking_for_input_ends_run() {
    let llm = Arc::new(
        ScriptedLlmClient::new()
            .with_completion(Message::assistant("Which competitors should I cover?"))
            .with_verdict(verdict("The assistant needs the competitor list", false, true)),
    );
    let sidekick = sidekick(&llm, LoopLimits::default());

    let out = sidekick.run("compare", GOAL, &[]).await.unwrap();

    assert_eq!(out.len(), 3);
    assert_eq!(llm.worker_calls(), 1);
    assert_eq!(llm.evaluator_calls(), 1);
}

#[tokio::test]
async fn test_evaluation_limit_forces_user_input() {
    let llm = Arc::new(
        ScriptedLlmClient::new()
            .with_completion(Message::assistant("draft v1"))
            .with_completion(Message::assistant("draft v2"))
            .with_verdict(verdict("still missing sources", false, false))
            .with_verdict(verdict("still missing sources", false, false)),
    );
    let limits = LoopLimits {
        max_evaluations: 2,
        max_worker_steps: 25,
    };
    let store = Arc::new(InMemorySessionStore::new());
    let sidekick = sidekick(&llm, limits).with_store(store.clone());
    let id = SessionId::from("limited");

    sidekick
        .run_session(&id, "launch", GOAL, &CancellationToken::new(), None)
        .await
        .unwrap();

    let state = store.load(&id).await.unwrap().unwrap();
    assert!(state.needs_user_input);
    assert!(!state.goal_met);
    assert_eq!(state.evaluations, 2);
    assert_eq!(llm.worker_calls(), 2);
}

#[tokio::test]
async fn test_worker_step_limit_stops_endless_tool_calls() {
    let llm = Arc::new(
        ScriptedLlmClient::new()
            .with_completion(tool_call("c1", "search", r#"{"query":"a"}"#))
            .with_completion(tool_call("c2", "search", r#"{"query":"b"}"#))
            .with_completion(tool_call("c3", "search", r#"{"query":"c"}"#)),
    );
    let limits = LoopLimits {
        max_evaluations: 5,
        max_worker_steps: 2,
    };
    let sidekick = sidekick(&llm, limits);

    let (out, stats) = sidekick
        .run_with_stats("launch", GOAL, &[], &CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(llm.worker_calls(), 2);
    assert_eq!(llm.evaluator_calls(), 0);
    assert!(stats.forced_stop);
    assert_eq!(stats.tool_dispatches, 1);
    assert!(out.last().unwrap().content.starts_with("Evaluator Feedback: Stopped early"));
}

/// 每个 Assistant tool_call 之后都有同 id 的 Tool 结果
fn assert_tool_calls_answered(messages: &[Message]) {
    for (i, m) in messages.iter().enumerate() {
        for call in m.pending_tool_calls() {
            let answered = messages[i + 1..]
                .iter()
                .any(|r| matches!(r, Message::Tool { call_id, .. } if call_id == &call.id));
            assert!(answered, "tool call {} has no result", call.id);
        }
    }
}

#[tokio::test]
async fn test_step_limit_leaves_no_unanswered_calls_in_session() {
    let llm = Arc::new(
        ScriptedLlmClient::new()
            .with_completion(tool_call("c1", "search", r#"{"query":"a"}"#))
            .with_completion(Message::assistant(REPORT))
            .with_verdict(verdict("ok", true, false)),
    );
    let limits = LoopLimits {
        max_evaluations: 5,
        max_worker_steps: 1,
    };
    let store = Arc::new(InMemorySessionStore::new());
    let sidekick = sidekick(&llm, limits).with_store(store.clone());
    let id = SessionId::from("capped");
    let cancel = CancellationToken::new();

    let first = sidekick.run_session(&id, "launch", GOAL, &cancel, None).await.unwrap();
    assert!(first.last().unwrap().content.starts_with("Evaluator Feedback: Stopped early"));
    let saved = store.load(&id).await.unwrap().unwrap();
    assert!(saved
        .messages
        .contains(&Message::tool("c1", "Error: skipped, worker step limit reached")));

    sidekick.run_session(&id, "continue", GOAL, &cancel, None).await.unwrap();
    assert_tool_calls_answered(&llm.calls()[1].messages);
}

#[tokio::test]
async fn test_feedback_does_not_leak_into_next_session_run() {
    let llm = Arc::new(
        ScriptedLlmClient::new()
            .with_completion(Message::assistant("first report"))
            .with_completion(Message::assistant("second report"))
            .with_verdict(verdict("ok", true, false))
            .with_verdict(verdict("ok", true, false)),
    );
    let store = Arc::new(InMemorySessionStore::new());
    let sidekick = sidekick(&llm, LoopLimits::default()).with_store(store.clone());
    let id = SessionId::from("fresh-feedback");
    let cancel = CancellationToken::new();

    sidekick.run_session(&id, "one", GOAL, &cancel, None).await.unwrap();
    sidekick.run_session(&id, "two", GOAL, &cancel, None).await.unwrap();

    assert!(!llm.worker_directive(0).unwrap().contains("Feedback to address"));
    assert!(!llm.worker_directive(1).unwrap().contains("Feedback to address"));
}

#[tokio::test]
async fn test_prior_history_is_preserved_and_seen_by_worker() {
    let llm = Arc::new(
        ScriptedLlmClient::new()
            .with_completion(Message::assistant(REPORT))
            .with_verdict(verdict("ok", true, false)),
    );
    let sidekick = sidekick(&llm, LoopLimits::default());
    let history = vec![
        ChatTurn::user("Earlier question"),
        ChatTurn::assistant("Earlier answer"),
    ];

    let out = sidekick.run("Follow-up", GOAL, &history).await.unwrap();

    assert_eq!(&out[..2], &history[..]);
    assert_eq!(out[2], ChatTurn::user("Follow-up"));
    let seen = &llm.calls()[0].messages;
    assert_eq!(seen[1], Message::user("Earlier question"));
    assert_eq!(seen[2], Message::assistant("Earlier answer"));
}

#[tokio::test]
async fn test_session_store_carries_history_between_runs() {
    let llm = Arc::new(
        ScriptedLlmClient::new()
            .with_completion(Message::assistant("first report"))
            .with_completion(Message::assistant("second report"))
            .with_verdict(verdict("ok", true, false))
            .with_verdict(verdict("ok", true, false)),
    );
    let store = Arc::new(InMemorySessionStore::new());
    let sidekick = sidekick(&llm, LoopLimits::default()).with_store(store.clone());
    let id = SessionId::from("s1");
    let cancel = CancellationToken::new();

    let first = sidekick.run_session(&id, "one", GOAL, &cancel, None).await.unwrap();
    let second = sidekick.run_session(&id, "two", GOAL, &cancel, None).await.unwrap();

    assert_eq!(first[0], ChatTurn::user("one"));
    assert_eq!(second[0], ChatTurn::user("two"));
    assert_eq!(second[1], ChatTurn::assistant("second report"));
    let seen = &llm.calls()[2].messages;
    assert!(seen.contains(&Message::assistant("first report")));
    assert_eq!(seen.iter().filter(|m| m.is_system()).count(), 1);
}

#[tokio::test]
async fn test_cancellation_keeps_last_complete_message() {
    let llm = Arc::new(
        ScriptedLlmClient::new()
            .with_completion(tool_call("c1", "slow", "{}"))
            .with_completion(Message::assistant(REPORT))
            .with_verdict(verdict("ok", true, false)),
    );
    let store = Arc::new(InMemorySessionStore::new());
    let sidekick = sidekick(&llm, LoopLimits::default()).with_store(store.clone());
    let id = SessionId::from("cancelled");
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = sidekick
        .run_session(&id, "launch", GOAL, &cancel, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Cancelled));

    let state = store.load(&id).await.unwrap().unwrap();
    assert!(state.last_message().unwrap().has_tool_calls());
    assert!(!state.goal_met && !state.needs_user_input);

    // 下一次 run 先补上被取消的工具结果，再追加新的用户消息
    let resumed = sidekick
        .run_session(&id, "retry", GOAL, &CancellationToken::new(), None)
        .await
        .unwrap();
    assert_eq!(resumed[1], ChatTurn::assistant(REPORT));
    let seen = &llm.calls()[1].messages;
    assert!(seen.contains(&Message::tool("c1", "Error: cancelled before the tool returned")));
    assert_tool_calls_answered(seen);
}

#[tokio::test]
async fn test_worker_failure_aborts_run() {
    let llm = Arc::new(ScriptedLlmClient::new().with_completion_error("503 upstream"));
    let sidekick = sidekick(&llm, LoopLimits::default());
    let err = sidekick.run("launch", GOAL, &[]).await.unwrap_err();
    assert!(matches!(err, AgentError::Llm(_)));
}

#[tokio::test]
async fn test_malformed_verdict_aborts_run() {
    let llm = Arc::new(
        ScriptedLlmClient::new()
            .with_completion(Message::assistant(REPORT))
            .with_verdict(json!({ "feedback": "ok", "goal_met": true })),
    );
    let sidekick = sidekick(&llm, LoopLimits::default());
    let err = sidekick.run("launch", GOAL, &[]).await.unwrap_err();
    assert!(matches!(err, AgentError::EvaluatorContract(_)));
}

struct CountingResource(Arc<AtomicUsize>);

impl SessionResource for CountingResource {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn close(&self) -> anyhow::Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_cleanup_twice_outside_runtime() {
    let llm = Arc::new(ScriptedLlmClient::new());
    let sidekick = sidekick(&llm, LoopLimits::default());
    let closed = Arc::new(AtomicUsize::new(0));
    sidekick.teardown().register(Arc::new(CountingResource(closed.clone())));

    sidekick.cleanup();
    sidekick.cleanup();

    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cleanup_inside_runtime() {
    let llm = Arc::new(ScriptedLlmClient::new());
    let sidekick = sidekick(&llm, LoopLimits::default());
    let closed = Arc::new(AtomicUsize::new(0));
    sidekick.teardown().register(Arc::new(CountingResource(closed.clone())));

    sidekick.cleanup();
    drop(sidekick);

    assert_eq!(closed.load(Ordering::SeqCst), 1);
}
