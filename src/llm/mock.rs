//! Mock / Scripted LLM 客户端（无需 API）
//!
//! - MockLlmClient：未配置 API Key 时的离线后端，返回固定报告并判定通过，便于本地跑通循环
//! - ScriptedLlmClient：按队列依次返回预设的 Worker 回复与 Evaluator 结论，并记录每次请求，供测试断言

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::llm::{LlmClient, LlmError, OutputSchema, ToolSpec};
use crate::memory::Message;

/// 离线客户端：Worker 输出带 Sources 的占位报告，Evaluator 总是判定达标
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message], _tools: &[ToolSpec]) -> Result<Message, LlmError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m, Message::User { .. }))
            .map(Message::content)
            .unwrap_or("(no input)");

        Ok(Message::assistant(format!(
            "# Mock Analysis\n\nOffline report for: {}\n\n## Sources\n- (mock backend, no sources consulted)",
            last_user
        )))
    }

    async fn complete_structured(
        &self,
        _messages: &[Message],
        _schema: &OutputSchema,
    ) -> Result<Value, LlmError> {
        Ok(json!({
            "feedback": "Mock evaluator: accepted without review.",
            "goal_met": true,
            "needs_user_input": false,
        }))
    }
}

/// 单次请求记录
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
    pub structured: bool,
}

/// 预设脚本客户端：complete 与 complete_structured 各自维护一个队列；队列耗尽返回 EmptyResponse
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    completions: Mutex<VecDeque<Result<Message, String>>>,
    verdicts: Mutex<VecDeque<Value>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条 Worker 回复
    pub fn with_completion(self, message: Message) -> Self {
        if let Ok(mut q) = self.completions.lock() {
            q.push_back(Ok(message));
        }
        self
    }

    /// 追加一次 Worker 调用失败（模拟网络 / 服务端错误）
    pub fn with_completion_error(self, error: impl Into<String>) -> Self {
        if let Ok(mut q) = self.completions.lock() {
            q.push_back(Err(error.into()));
        }
        self
    }

    /// 追加一条 Evaluator 原始输出（可以是不合约定的 JSON，用于测试校验）
    pub fn with_verdict(self, verdict: Value) -> Self {
        if let Ok(mut q) = self.verdicts.lock() {
            q.push_back(verdict);
        }
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn worker_calls(&self) -> usize {
        self.calls().iter().filter(|c| !c.structured).count()
    }

    pub fn evaluator_calls(&self) -> usize {
        self.calls().iter().filter(|c| c.structured).count()
    }

    /// 第 n 次 Worker 调用时的 system 指令
    pub fn worker_directive(&self, n: usize) -> Option<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.structured)
            .nth(n)
            .and_then(|c| c.messages.into_iter().find(Message::is_system))
            .map(|m| m.content().to_string())
    }

    fn record(&self, messages: &[Message], tool_names: Vec<String>, structured: bool) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                messages: messages.to_vec(),
                tool_names,
                structured,
            });
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Message, LlmError> {
        self.record(messages, tools.iter().map(|t| t.name.clone()).collect(), false);
        let next = self.completions.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(Ok(message)) => Ok(message),
            Some(Err(e)) => Err(LlmError::Request(e)),
            None => Err(LlmError::EmptyResponse),
        }
    }

    async fn complete_structured(
        &self,
        messages: &[Message],
        _schema: &OutputSchema,
    ) -> Result<Value, LlmError> {
        self.record(messages, Vec::new(), true);
        self.verdicts
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .ok_or(LlmError::EmptyResponse)
    }
}
