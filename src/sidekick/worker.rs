//! Worker：按角色模板拼 system 指令并调用绑定了工具的模型
//!
//! system 指令每轮重新生成（模板 + 当前时间与通用规则 + 上一轮评估反馈），
//! 并保证消息序列头部恰好一条 System 消息（已存在则原地替换，不存在则插入到最前）。

use std::sync::Arc;

use chrono::{DateTime, Local};

use crate::core::{AgentError, SessionState};
use crate::llm::{LlmClient, ToolSpec};
use crate::memory::Message;
use crate::sidekick::select_template;

/// 拼接 system 指令；now 由调用方传入便于测试
pub fn compose_system_directive(
    goal_description: &str,
    last_feedback: Option<&str>,
    now: DateTime<Local>,
) -> String {
    let template = select_template(goal_description);
    let mut base = format!(
        "Current date/time: {}\n\n\
         General rules:\n\
         - Use tools whenever they improve freshness or accuracy, or can provide URLs.\n\
         - When you run Python, print() the values you want to see.\n\
         - Prefer concise, well-structured Markdown.\n\
         - ALWAYS end with a '## Sources' section listing the raw URLs you consulted.\n",
        now.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(feedback) = last_feedback {
        base.push_str(&format!(
            "\nImportant: your previous attempt did not meet the success criteria.\n\
             Feedback to address:\n{}\n",
            feedback
        ));
    }
    format!("{}\n\n{}", template.text, base)
}

/// 保证恰好一条 System 消息位于头部，内容为 directive
pub fn install_system_directive(messages: &mut Vec<Message>, directive: String) {
    messages.retain(|m| !m.is_system());
    messages.insert(0, Message::system(directive));
}

/// Worker 步骤：持有（已绑定工具的）模型
pub struct Worker {
    llm: Arc<dyn LlmClient>,
}

impl Worker {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 执行一轮 Worker：刷新 system 指令、调用模型、追加回复（回复之外只可能新增头部 System 消息）
    pub async fn step(&self, state: &mut SessionState, tools: &[ToolSpec]) -> Result<(), AgentError> {
        let directive = compose_system_directive(
            &state.goal_description,
            state.last_feedback.as_deref(),
            Local::now(),
        );
        tracing::debug!(chars = directive.len(), "worker directive composed");
        install_system_directive(&mut state.messages, directive);

        let response = self.llm.complete(&state.messages, tools).await?;
        let response = match response {
            assistant @ Message::Assistant { .. } => assistant,
            other => Message::assistant(other.content()),
        };
        tracing::info!(
            tool_calls = response.pending_tool_calls().len(),
            chars = response.content().len(),
            "worker responded"
        );

        state.push(response);
        state.worker_steps += 1;
        state.clear_verdict_flags();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::memory::ToolCallRequest;

    #[test]
    fn test_directive_includes_template_rules_and_feedback() {
        let d = compose_system_directive("KPI check", Some("Add revenue numbers"), Local::now());
        assert!(d.contains("Launch Performance Snapshot"));
        assert!(d.contains("Current date/time:"));
        assert!(d.contains("## Sources"));
        assert!(d.contains("Feedback to address:\nAdd revenue numbers"));

        let plain = compose_system_directive("KPI check", None, Local::now());
        assert!(!plain.contains("Feedback to address"));
    }

    #[test]
    fn test_install_directive_keeps_exactly_one_system() {
        let mut none = vec![Message::user("a")];
        install_system_directive(&mut none, "d1".into());
        assert_eq!(none[0], Message::system("d1"));
        assert_eq!(none.iter().filter(|m| m.is_system()).count(), 1);

        let mut one = vec![Message::system("old"), Message::user("a")];
        install_system_directive(&mut one, "d2".into());
        assert_eq!(one.len(), 2);
        assert_eq!(one[0], Message::system("d2"));

        let mut two = vec![Message::user("a"), Message::system("x"), Message::system("y")];
        install_system_directive(&mut two, "d3".into());
        assert_eq!(two.iter().filter(|m| m.is_system()).count(), 1);
        assert_eq!(two[1], Message::user("a"));
    }

    #[tokio::test]
    async fn test_step_appends_response_and_resets_flags() {
        let call = ToolCallRequest::new("c1", "search", "{}");
        let llm = Arc::new(ScriptedLlmClient::new().with_completion(Message::assistant_with_tools("", vec![call])));
        let worker = Worker::new(llm.clone());
        let mut state = SessionState::new("competitor analysis");
        state.begin_run("OpenAI GPT-5 launch", "competitor analysis");
        state.goal_met = true;

        worker.step(&mut state, &[]).await.unwrap();

        assert_eq!(state.system_count(), 1);
        assert_eq!(state.messages.len(), 3);
        assert!(state.last_message().unwrap().has_tool_calls());
        assert!(!state.goal_met);
        assert_eq!(state.worker_steps, 1);
        assert_eq!(llm.worker_calls(), 1);
    }

    #[tokio::test]
    async fn test_step_propagates_model_failure() {
        let llm = Arc::new(ScriptedLlmClient::new().with_completion_error("503 upstream"));
        let worker = Worker::new(llm);
        let mut state = SessionState::new("x");
        state.begin_run("hi", "x");
        let err = worker.step(&mut state, &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::Llm(_)));
        assert!(!state.last_message().unwrap().has_tool_calls());
    }
}
