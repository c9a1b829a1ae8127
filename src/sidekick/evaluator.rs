//! Evaluator：第二次模型调用，按结构化约定判断成功标准是否达成、是否需要用户输入
//!
//! 约定恰好三个字段 {feedback, goal_met, needs_user_input}；缺字段、多字段或类型不符都视为本次 run 的致命错误，
//! 不猜测默认值。评估反馈以 "Evaluator Feedback: ..." 的 Assistant 消息追加到对话中。

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{AgentError, SessionState};
use crate::llm::{LlmClient, LlmError, OutputSchema};
use crate::memory::Message;

/// 评估反馈消息前缀
pub const FEEDBACK_PREFIX: &str = "Evaluator Feedback: ";

const EVALUATOR_SYSTEM: &str = "You evaluate whether the Assistant satisfied the user's success criteria.";

/// 结构化评估结论
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct EvaluatorVerdict {
    /// Feedback on the assistant's response
    pub feedback: String,
    /// Whether the success criteria have been met
    pub goal_met: bool,
    /// True if more input is needed from the user or the assistant is stuck
    pub needs_user_input: bool,
}

impl EvaluatorVerdict {
    /// 按约定校验模型输出
    pub fn from_value(value: Value) -> Result<Self, AgentError> {
        serde_json::from_value(value.clone())
            .map_err(|e| AgentError::EvaluatorContract(format!("{}: {}", e, value)))
    }
}

/// 评估用的精简对话：User / Assistant 各一行，仅含工具调用的轮次记为 [Tool call]
pub fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .filter_map(|m| match m {
            Message::User { content } => Some(format!("User: {}", content)),
            Message::Assistant { content, .. } if content.is_empty() => {
                Some("Assistant: [Tool call]".to_string())
            }
            Message::Assistant { content, .. } => Some(format!("Assistant: {}", content)),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 评估请求正文
pub fn grading_prompt(state: &SessionState, last_text: &str) -> String {
    format!(
        "Conversation:\n{}\n\n\
         Success criteria:\n{}\n\n\
         Assistant's last message:\n{}\n\n\
         Score whether the criteria are met, provide feedback, and decide if more input is needed from the user.\n",
        render_transcript(&state.messages),
        state.goal_description,
        last_text
    )
}

/// Evaluator 步骤：持有（结构化输出的）模型
pub struct Evaluator {
    llm: Arc<dyn LlmClient>,
    schema: OutputSchema,
}

impl Evaluator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            schema: OutputSchema::for_type::<EvaluatorVerdict>("evaluator_verdict"),
        }
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 执行一次评估：调用模型、校验结论、追加反馈消息并更新会话标志
    pub async fn step(&self, state: &mut SessionState) -> Result<EvaluatorVerdict, AgentError> {
        let last_text = match state.last_message() {
            Some(last @ Message::Assistant { .. }) if !last.has_tool_calls() => last.content().to_string(),
            _ => {
                return Err(AgentError::InvalidState(
                    "evaluator requires a final assistant response".to_string(),
                ))
            }
        };

        let request = vec![
            Message::system(EVALUATOR_SYSTEM),
            Message::user(grading_prompt(state, &last_text)),
        ];
        let raw = self
            .llm
            .complete_structured(&request, &self.schema)
            .await
            .map_err(|e| match e {
                LlmError::Decode(detail) => AgentError::EvaluatorContract(detail),
                other => AgentError::Llm(other),
            })?;
        let verdict = EvaluatorVerdict::from_value(raw)?;

        tracing::info!(
            goal_met = verdict.goal_met,
            needs_user_input = verdict.needs_user_input,
            "evaluator verdict"
        );

        state.push(Message::assistant(format!("{}{}", FEEDBACK_PREFIX, verdict.feedback)));
        state.last_feedback = Some(verdict.feedback.clone());
        state.goal_met = verdict.goal_met;
        state.needs_user_input = verdict.needs_user_input;
        state.evaluations += 1;
        Ok(verdict)
    }
}
