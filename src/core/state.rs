//! 会话状态：每轮循环贯穿传递的可变记录
//!
//! messages 只追加；goal_met / needs_user_input 只由 Evaluator 设置，Worker / Tools 步骤后复位为 false。
//! evaluations / worker_steps 为迭代上限计数（防止评估器永不完成时无限循环）。

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::memory::{ChatTurn, Message};

/// 目标描述为空时使用的默认成功标准
pub const DEFAULT_GOAL_DESCRIPTION: &str = "Provide a clear, accurate analysis.";

/// 补给上一次 run 未返回的工具调用的结果
pub const CANCELLED_TOOL_RESULT: &str = "Error: cancelled before the tool returned";

/// 显式会话句柄：替代隐式的全局 thread id，传给 SessionStore 的 load / save
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 会话状态
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub messages: Vec<Message>,
    pub goal_description: String,
    pub last_feedback: Option<String>,
    pub goal_met: bool,
    pub needs_user_input: bool,
    /// 本次 run 已执行的 Evaluator 次数
    #[serde(default)]
    pub evaluations: usize,
    /// 本次 run 已执行的 Worker 次数
    #[serde(default)]
    pub worker_steps: usize,
}

impl SessionState {
    /// 新建会话；空目标描述替换为默认成功标准
    pub fn new(goal_description: &str) -> Self {
        let goal = goal_description.trim();
        Self {
            goal_description: if goal.is_empty() {
                DEFAULT_GOAL_DESCRIPTION.to_string()
            } else {
                goal.to_string()
            },
            ..Self::default()
        }
    }

    /// 以外部提供的历史播种会话
    pub fn seeded(goal_description: &str, history: &[ChatTurn]) -> Self {
        let mut state = Self::new(goal_description);
        state.messages = history.iter().map(ChatTurn::to_message).collect();
        state
    }

    /// 开始一次新的 run：追加用户消息、复位标志、计数与上一次 run 的反馈；目标描述可在两次 run 之间改变
    ///
    /// 上一次 run 取消时遗留的未应答工具调用先补上错误结果，保证每个 tool_call 都有对应的 Tool 消息
    pub fn begin_run(&mut self, user_message: &str, goal_description: &str) {
        let fresh = Self::new(goal_description);
        self.goal_description = fresh.goal_description;
        self.last_feedback = None;
        self.goal_met = false;
        self.needs_user_input = false;
        self.evaluations = 0;
        self.worker_steps = 0;
        for id in self.unanswered_tool_calls() {
            self.messages.push(Message::tool(id, CANCELLED_TOOL_RESULT));
        }
        self.messages.push(Message::user(user_message));
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// 最后一条 Assistant 消息中尚无 Tool 结果的调用 id（按请求顺序）
    pub fn unanswered_tool_calls(&self) -> Vec<String> {
        let Some(pos) = self
            .messages
            .iter()
            .rposition(|m| matches!(m, Message::Assistant { .. }))
        else {
            return Vec::new();
        };
        let answered: Vec<&str> = self.messages[pos + 1..]
            .iter()
            .filter_map(|m| match m {
                Message::Tool { call_id, .. } => Some(call_id.as_str()),
                _ => None,
            })
            .collect();
        self.messages[pos]
            .pending_tool_calls()
            .iter()
            .filter(|c| !answered.contains(&c.id.as_str()))
            .map(|c| c.id.clone())
            .collect()
    }

    pub fn system_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_system()).count()
    }

    /// Worker / Tools 步骤后调用：终止标志只在 Evaluator 之后有意义
    pub fn clear_verdict_flags(&mut self) {
        self.goal_met = false;
        self.needs_user_input = false;
    }

    pub fn is_terminal(&self) -> bool {
        self.goal_met || self.needs_user_input
    }
}
