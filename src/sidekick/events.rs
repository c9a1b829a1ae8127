//! 循环过程事件：用于 CLI / 前端展示 Worker、工具调用、评估结论

use serde::Serialize;

use crate::sidekick::LoopState;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SidekickEvent {
    /// 状态机进入新状态
    StepUpdate { state: LoopState, worker_steps: usize, evaluations: usize },
    /// 正在调用 Worker 模型
    Thinking,
    /// 模型请求调用工具
    ToolCall { tool: String, args: String },
    /// 工具返回（预览，避免过长）
    Observation { tool: String, preview: String },
    /// 工具执行失败（已作为 Tool 结果回写）
    ToolFailure { tool: String, reason: String },
    /// Evaluator 结论
    Verdict {
        feedback: String,
        goal_met: bool,
        needs_user_input: bool,
    },
    /// 触发迭代上限，强制结束并请求用户输入
    LimitReached { detail: String },
    /// 本次 run 的 token 增量
    TokenUsage {
        prompt_tokens: u64,
        completion_tokens: u64,
        total_tokens: u64,
    },
    Error { text: String },
}
