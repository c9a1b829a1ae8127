//! Agent 错误类型
//!
//! 工具失败不走这里的错误路径（作为 Tool 结果文本回写对话）；LLM 调用失败与评估结构违约会中止本次 run。

use thiserror::Error;

use crate::llm::LlmError;

/// Agent 运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// Worker / Evaluator 的模型调用失败，由调用方决定重试策略
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Evaluator 的结构化输出不满足 {feedback, goal_met, needs_user_input} 约定
    #[error("Evaluator output violated contract: {0}")]
    EvaluatorContract(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Path escape attempt: {0}")]
    PathEscape(String),

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Session store error: {0}")]
    Store(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}
