//! Sidekick：市场情报分析循环
//!
//! - **mode**: 按成功标准选择分析角色模板
//! - **worker**: 拼 system 指令并调用绑定工具的模型
//! - **dispatch**: 执行待处理的工具调用
//! - **evaluator**: 结构化评估，决定结束还是重试
//! - **loop_**: 状态机与迭代上限、取消

pub mod dispatch;
pub mod evaluator;
pub mod events;
pub mod loop_;
pub mod mode;
pub mod worker;

pub use dispatch::dispatch_pending;
pub use evaluator::{render_transcript, Evaluator, EvaluatorVerdict, FEEDBACK_PREFIX};
pub use events::SidekickEvent;
pub use loop_::{
    route_after_evaluator, route_after_tools, route_after_worker, LoopLimits, LoopState, RunStats, SidekickLoop,
    SKIPPED_TOOL_RESULT,
};
pub use mode::{select_template, AnalystMode, RoleTemplate};
pub use worker::{compose_system_directive, install_system_directive, Worker};
