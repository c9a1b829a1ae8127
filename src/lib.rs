//! Product Intel - 市场情报分析 Sidekick
//!
//! 模块划分：
//! - **agent**: Sidekick 运行时（setup / run / cleanup）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 会话状态、错误类型、关闭与资源释放
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 消息模型与会话持久化
//! - **sidekick**: 角色选择、Worker、工具分发、Evaluator、循环控制
//! - **tools**: 工具箱（搜索、维基、网页、沙箱文件、推送、Python、浏览器）与执行器

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod sidekick;
pub mod tools;

pub use agent::Sidekick;
