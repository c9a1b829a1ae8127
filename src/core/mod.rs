//! 核心层：错误类型、会话状态、关闭与资源释放

pub mod error;
pub mod shutdown;
pub mod state;

pub use error::AgentError;
pub use shutdown::{SessionResource, ShutdownManager, ShutdownReason, Teardown};
pub use state::{SessionId, SessionState, CANCELLED_TOOL_RESULT, DEFAULT_GOAL_DESCRIPTION};
