//! 记忆层：会话消息与会话持久化

pub mod conversation;
pub mod store;

pub use conversation::{ChatTurn, Message, Role, ToolCallRequest};
pub use store::{InMemorySessionStore, JsonFileSessionStore, SessionStore};
