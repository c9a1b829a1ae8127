//! 对话消息模型
//!
//! Message 为带标签的联合体（System / User / Assistant / Tool），Assistant 可携带待执行的工具调用；
//! ChatTurn 是面向调用方的 {role, content} 简化形式，run 入口的输入与输出均使用它。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// 模型请求的一次工具调用：名称 + JSON 参数（原始字符串）+ call id
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// 单条消息；会话内只追加、顺序有意义
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRequest>,
    },
    Tool {
        call_id: String,
        content: String,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    /// 携带工具调用的 Assistant 消息（content 可为空）
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_calls,
        }
    }

    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Message::Tool {
            call_id: call_id.into(),
            content: content.into(),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Message::System { .. } => Role::System,
            Message::User { .. } => Role::User,
            Message::Assistant { .. } => Role::Assistant,
            Message::Tool { .. } => Role::Tool,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Message::System { content }
            | Message::User { content }
            | Message::Assistant { content, .. }
            | Message::Tool { content, .. } => content,
        }
    }

    /// Assistant 消息上尚未执行的工具调用；其它角色恒为空
    pub fn pending_tool_calls(&self) -> &[ToolCallRequest] {
        match self {
            Message::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.pending_tool_calls().is_empty()
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Message::System { .. })
    }
}

/// 调用方可见的对话轮次（UI / CLI 使用的 {role, content}）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User.as_str().to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant.as_str().to_string(),
            content: content.into(),
        }
    }

    /// 转为内部消息："user" -> User，"system" -> System，其余一律视为 Assistant
    pub fn to_message(&self) -> Message {
        match self.role.as_str() {
            "user" => Message::user(self.content.clone()),
            "system" => Message::system(self.content.clone()),
            _ => Message::assistant(self.content.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_tool_calls_only_on_assistant() {
        let call = ToolCallRequest::new("call_1", "search", r#"{"query":"gpt-5"}"#);
        let msg = Message::assistant_with_tools("", vec![call.clone()]);
        assert!(msg.has_tool_calls());
        assert_eq!(msg.pending_tool_calls(), &[call]);
        assert!(!Message::user("hi").has_tool_calls());
        assert!(!Message::tool("call_1", "result").has_tool_calls());
    }

    #[test]
    fn test_chat_turn_role_mapping() {
        assert_eq!(ChatTurn::user("a").to_message().role(), Role::User);
        assert_eq!(ChatTurn::assistant("b").to_message().role(), Role::Assistant);
        let sys = ChatTurn {
            role: "system".to_string(),
            content: "c".to_string(),
        };
        assert!(sys.to_message().is_system());
        let other = ChatTurn {
            role: "bot".to_string(),
            content: "d".to_string(),
        };
        assert_eq!(other.to_message().role(), Role::Assistant);
    }

    #[test]
    fn test_message_serde_tagged() {
        let msg = Message::tool("call_9", "ok");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["call_id"], "call_9");
        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }
}
