//! LLM 客户端抽象
//!
//! 核心循环只依赖两种能力：complete（可绑定工具，Worker 使用）与 complete_structured
//! （按 JSON Schema 约束输出，Evaluator 使用）。具体后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient。

use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde_json::Value;
use thiserror::Error;

use crate::memory::Message;

/// 后端调用错误
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),

    /// 端点返回的错误（鉴权、限流、参数非法等）
    #[error("API error: {0}")]
    Api(String),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("empty response")]
    EmptyResponse,
}

/// 绑定给模型的工具描述（名称、说明、参数 JSON Schema）
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 结构化输出约定：名称 + JSON Schema
#[derive(Debug, Clone)]
pub struct OutputSchema {
    pub name: String,
    pub schema: Value,
}

impl OutputSchema {
    /// 由 schemars 生成 Schema；去掉 $schema / title 等元字段，便于直接放入 response_format
    pub fn for_type<T: JsonSchema>(name: &str) -> Self {
        let mut schema = serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| Value::Object(Default::default()));
        if let Some(obj) = schema.as_object_mut() {
            obj.remove("$schema");
            obj.remove("title");
        }
        Self {
            name: name.to_string(),
            schema,
        }
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 对完整消息序列做一次补全；tools 非空时允许模型返回工具调用
    async fn complete(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Message, LlmError>;

    /// 结构化补全：返回符合 schema 的 JSON 值（校验由调用方完成）
    async fn complete_structured(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
    ) -> Result<Value, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
