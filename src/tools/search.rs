//! search 工具：通过 Serper（Google SERP API）做网页搜索
//!
//! 仅在配置了 SERPER_API_KEY 时注册；结果整理为「标题 / 链接 / 摘要」列表，便于模型引用 URL。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::Tool;

pub const SERPER_URL: &str = "https://google.serper.dev/search";

#[derive(Debug, Deserialize, Default)]
struct SerperResponse {
    #[serde(rename = "answerBox", default)]
    answer_box: Option<SerperAnswerBox>,
    #[serde(default)]
    organic: Vec<SerperOrganic>,
}

#[derive(Debug, Deserialize)]
struct SerperAnswerBox {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SerperOrganic {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

/// 把 Serper 返回整理成文本
fn format_results(resp: &SerperResponse, max_results: usize) -> String {
    let mut out = Vec::new();
    if let Some(ab) = &resp.answer_box {
        if let Some(a) = ab.answer.as_ref().or(ab.snippet.as_ref()) {
            out.push(format!("Answer: {}", a));
        }
    }
    for (i, r) in resp.organic.iter().take(max_results).enumerate() {
        out.push(format!("{}. {}\n   {}\n   {}", i + 1, r.title, r.link, r.snippet));
    }
    if out.is_empty() {
        "No good search result was found".to_string()
    } else {
        out.join("\n")
    }
}

pub struct SerperSearchTool {
    client: Client,
    api_key: String,
    endpoint: String,
    max_results: usize,
}

impl SerperSearchTool {
    pub fn new(api_key: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            endpoint: SERPER_URL.to_string(),
            max_results: 8,
        }
    }

    /// 从环境变量 SERPER_API_KEY 创建；未配置返回 None
    pub fn from_env(timeout_secs: u64) -> Option<Self> {
        std::env::var("SERPER_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(|k| Self::new(k, timeout_secs))
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl Tool for SerperSearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search the web via Serper. Ideal for fresh info and links."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let query = args.get("query").and_then(|v| v.as_str()).unwrap_or("").trim();
        if query.is_empty() {
            return Err("Missing query".to_string());
        }
        tracing::info!(query = %query, "serper search");
        let resp = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&json!({ "q": query }))
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let parsed: SerperResponse = resp.json().await.map_err(|e| format!("Decode failed: {}", e))?;
        Ok(format_results(&parsed, self.max_results))
    }
}
