//! wikipedia 工具：MediaWiki 搜索 + 条目摘要
//!
//! 先 list=search 取前几个标题，再 prop=extracts 一次取回纯文本导言，输出 "Page: / Summary:" 段落。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::fetch::{truncate_chars, USER_AGENT};
use crate::tools::Tool;

pub const WIKIPEDIA_API: &str = "https://en.wikipedia.org/w/api.php";

const TOP_K_RESULTS: usize = 3;
const MAX_CONTENT_CHARS: usize = 4000;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    query: Option<SearchQuery>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    query: Option<ExtractQuery>,
}

#[derive(Debug, Deserialize)]
struct ExtractQuery {
    #[serde(default)]
    pages: Vec<ExtractPage>,
}

#[derive(Debug, Deserialize)]
struct ExtractPage {
    title: String,
    #[serde(default)]
    extract: Option<String>,
}

/// 按搜索顺序输出摘要
fn format_pages(order: &[String], pages: &[ExtractPage]) -> String {
    let parts: Vec<String> = order
        .iter()
        .filter_map(|title| pages.iter().find(|p| &p.title == title))
        .filter_map(|p| {
            p.extract
                .as_deref()
                .filter(|e| !e.trim().is_empty())
                .map(|e| format!("Page: {}\nSummary: {}", p.title, e.trim()))
        })
        .collect();
    if parts.is_empty() {
        "No good Wikipedia Search Result was found".to_string()
    } else {
        parts.join("\n\n")
    }
}

pub struct WikipediaTool {
    client: Client,
    endpoint: String,
}

impl WikipediaTool {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_default(),
            endpoint: WIKIPEDIA_API.to_string(),
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, params: &[(&str, &str)]) -> Result<T, String> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(params)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        resp.json().await.map_err(|e| format!("Decode failed: {}", e))
    }
}

#[async_trait]
impl Tool for WikipediaTool {
    fn name(&self) -> &str {
        "wikipedia"
    }

    fn description(&self) -> &str {
        "Query Wikipedia for background information."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Topic to look up" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let query = args.get("query").and_then(|v| v.as_str()).unwrap_or("").trim();
        if query.is_empty() {
            return Err("Missing query".to_string());
        }
        tracing::info!(query = %query, "wikipedia search");

        let limit = TOP_K_RESULTS.to_string();
        let search: SearchResponse = self
            .get_json(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", &limit),
                ("format", "json"),
                ("formatversion", "2"),
            ])
            .await?;
        let titles: Vec<String> = search
            .query
            .map(|q| q.search.into_iter().map(|h| h.title).collect())
            .unwrap_or_default();
        if titles.is_empty() {
            return Ok("No good Wikipedia Search Result was found".to_string());
        }

        let joined = titles.join("|");
        let extracts: ExtractResponse = self
            .get_json(&[
                ("action", "query"),
                ("prop", "extracts"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("titles", &joined),
                ("format", "json"),
                ("formatversion", "2"),
            ])
            .await?;
        let pages = extracts.query.map(|q| q.pages).unwrap_or_default();
        Ok(truncate_chars(format_pages(&titles, &pages), MAX_CONTENT_CHARS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_pages_keeps_search_order() {
        let pages: ExtractQuery = serde_json::from_value(json!({
            "pages": [
                { "title": "B", "extract": "Second" },
                { "title": "A", "extract": "First" },
                { "title": "C", "extract": "" }
            ]
        }))
        .unwrap();
        let order = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        assert_eq!(
            format_pages(&order, &pages.pages),
            "Page: A\nSummary: First\n\nPage: B\nSummary: Second"
        );
        assert_eq!(format_pages(&order, &[]), "No good Wikipedia Search Result was found");
    }
}
