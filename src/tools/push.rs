//! send_push_notification 工具：Pushover 推送（尽力而为）
//!
//! 缺少 PUSHOVER_TOKEN / PUSHOVER_USER 时不报错，返回 "pushover not configured"；请求失败同样以文本返回。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::tools::Tool;

pub const PUSHOVER_URL: &str = "https://api.pushover.net/1/messages.json";

#[derive(Debug, Clone, Default)]
pub struct PushoverCredentials {
    pub token: String,
    pub user: String,
}

impl PushoverCredentials {
    pub fn from_env() -> Option<Self> {
        let token = std::env::var("PUSHOVER_TOKEN").unwrap_or_default();
        let user = std::env::var("PUSHOVER_USER").unwrap_or_default();
        if token.trim().is_empty() || user.trim().is_empty() {
            None
        } else {
            Some(Self { token, user })
        }
    }
}

pub struct PushNotificationTool {
    client: Client,
    credentials: Option<PushoverCredentials>,
}

impl PushNotificationTool {
    pub fn new(credentials: Option<PushoverCredentials>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            credentials,
        }
    }

    pub fn from_env() -> Self {
        Self::new(PushoverCredentials::from_env())
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }
}

#[async_trait]
impl Tool for PushNotificationTool {
    fn name(&self) -> &str {
        "send_push_notification"
    }

    fn description(&self) -> &str {
        "Send a push notification to the user (Pushover)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "Notification text" }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let Some(creds) = &self.credentials else {
            return Ok("pushover not configured".to_string());
        };
        let text = args.get("text").and_then(|v| v.as_str()).unwrap_or("").trim();
        if text.is_empty() {
            return Err("Missing text".to_string());
        }
        tracing::info!(chars = text.len(), "pushover send");
        let form = [
            ("token", creds.token.as_str()),
            ("user", creds.user.as_str()),
            ("message", text),
        ];
        match self.client.post(PUSHOVER_URL).form(&form).send().await {
            Ok(resp) if resp.status().is_success() => Ok("success".to_string()),
            Ok(resp) => Ok(format!("pushover error: HTTP {}", resp.status())),
            Err(e) => Ok(format!("pushover error: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_push_is_not_an_error() {
        let tool = PushNotificationTool::new(None);
        assert!(!tool.is_configured());
        let out = tool.execute(json!({"text": "report ready"})).await.unwrap();
        assert_eq!(out, "pushover not configured");
    }
}
