//! browser 工具：Headless Chrome 渲染动态页面后提取可读文本
//!
//! 需启用 feature "browser" 且系统已安装 Chrome/Chromium。Chrome 进程由 BrowserHandle 懒启动，
//! 属于会话资源：注册到 Teardown，cleanup() 时关闭。

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions};
use serde_json::{json, Value};

use crate::core::SessionResource;
use crate::tools::fetch::{html_to_text, truncate_chars};
use crate::tools::Tool;

/// 会话持有的浏览器进程
pub struct BrowserHandle {
    headless: bool,
    browser: Mutex<Option<Browser>>,
}

impl BrowserHandle {
    pub fn new(headless: bool) -> Self {
        Self {
            headless,
            browser: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.browser.lock().map(|b| b.is_some()).unwrap_or(false)
    }

    /// 取得（必要时启动）浏览器
    fn acquire(&self) -> Result<Browser, String> {
        let mut guard = self.browser.lock().map_err(|e| e.to_string())?;
        if let Some(b) = guard.as_ref() {
            return Ok(b.clone());
        }
        let options = LaunchOptions::default_builder()
            .headless(self.headless)
            .build()
            .map_err(|e| format!("Browser options: {}", e))?;
        let browser = Browser::new(options)
            .map_err(|e| format!("Chrome launch failed: {}. Install Chrome/Chromium.", e))?;
        tracing::info!(headless = self.headless, "browser launched");
        *guard = Some(browser.clone());
        Ok(browser)
    }
}

impl SessionResource for BrowserHandle {
    fn name(&self) -> &'static str {
        "browser"
    }

    fn close(&self) -> anyhow::Result<()> {
        let taken = self
            .browser
            .lock()
            .map_err(|e| anyhow::anyhow!("browser lock poisoned: {}", e))?
            .take();
        // Drop 时 headless_chrome 结束 Chrome 进程
        if taken.is_some() {
            tracing::info!("browser closed");
        }
        Ok(())
    }
}

pub struct BrowserTool {
    handle: Arc<BrowserHandle>,
    max_result_chars: usize,
}

impl BrowserTool {
    pub fn new(handle: Arc<BrowserHandle>, max_result_chars: usize) -> Self {
        Self {
            handle,
            max_result_chars,
        }
    }
}

#[async_trait]
impl Tool for BrowserTool {
    fn name(&self) -> &str {
        "browser"
    }

    fn description(&self) -> &str {
        "Open a URL in a real browser (JavaScript rendered) and return the page text. Optional CSS selector narrows the text."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "Absolute http(s) URL" },
                "selector": { "type": "string", "description": "Optional CSS selector" }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let url = args.get("url").and_then(|v| v.as_str()).unwrap_or("").trim().to_string();
        if url.is_empty() {
            return Err("Missing url".to_string());
        }
        let selector = args.get("selector").and_then(|v| v.as_str()).map(|s| s.to_string());
        let handle = Arc::clone(&self.handle);
        let max_chars = self.max_result_chars;

        tracing::info!(url = %url, selector = ?selector, "browser navigate");

        tokio::task::spawn_blocking(move || {
            let browser = handle.acquire()?;
            let tab = browser.new_tab().map_err(|e| format!("Browser tab failed: {}", e))?;
            let text = then_close(
                || {
                    tab.navigate_to(&url).map_err(|e| format!("Navigate failed: {}", e))?;
                    tab.wait_for_element("body").map_err(|e| format!("Page load failed: {}", e))?;
                    match selector {
                        Some(sel) => tab
                            .wait_for_element(&sel)
                            .map_err(|e| format!("Element not found: {}", e))?
                            .get_inner_text()
                            .map_err(|e| format!("Get text failed: {}", e)),
                        None => {
                            let content = tab.get_content().map_err(|e| format!("Get content failed: {}", e))?;
                            Ok(html_to_text(&content))
                        }
                    }
                },
                || tab.close(true).map(|_| ()),
            )?;
            Ok(truncate_chars(text, max_chars))
        })
        .await
        .map_err(|e| format!("Task join: {}", e))?
    }
}

/// 执行 work 后无论成败都执行 close；close 失败只记录日志，返回 work 的结果
fn then_close<T, E: std::fmt::Display>(
    work: impl FnOnce() -> Result<T, String>,
    close: impl FnOnce() -> Result<(), E>,
) -> Result<T, String> {
    let result = work();
    if let Err(e) = close() {
        tracing::warn!(error = %e, "browser tab close failed");
    }
    result
}
