//! python 工具：运行一段 Python 代码做快速计算
//!
//! 代码经 stdin 交给解释器（`python3 -`），工作目录为沙箱；带超时，超时后子进程被杀死。
//! 只有 print() 的内容会出现在结果中。

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::tools::Tool;

pub struct PythonTool {
    interpreter: String,
    workdir: PathBuf,
    timeout_secs: u64,
}

impl PythonTool {
    pub fn new(interpreter: impl Into<String>, workdir: impl Into<PathBuf>, timeout_secs: u64) -> Self {
        Self {
            interpreter: interpreter.into(),
            workdir: workdir.into(),
            timeout_secs,
        }
    }

    async fn run(&self, code: &str) -> Result<String, String> {
        let mut child = Command::new(&self.interpreter)
            .arg("-")
            .current_dir(&self.workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("Failed to start {}: {}", self.interpreter, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(code.as_bytes())
                .await
                .map_err(|e| format!("Write stdin: {}", e))?;
        }

        let output = tokio::time::timeout(Duration::from_secs(self.timeout_secs), child.wait_with_output())
            .await
            .map_err(|_| format!("Python timed out after {}s", self.timeout_secs))?
            .map_err(|e| format!("Execution failed: {}", e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            return Err(format!("Exit {:?}\n{}", output.status.code(), stderr.trim()));
        }
        Ok(if stderr.trim().is_empty() {
            stdout
        } else {
            format!("{}\nstderr: {}", stdout.trim_end(), stderr.trim())
        })
    }
}

#[async_trait]
impl Tool for PythonTool {
    fn name(&self) -> &str {
        "python"
    }

    fn description(&self) -> &str {
        "Run Python code for quick calculations. Use print(...) to see output."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": { "type": "string", "description": "Python source to execute" }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let code = args.get("code").and_then(|v| v.as_str()).unwrap_or("");
        if code.trim().is_empty() {
            return Err("Missing code".to_string());
        }
        tracing::info!(chars = code.len(), "python execute");
        self.run(code).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_code() {
        let tool = PythonTool::new("python3", ".", 5);
        assert_eq!(tool.execute(json!({"code": "  "})).await.unwrap_err(), "Missing code");
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_reported() {
        let tool = PythonTool::new("definitely-not-a-python-binary", ".", 5);
        let err = tool.execute(json!({"code": "print(1)"})).await.unwrap_err();
        assert!(err.starts_with("Failed to start"));
    }
}
