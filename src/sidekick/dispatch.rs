//! 工具分发：执行最后一条 Assistant 消息上的全部工具调用，按请求顺序回写 Tool 结果
//!
//! 各调用彼此独立、可并发执行；未知工具、参数非法、超时或失败都转为结果文本，不中止循环。

use futures_util::future::join_all;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use crate::core::{AgentError, SessionState};
use crate::memory::{Message, ToolCallRequest};
use crate::sidekick::SidekickEvent;
use crate::tools::ToolExecutor;

/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 执行待处理的工具调用；返回追加的 Tool 消息数
pub async fn dispatch_pending(
    executor: &ToolExecutor,
    state: &mut SessionState,
    event_tx: Option<&UnboundedSender<SidekickEvent>>,
) -> Result<usize, AgentError> {
    let calls: Vec<ToolCallRequest> = match state.last_message() {
        Some(last @ Message::Assistant { .. }) => last.pending_tool_calls().to_vec(),
        _ => {
            return Err(AgentError::InvalidState(
                "tool dispatch requires a trailing assistant message".to_string(),
            ))
        }
    };

    for call in &calls {
        send_event(event_tx, SidekickEvent::ToolCall {
            tool: call.name.clone(),
            args: call.arguments.clone(),
        });
    }

    let outputs = join_all(calls.iter().map(|call| invoke(executor, call))).await;

    for (call, output) in calls.iter().zip(outputs) {
        let content = match output {
            Ok(text) => {
                send_event(event_tx, SidekickEvent::Observation {
                    tool: call.name.clone(),
                    preview: preview(&text),
                });
                text
            }
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "tool call failed, reporting to worker");
                send_event(event_tx, SidekickEvent::ToolFailure {
                    tool: call.name.clone(),
                    reason: e.to_string(),
                });
                format!("Error: {}", e)
            }
        };
        state.push(Message::tool(call.id.clone(), content));
    }

    state.clear_verdict_flags();
    Ok(calls.len())
}

async fn invoke(executor: &ToolExecutor, call: &ToolCallRequest) -> Result<String, AgentError> {
    let args = parse_arguments(&call.arguments)?;
    let output = executor.execute(&call.name, args).await?;
    // 空结果也要让模型知道调用已完成
    if output.trim().is_empty() {
        Ok("(no output)".to_string())
    } else {
        Ok(output)
    }
}

/// 解析模型给出的参数字符串；空串视为无参数
fn parse_arguments(raw: &str) -> Result<Value, AgentError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw)
        .map_err(|e| AgentError::ToolExecutionFailed(format!("invalid JSON arguments ({}): {}", e, raw)))
}

fn preview(text: &str) -> String {
    if text.chars().count() > OBSERVATION_PREVIEW_CHARS {
        format!("{}...", text.chars().take(OBSERVATION_PREVIEW_CHARS).collect::<String>())
    } else {
        text.to_string()
    }
}

fn send_event(tx: Option<&UnboundedSender<SidekickEvent>>, ev: SidekickEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}
