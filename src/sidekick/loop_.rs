//! 循环控制器：Worker -> (Tools -> Worker)* -> Evaluator -> Worker | Done
//!
//! 每个挂起点（两次模型调用、工具分发）都与 CancellationToken 竞争；取消时返回 Cancelled，
//! 会话状态停留在最后一条完整追加的消息上。迭代上限触发时强制 needs_user_input 并结束。

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, SessionState};
use crate::memory::Message;
use crate::sidekick::evaluator::FEEDBACK_PREFIX;
use crate::sidekick::{dispatch_pending, Evaluator, SidekickEvent, Worker};
use crate::tools::ToolExecutor;

/// Worker 步数达到上限时，未执行的工具调用的结果
pub const SKIPPED_TOOL_RESULT: &str = "Error: skipped, worker step limit reached";

/// 状态机状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Worker,
    Tools,
    Evaluator,
    Done,
}

/// 迭代上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopLimits {
    /// 单次 run 内 Evaluator 最多执行次数
    pub max_evaluations: usize,
    /// 单次 run 内 Worker 最多执行次数（含工具往返）
    pub max_worker_steps: usize,
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self {
            max_evaluations: 5,
            max_worker_steps: 25,
        }
    }
}

/// 单次 run 的调用统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub worker_calls: usize,
    pub tool_dispatches: usize,
    pub evaluator_calls: usize,
    /// 是否因迭代上限被强制结束
    pub forced_stop: bool,
}

/// Worker 之后的路由：有待执行的工具调用则去 Tools，否则去 Evaluator
pub fn route_after_worker(state: &SessionState) -> LoopState {
    match state.last_message() {
        Some(m) if m.has_tool_calls() => LoopState::Tools,
        _ => LoopState::Evaluator,
    }
}

/// Tools 之后无条件回到 Worker
pub fn route_after_tools(_state: &SessionState) -> LoopState {
    LoopState::Worker
}

/// Evaluator 之后：达标或需要用户输入则结束，否则带着反馈回到 Worker
pub fn route_after_evaluator(state: &SessionState) -> LoopState {
    if state.is_terminal() {
        LoopState::Done
    } else {
        LoopState::Worker
    }
}

/// 循环控制器：组合 Worker / ToolExecutor / Evaluator
pub struct SidekickLoop {
    worker: Worker,
    evaluator: Evaluator,
    executor: Arc<ToolExecutor>,
    limits: LoopLimits,
}

impl SidekickLoop {
    pub fn new(worker: Worker, evaluator: Evaluator, executor: Arc<ToolExecutor>, limits: LoopLimits) -> Self {
        Self {
            worker,
            evaluator,
            executor,
            limits,
        }
    }

    pub fn limits(&self) -> LoopLimits {
        self.limits
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    /// 从 Worker 开始运行到 Done；调用方需已通过 begin_run 追加本轮用户消息
    pub async fn run(
        &self,
        state: &mut SessionState,
        cancel: &CancellationToken,
        event_tx: Option<&UnboundedSender<SidekickEvent>>,
    ) -> Result<RunStats, AgentError> {
        let mut stats = RunStats::default();
        let (init_prompt, init_completion) = self.usage_snapshot();
        let tool_specs = self.executor.specs();
        let mut current = LoopState::Worker;

        loop {
            send_event(event_tx, SidekickEvent::StepUpdate {
                state: current,
                worker_steps: state.worker_steps,
                evaluations: state.evaluations,
            });
            tracing::info!(state = ?current, worker_steps = state.worker_steps, "sidekick transition");

            current = match current {
                LoopState::Worker => {
                    send_event(event_tx, SidekickEvent::Thinking);
                    guarded(cancel, event_tx, self.worker.step(state, &tool_specs)).await?;
                    stats.worker_calls += 1;
                    let next = route_after_worker(state);
                    if state.worker_steps >= self.limits.max_worker_steps && next == LoopState::Tools {
                        self.force_stop(
                            state,
                            event_tx,
                            format!("worker step limit ({}) reached", self.limits.max_worker_steps),
                        );
                        stats.forced_stop = true;
                        LoopState::Done
                    } else {
                        next
                    }
                }
                LoopState::Tools => {
                    guarded(cancel, event_tx, dispatch_pending(&self.executor, state, event_tx)).await?;
                    stats.tool_dispatches += 1;
                    route_after_tools(state)
                }
                LoopState::Evaluator => {
                    let verdict = guarded(cancel, event_tx, self.evaluator.step(state)).await?;
                    stats.evaluator_calls += 1;
                    send_event(event_tx, SidekickEvent::Verdict {
                        feedback: verdict.feedback,
                        goal_met: verdict.goal_met,
                        needs_user_input: verdict.needs_user_input,
                    });
                    let next = route_after_evaluator(state);
                    if next == LoopState::Worker && state.evaluations >= self.limits.max_evaluations {
                        state.needs_user_input = true;
                        let detail = format!("evaluation limit ({}) reached", self.limits.max_evaluations);
                        tracing::warn!("{}, stopping for user input", detail);
                        send_event(event_tx, SidekickEvent::LimitReached { detail });
                        stats.forced_stop = true;
                        LoopState::Done
                    } else {
                        next
                    }
                }
                LoopState::Done => break,
            };
        }

        let (cur_prompt, cur_completion) = self.usage_snapshot();
        let prompt_tokens = cur_prompt.saturating_sub(init_prompt);
        let completion_tokens = cur_completion.saturating_sub(init_completion);
        send_event(event_tx, SidekickEvent::TokenUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        });

        Ok(stats)
    }

    /// Worker 上限：附上一条说明性的评估反馈，保证结束时 goal_met || needs_user_input
    fn force_stop(&self, state: &mut SessionState, event_tx: Option<&UnboundedSender<SidekickEvent>>, detail: String) {
        tracing::warn!("{}, stopping for user input", detail);
        // 未执行的工具调用补上结果，下一次 run 的请求仍然成对
        for id in state.unanswered_tool_calls() {
            state.push(Message::tool(id, SKIPPED_TOOL_RESULT));
        }
        let feedback = format!("Stopped early: {}. Please refine the request or confirm to continue.", detail);
        state.push(Message::assistant(format!("{}{}", FEEDBACK_PREFIX, feedback)));
        state.last_feedback = Some(feedback);
        state.needs_user_input = true;
        send_event(event_tx, SidekickEvent::LimitReached { detail });
    }

    fn usage_snapshot(&self) -> (u64, u64) {
        let (wp, wc, _) = self.worker.token_usage();
        let (ep, ec, _) = self.evaluator.token_usage();
        (wp + ep, wc + ec)
    }
}

/// 在取消令牌与挂起点之间竞争
async fn guarded<T, F>(
    cancel: &CancellationToken,
    event_tx: Option<&UnboundedSender<SidekickEvent>>,
    fut: F,
) -> Result<T, AgentError>
where
    F: Future<Output = Result<T, AgentError>>,
{
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AgentError::Cancelled),
        r = fut => r,
    };
    if let Err(e) = &result {
        send_event(event_tx, SidekickEvent::Error { text: e.to_string() });
    }
    result
}

fn send_event(tx: Option<&UnboundedSender<SidekickEvent>>, ev: SidekickEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ToolCallRequest;

    #[test]
    fn test_worker_routing() {
        let mut state = SessionState::new("x");
        state.push(Message::assistant("final"));
        assert_eq!(route_after_worker(&state), LoopState::Evaluator);
        state.push(Message::assistant_with_tools("", vec![ToolCallRequest::new("1", "search", "{}")]));
        assert_eq!(route_after_worker(&state), LoopState::Tools);
    }

    #[test]
    fn test_tools_always_return_to_worker() {
        let mut state = SessionState::new("x");
        state.goal_met = true;
        assert_eq!(route_after_tools(&state), LoopState::Worker);
    }

    #[test]
    fn test_evaluator_routing() {
        let mut state = SessionState::new("x");
        assert_eq!(route_after_evaluator(&state), LoopState::Worker);
        state.needs_user_input = true;
        assert_eq!(route_after_evaluator(&state), LoopState::Done);
        state.needs_user_input = false;
        state.goal_met = true;
        assert_eq!(route_after_evaluator(&state), LoopState::Done);
    }
}
