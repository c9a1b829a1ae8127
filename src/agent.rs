//! Sidekick 运行时
//!
//! 供 CLI / HTTP 等前端调用的无界面入口：
//! setup 按配置构建 Worker / Evaluator 模型、工具注册表与会话资源，
//! run 对单条用户请求跑完 Worker -> Tools -> Evaluator 循环并返回新的对话记录，
//! cleanup 释放会话独占的外部资源（可重复调用）。

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::{AgentError, SessionId, SessionState, Teardown};
use crate::llm::{create_deepseek_client, LlmClient, MockLlmClient, OpenAiClient, DEEPSEEK_CHAT};
use crate::memory::{ChatTurn, JsonFileSessionStore, Message, SessionStore};
use crate::sidekick::{Evaluator, LoopLimits, RunStats, SidekickEvent, SidekickLoop, Worker};
use crate::tools::{
    FetchPageTool, ListDirectoryTool, PushNotificationTool, PythonTool, ReadFileTool, SafeFs,
    SerperSearchTool, ToolExecutor, ToolRegistry, WikipediaTool, WriteFileTool,
};
#[cfg(feature = "browser")]
use crate::tools::{BrowserHandle, BrowserTool};

/// 按 provider 与环境变量中的 API Key 选择后端；都不可用时回退到 Mock
pub fn create_llm_from_config(cfg: &AppConfig, model: &str) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let has_key = |name: &str| std::env::var(name).map(|v| !v.trim().is_empty()).unwrap_or(false);

    if provider == "mock" {
        tracing::info!("Using Mock LLM");
        return Arc::new(MockLlmClient);
    }
    let use_deepseek = has_key("DEEPSEEK_API_KEY") && (provider == "deepseek" || !has_key("OPENAI_API_KEY"));

    if use_deepseek {
        // OpenAI 的默认模型名在 DeepSeek 上不可用
        let model = if model.starts_with("gpt-") { DEEPSEEK_CHAT } else { model };
        tracing::info!("Using DeepSeek LLM ({})", model);
        Arc::new(create_deepseek_client(Some(model)).with_timeout(cfg.llm.request_timeout_secs))
    } else if has_key("OPENAI_API_KEY") {
        tracing::info!("Using OpenAI LLM ({})", model);
        Arc::new(
            OpenAiClient::new(cfg.llm.base_url.as_deref(), model, None)
                .with_timeout(cfg.llm.request_timeout_secs),
        )
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock LLM");
        Arc::new(MockLlmClient)
    }
}

/// 按配置注册工具；有状态的句柄（浏览器）登记到 teardown
pub fn build_tool_registry(cfg: &AppConfig, teardown: &Teardown) -> Result<ToolRegistry, AgentError> {
    let tools_cfg = &cfg.tools;
    let fs = SafeFs::new(&cfg.app.sandbox_dir).map_err(|e| {
        AgentError::ConfigError(format!("sandbox dir {}: {}", cfg.app.sandbox_dir.display(), e))
    })?;

    let mut registry = ToolRegistry::new();
    registry.register(ReadFileTool::new(fs.clone()));
    registry.register(WriteFileTool::new(fs.clone()));
    registry.register(ListDirectoryTool::new(fs.clone()));
    registry.register(WikipediaTool::new(tools_cfg.fetch.timeout_secs));
    registry.register(FetchPageTool::new(
        tools_cfg.fetch.allowed_domains.clone(),
        tools_cfg.fetch.timeout_secs,
        tools_cfg.fetch.max_result_chars,
    ));
    registry.register(PushNotificationTool::from_env());

    match SerperSearchTool::from_env(tools_cfg.fetch.timeout_secs) {
        Some(search) => registry.register(search),
        None => tracing::info!("SERPER_API_KEY not set, web search disabled"),
    }

    if tools_cfg.python.enabled {
        registry.register(PythonTool::new(
            tools_cfg.python.interpreter.clone(),
            fs.root(),
            tools_cfg.tool_timeout_secs,
        ));
    }

    #[cfg(feature = "browser")]
    {
        let handle = Arc::new(BrowserHandle::new(tools_cfg.browser.headless));
        teardown.register(handle.clone());
        registry.register(BrowserTool::new(handle, tools_cfg.fetch.max_result_chars));
    }
    #[cfg(not(feature = "browser"))]
    let _ = teardown;

    tracing::info!(tools = ?registry.tool_names(), "tool registry ready");
    Ok(registry)
}

/// 一个会话的 Sidekick：同一实例上的 run 串行执行
pub struct Sidekick {
    sidekick_loop: SidekickLoop,
    teardown: Arc<Teardown>,
    store: Option<Arc<dyn SessionStore>>,
    run_lock: Mutex<()>,
}

impl Sidekick {
    pub fn new(
        worker_llm: Arc<dyn LlmClient>,
        evaluator_llm: Arc<dyn LlmClient>,
        registry: ToolRegistry,
        tool_timeout_secs: u64,
        limits: LoopLimits,
    ) -> Self {
        let executor = Arc::new(ToolExecutor::new(registry, tool_timeout_secs));
        Self {
            sidekick_loop: SidekickLoop::new(Worker::new(worker_llm), Evaluator::new(evaluator_llm), executor, limits),
            teardown: Arc::new(Teardown::new()),
            store: None,
            run_lock: Mutex::new(()),
        }
    }

    /// 按配置构建完整会话：模型、工具、会话存储
    pub fn setup(cfg: &AppConfig) -> Result<Self, AgentError> {
        let teardown = Arc::new(Teardown::new());
        let registry = build_tool_registry(cfg, &teardown)?;
        let worker_llm = create_llm_from_config(cfg, &cfg.llm.worker_model);
        let evaluator_llm = create_llm_from_config(cfg, &cfg.llm.evaluator_model);

        let mut sidekick = Self::new(
            worker_llm,
            evaluator_llm,
            registry,
            cfg.tools.tool_timeout_secs,
            cfg.loop_.limits(),
        );
        sidekick.teardown = teardown;
        if let Some(dir) = &cfg.app.session_dir {
            sidekick.store = Some(Arc::new(JsonFileSessionStore::new(dir)));
        }
        Ok(sidekick)
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 会话资源登记处（外部注册的资源在 cleanup 时一并释放）
    pub fn teardown(&self) -> Arc<Teardown> {
        Arc::clone(&self.teardown)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.sidekick_loop.executor().tool_names()
    }

    pub fn limits(&self) -> LoopLimits {
        self.sidekick_loop.limits()
    }

    /// 单次 run：prior_history + 用户消息 -> 循环至 Done -> 原历史 + 本次 run 的对话记录
    pub async fn run(
        &self,
        user_message: &str,
        goal_description: &str,
        prior_history: &[ChatTurn],
    ) -> Result<Vec<ChatTurn>, AgentError> {
        self.run_with(user_message, goal_description, prior_history, &CancellationToken::new(), None)
            .await
    }

    /// 同 run，可取消并输出过程事件
    pub async fn run_with(
        &self,
        user_message: &str,
        goal_description: &str,
        prior_history: &[ChatTurn],
        cancel: &CancellationToken,
        event_tx: Option<&UnboundedSender<SidekickEvent>>,
    ) -> Result<Vec<ChatTurn>, AgentError> {
        self.run_with_stats(user_message, goal_description, prior_history, cancel, event_tx)
            .await
            .map(|(turns, _)| turns)
    }

    /// 同 run_with，另外返回本次 run 的 Worker / 工具分发 / Evaluator 次数与是否被上限截停
    pub async fn run_with_stats(
        &self,
        user_message: &str,
        goal_description: &str,
        prior_history: &[ChatTurn],
        cancel: &CancellationToken,
        event_tx: Option<&UnboundedSender<SidekickEvent>>,
    ) -> Result<(Vec<ChatTurn>, RunStats), AgentError> {
        let mut state = SessionState::seeded(goal_description, prior_history);
        let (turns, stats) = self
            .drive(&mut state, user_message, goal_description, cancel, event_tx)
            .await?;
        let mut out = prior_history.to_vec();
        out.extend(turns);
        Ok((out, stats))
    }

    /// 基于 SessionStore 的 run：读取会话、追加本次请求、跑完后保存；返回本次 run 的对话记录
    ///
    /// 中途失败或取消时也保存到最后一条完整追加的消息
    pub async fn run_session(
        &self,
        id: &SessionId,
        user_message: &str,
        goal_description: &str,
        cancel: &CancellationToken,
        event_tx: Option<&UnboundedSender<SidekickEvent>>,
    ) -> Result<Vec<ChatTurn>, AgentError> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| AgentError::Store("no session store configured".to_string()))?;
        let mut state = store
            .load(id)
            .await?
            .unwrap_or_else(|| SessionState::new(goal_description));

        let result = self
            .drive(&mut state, user_message, goal_description, cancel, event_tx)
            .await;
        store.save(id, &state).await?;
        result.map(|(turns, _)| turns)
    }

    /// 释放会话资源；可重复调用，不依赖当前是否处于 async 运行时
    pub fn cleanup(&self) {
        let released = self.teardown.cleanup();
        if released > 0 {
            tracing::info!(released, "sidekick resources released");
        }
    }

    async fn drive(
        &self,
        state: &mut SessionState,
        user_message: &str,
        goal_description: &str,
        cancel: &CancellationToken,
        event_tx: Option<&UnboundedSender<SidekickEvent>>,
    ) -> Result<(Vec<ChatTurn>, RunStats), AgentError> {
        let _guard = self.run_lock.lock().await;

        state.begin_run(user_message, goal_description);
        // System 消息会被 Worker 插入到头部，按非 System 消息计数定位本次 run 的起点
        let before = state.messages.iter().filter(|m| !m.is_system()).count();

        let stats = self.sidekick_loop.run(state, cancel, event_tx).await?;
        tracing::info!(
            worker_calls = stats.worker_calls,
            tool_dispatches = stats.tool_dispatches,
            evaluator_calls = stats.evaluator_calls,
            goal_met = state.goal_met,
            needs_user_input = state.needs_user_input,
            "run finished"
        );

        let mut turns = vec![ChatTurn::user(user_message)];
        turns.extend(
            state
                .messages
                .iter()
                .filter(|m| !m.is_system())
                .skip(before)
                .filter_map(|m| match m {
                    Message::Assistant { content, .. } if !content.trim().is_empty() => {
                        Some(ChatTurn::assistant(content.clone()))
                    }
                    _ => None,
                }),
        );
        Ok((turns, stats))
    }
}
