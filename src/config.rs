//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `PINTEL__*` 覆盖（双下划线表示嵌套，如 `PINTEL__LLM__PROVIDER=openai`）。
//! API Key 等密钥不进配置文件，直接从环境变量读取。

use std::path::PathBuf;

use serde::Deserialize;

use crate::sidekick::LoopLimits;

/// 应用配置根
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    #[serde(rename = "loop")]
    pub loop_: LoopSection,
    pub tools: ToolsSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 文件工具与 Python 的工作目录
    pub sandbox_dir: PathBuf,
    /// 设置后启用 JSON 会话存储
    pub session_dir: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            sandbox_dir: PathBuf::from("sandbox"),
            session_dir: None,
        }
    }
}

/// [llm] 段：后端选择、模型与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai / deepseek / mock；未配置 Key 时回退到 mock
    pub provider: String,
    pub base_url: Option<String>,
    pub worker_model: String,
    pub evaluator_model: String,
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            base_url: None,
            worker_model: "gpt-4o-mini".to_string(),
            evaluator_model: "gpt-4o-mini".to_string(),
            request_timeout_secs: 60,
        }
    }
}

/// [loop] 段：迭代上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoopSection {
    pub max_evaluations: usize,
    pub max_worker_steps: usize,
}

impl Default for LoopSection {
    fn default() -> Self {
        let limits = LoopLimits::default();
        Self {
            max_evaluations: limits.max_evaluations,
            max_worker_steps: limits.max_worker_steps,
        }
    }
}

impl LoopSection {
    /// 上限至少为 1
    pub fn limits(&self) -> LoopLimits {
        LoopLimits {
            max_evaluations: self.max_evaluations.max(1),
            max_worker_steps: self.max_worker_steps.max(1),
        }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    pub fetch: FetchSection,
    pub python: PythonSection,
    pub browser: BrowserSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            fetch: FetchSection::default(),
            python: PythonSection::default(),
            browser: BrowserSection::default(),
        }
    }
}

/// [tools.fetch] 段：抓取超时、最大字符数、域名白名单（为空不限制）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSection {
    pub timeout_secs: u64,
    pub max_result_chars: usize,
    pub allowed_domains: Vec<String>,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            max_result_chars: 8000,
            allowed_domains: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PythonSection {
    pub enabled: bool,
    pub interpreter: String,
}

impl Default for PythonSection {
    fn default() -> Self {
        Self {
            enabled: true,
            interpreter: "python3".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    pub headless: bool,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self { headless: true }
    }
}

/// 从 config 目录加载配置，环境变量 PINTEL__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 PINTEL__*
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default", "default"] {
        if std::path::Path::new(&format!("{}.toml", name)).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("PINTEL")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
