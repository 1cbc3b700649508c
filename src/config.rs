//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SCOUT__*` 覆盖（双下划线表示嵌套，如 `SCOUT__LLM__PROVIDER=deepseek`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub research: ResearchSection,
}

/// [app] 段：应用名、日志文件
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// TUI 占用终端，日志写入文件
    pub log_file: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            log_file: PathBuf::from("scout.log"),
        }
    }
}

/// [llm] 段：后端选择、模型、凭证与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai（Responses API，支持 Web 搜索）/ deepseek / compat（任意 OpenAI 兼容 Chat 端点）
    pub provider: String,
    /// 规划、检索、评估、扩展、报告使用的模型
    pub model: String,
    /// 澄清问题使用的轻量模型
    pub mini_model: String,
    pub base_url: Option<String>,
    /// 未设置时读取 OPENAI_API_KEY（deepseek 为 DEEPSEEK_API_KEY），仍无则在界面中输入
    pub api_key: Option<String>,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            mini_model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次请求超时（秒），0 表示不限
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 120 }
    }
}

/// [research] 段：问题数、每轮查询数、轮数上限、查询去重
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResearchSection {
    pub question_count: usize,
    pub queries_per_round: usize,
    /// 最大检索轮数，0 表示不限（完全由充分性判断决定何时结束）
    pub max_rounds: usize,
    /// 跳过之前轮次已执行过的查询
    pub dedupe_queries: bool,
}

impl Default for ResearchSection {
    fn default() -> Self {
        Self {
            question_count: 5,
            queries_per_round: 5,
            max_rounds: 10,
            dedupe_queries: false,
        }
    }
}

impl LlmSection {
    /// 解析 API Key：配置优先，其次按 provider 读取环境变量
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
            return Some(key.clone());
        }
        let env_names: &[&str] = if self.provider.eq_ignore_ascii_case("deepseek") {
            &["DEEPSEEK_API_KEY", "OPENAI_API_KEY"]
        } else {
            &["OPENAI_API_KEY"]
        };
        env_names
            .iter()
            .find_map(|name| std::env::var(name).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

/// 从 config 目录加载配置，环境变量 SCOUT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SCOUT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
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
        config::Environment::with_prefix("SCOUT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
