//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__MANAGER__MAX_ROUNDS=5`）。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::agents::TeamSettings;
use crate::llm::{HealthPolicy, ProviderKind};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub memory: MemorySection,
    pub manager: ManagerSection,
    pub providers: ProvidersSection,
    pub tools: ToolsSection,
    /// 团队声明文件（TeamSpec）
    pub agents_file: Option<PathBuf>,
}

impl AppConfig {
    pub fn agents_file(&self) -> PathBuf {
        self.agents_file
            .clone()
            .unwrap_or_else(|| PathBuf::from("config/agents.toml"))
    }

    pub fn team_settings(&self) -> TeamSettings {
        TeamSettings {
            max_rounds: self.manager.max_rounds,
            worker_max_turns: self.manager.worker_max_turns,
            delegation_timeout: Duration::from_secs(self.manager.delegation_timeout_secs),
            tool_timeout: Duration::from_secs(self.tools.tool_timeout_secs),
        }
    }
}

/// [memory] 段：会话记忆 token 预算
#[derive(Debug, Clone, Deserialize)]
pub struct MemorySection {
    #[serde(default = "default_budget_tokens")]
    pub budget_tokens: usize,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            budget_tokens: default_budget_tokens(),
        }
    }
}

fn default_budget_tokens() -> usize {
    crate::memory::DEFAULT_BUDGET_TOKENS
}

/// [manager] 段：委托轮数上限、Worker 内层轮数、委托超时
#[derive(Debug, Clone, Deserialize)]
pub struct ManagerSection {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    #[serde(default = "default_worker_max_turns")]
    pub worker_max_turns: usize,
    #[serde(default = "default_delegation_timeout_secs")]
    pub delegation_timeout_secs: u64,
    /// 覆盖 agents 文件中协调者的 system prompt
    pub system_prompt: Option<String>,
}

impl Default for ManagerSection {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            worker_max_turns: default_worker_max_turns(),
            delegation_timeout_secs: default_delegation_timeout_secs(),
            system_prompt: None,
        }
    }
}

fn default_max_rounds() -> usize {
    crate::agents::DEFAULT_MAX_ROUNDS
}

fn default_worker_max_turns() -> usize {
    crate::agents::DEFAULT_WORKER_MAX_TURNS
}

fn default_delegation_timeout_secs() -> u64 {
    120
}

/// [providers] 段：超时、熔断冷却与 Provider 列表（列表顺序即优先级）
#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersSection {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_cool_down_secs")]
    pub cool_down_secs: u64,
    #[serde(default = "default_quota_reset_secs")]
    pub quota_reset_secs: u64,
    /// 单次请求最多尝试的 Provider 数，未设置时等于列表长度
    pub max_attempts: Option<usize>,
    #[serde(default = "default_provider_list")]
    pub list: Vec<ProviderEntry>,
}

impl Default for ProvidersSection {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            cool_down_secs: default_cool_down_secs(),
            quota_reset_secs: default_quota_reset_secs(),
            max_attempts: None,
            list: default_provider_list(),
        }
    }
}

impl ProvidersSection {
    pub fn health_policy(&self) -> HealthPolicy {
        HealthPolicy {
            cool_down: Duration::from_secs(self.cool_down_secs),
            quota_reset: Duration::from_secs(self.quota_reset_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_cool_down_secs() -> u64 {
    60
}

fn default_quota_reset_secs() -> u64 {
    24 * 60 * 60
}

fn default_provider_list() -> Vec<ProviderEntry> {
    vec![
        ProviderEntry::of_kind("groq", ProviderKind::Groq),
        ProviderEntry::of_kind("gemini", ProviderKind::Gemini),
    ]
}

/// [[providers.list]] 项
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEntry {
    pub id: String,
    pub kind: ProviderKind,
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// 服务端默认 Key 的环境变量名，未设置时按种类取默认（如 GROQ_API_KEY）
    pub api_key_env: Option<String>,
    /// 未设置时按种类决定（Mock 不需要）
    pub requires_credential: Option<bool>,
}

impl ProviderEntry {
    pub fn of_kind(id: &str, kind: ProviderKind) -> Self {
        Self {
            id: id.to_string(),
            kind,
            model: None,
            base_url: None,
            api_key_env: None,
            requires_credential: None,
        }
    }

    pub fn api_key_env(&self) -> Option<&str> {
        self.api_key_env
            .as_deref()
            .or_else(|| self.kind.default_api_key_env())
    }

    pub fn requires_credential(&self) -> bool {
        self.requires_credential
            .unwrap_or_else(|| self.kind.requires_credential())
    }
}

/// [tools] 段：工具超时与报价来源
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// 在线报价接口根地址；static_quotes 非空时不使用
    pub quote_base_url: Option<String>,
    /// 离线报价表（ticker -> price），非空时替代在线报价
    #[serde(default)]
    pub static_quotes: HashMap<String, f64>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            quote_base_url: None,
            static_quotes: HashMap::new(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn env_source() -> config::Environment {
    config::Environment::with_prefix("HIVE")
        .separator("__")
        .try_parsing(true)
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder.add_source(env_source()).build()?.try_deserialize()
}

/// 只读指定文件（必须存在）与环境变量，不查找默认位置
pub fn load_config_from(path: impl AsRef<Path>) -> Result<AppConfig, config::ConfigError> {
    config::Config::builder()
        .add_source(config::File::from(path.as_ref()).required(true))
        .add_source(env_source())
        .build()?
        .try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.memory.budget_tokens, 4096);
        assert_eq!(cfg.manager.max_rounds, 10);
        assert_eq!(cfg.providers.cool_down_secs, 60);
        assert_eq!(cfg.providers.quota_reset_secs, 86_400);
        let ids: Vec<&str> = cfg.providers.list.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["groq", "gemini"]);
        assert_eq!(cfg.agents_file(), PathBuf::from("config/agents.toml"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hive.toml");
        std::fs::write(
            &path,
            r#"
agents_file = "team.toml"

[memory]
budget_tokens = 512

[manager]
max_rounds = 3

[providers]
cool_down_secs = 5

[[providers.list]]
id = "local"
kind = "mock"

[[providers.list]]
id = "deepseek"
kind = "deepseek"
api_key_env = "MY_DS_KEY"

[tools.static_quotes]
acme = 193.4
"#,
        )
        .unwrap();

        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg.memory.budget_tokens, 512);
        assert_eq!(cfg.manager.max_rounds, 3);
        assert_eq!(cfg.manager.worker_max_turns, 5);
        assert_eq!(cfg.providers.health_policy().cool_down, Duration::from_secs(5));
        assert_eq!(cfg.providers.list.len(), 2);
        assert!(!cfg.providers.list[0].requires_credential());
        assert_eq!(cfg.providers.list[1].api_key_env(), Some("MY_DS_KEY"));
        assert_eq!(cfg.tools.static_quotes.get("acme"), Some(&193.4));
        assert_eq!(cfg.agents_file(), PathBuf::from("team.toml"));
        assert_eq!(cfg.team_settings().max_rounds, 3);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        assert!(load_config_from("/no/such/hive.toml").is_err());
    }
}
