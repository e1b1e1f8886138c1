//! 声明式 Agent 描述（agents.toml 解析结果）
//!
//! 只是数据：名称、角色描述、system prompt（或引用的 prompt 文件）、工具订阅与委托目标。
//! 由 TeamFactory 一次性消费，构造后的 Agent 不再持有 spec。

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::AgentError;

pub const DEFAULT_WORKER_PROMPT: &str = "You are a helpful assistant.";
pub const DEFAULT_COORDINATOR_NAME: &str = "Manager";
pub const DEFAULT_COORDINATOR_PROMPT: &str = "You are a manager.";

/// 单个 Agent 的声明
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// 相对 agents 文件所在目录的 prompt 文件；加载时读入 system_prompt
    #[serde(default)]
    pub prompt_file: Option<PathBuf>,
    /// 按名称允许的工具
    #[serde(default)]
    pub tools: Vec<String>,
    /// 按分类订阅的工具（如 finance、utils）
    #[serde(default)]
    pub subscriptions: Vec<String>,
    /// 委托目标（Worker 名）；仅协调者可委托，为空表示团队中全部 Worker
    #[serde(default)]
    pub delegates: Vec<String>,
}

impl AgentSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_subscriptions<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subscriptions = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_delegates<I, S>(mut self, delegates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.delegates = delegates.into_iter().map(Into::into).collect();
        self
    }

    pub fn system_prompt_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.system_prompt.as_deref().unwrap_or(fallback)
    }
}

/// 团队声明：一个协调者 + 若干 Worker
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TeamSpec {
    #[serde(default)]
    pub coordinator: Option<AgentSpec>,
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
}

/// 名称会拼进 `delegate_to_<name>`，只允许字母、数字、下划线与短横线
fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl TeamSpec {
    pub fn new(agents: Vec<AgentSpec>) -> Self {
        Self {
            coordinator: None,
            agents,
        }
    }

    pub fn with_coordinator(mut self, coordinator: AgentSpec) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    pub fn worker(&self, name: &str) -> Option<&AgentSpec> {
        self.agents.iter().find(|a| a.name == name)
    }

    /// 协调者声明；未配置时使用默认名称与 prompt
    pub fn coordinator_or_default(&self) -> AgentSpec {
        self.coordinator.clone().unwrap_or_else(|| {
            AgentSpec::new(DEFAULT_COORDINATOR_NAME)
                .with_system_prompt(DEFAULT_COORDINATOR_PROMPT)
        })
    }

    /// 校验：名称合法且唯一、委托目标存在、Worker 不声明委托
    pub fn validate(&self) -> Result<(), AgentError> {
        let mut seen = HashSet::new();
        for agent in &self.agents {
            if !valid_name(&agent.name) {
                return Err(AgentError::InvalidSpec(format!(
                    "invalid agent name '{}'",
                    agent.name
                )));
            }
            if !seen.insert(agent.name.as_str()) {
                return Err(AgentError::InvalidSpec(format!(
                    "duplicate agent name '{}'",
                    agent.name
                )));
            }
            if !agent.delegates.is_empty() {
                return Err(AgentError::InvalidSpec(format!(
                    "worker '{}' declares delegates; only the coordinator delegates",
                    agent.name
                )));
            }
        }
        if let Some(coordinator) = &self.coordinator {
            if coordinator.name.trim().is_empty() {
                return Err(AgentError::InvalidSpec("coordinator name is empty".to_string()));
            }
            if let Some(missing) = coordinator
                .delegates
                .iter()
                .find(|d| !seen.contains(d.as_str()))
            {
                return Err(AgentError::InvalidSpec(format!(
                    "coordinator delegates to unknown agent '{missing}'"
                )));
            }
        }
        Ok(())
    }
}
