//! 团队构建：TeamSpec + ToolRegistry + ProviderPool → Coordinator
//!
//! 纯数据到结构体的一步：按名称 / 分类为每个 Worker 挑出工具子集，构造 Worker 与协调者。

use std::sync::Arc;
use std::time::Duration;

use crate::agents::{
    Coordinator, TeamSpec, WorkerAgent, DEFAULT_DELEGATION_TIMEOUT, DEFAULT_MAX_ROUNDS,
    DEFAULT_WORKER_MAX_TURNS, DEFAULT_WORKER_PROMPT,
};
use crate::core::AgentError;
use crate::llm::ProviderPool;
use crate::tools::{ToolExecutor, ToolRegistry, DEFAULT_TOOL_TIMEOUT};

/// 运行参数（来自配置的 [manager] / [tools] 段）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamSettings {
    pub max_rounds: usize,
    pub worker_max_turns: usize,
    pub delegation_timeout: Duration,
    pub tool_timeout: Duration,
}

impl Default for TeamSettings {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            worker_max_turns: DEFAULT_WORKER_MAX_TURNS,
            delegation_timeout: DEFAULT_DELEGATION_TIMEOUT,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }
}

pub struct TeamFactory {
    registry: Arc<ToolRegistry>,
    pool: Arc<ProviderPool>,
    settings: TeamSettings,
}

impl TeamFactory {
    pub fn new(registry: Arc<ToolRegistry>, pool: Arc<ProviderPool>) -> Self {
        Self {
            registry,
            pool,
            settings: TeamSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: TeamSettings) -> Self {
        self.settings = settings;
        self
    }

    fn tool_subset(
        &self,
        owner: &str,
        names: &[String],
        categories: &[String],
    ) -> Result<ToolExecutor, AgentError> {
        let subset = self
            .registry
            .subset(names, categories)
            .map_err(|e| AgentError::InvalidSpec(format!("agent '{owner}': {e}")))?;
        Ok(ToolExecutor::new(Arc::new(subset), self.settings.tool_timeout))
    }

    /// 构造每个 Worker（声明顺序）
    pub fn build_workers(&self, team: &TeamSpec) -> Result<Vec<Arc<WorkerAgent>>, AgentError> {
        team.agents
            .iter()
            .map(|spec| {
                let tools = self.tool_subset(&spec.name, &spec.tools, &spec.subscriptions)?;
                tracing::info!(worker = %spec.name, tools = ?tools.tool_names(), "built worker");
                let worker = WorkerAgent::new(
                    spec.name.clone(),
                    spec.system_prompt_or(DEFAULT_WORKER_PROMPT),
                    Arc::clone(&self.pool),
                    tools,
                )
                .with_description(spec.description.clone())
                .with_max_turns(self.settings.worker_max_turns);
                Ok(Arc::new(worker))
            })
            .collect()
    }

    pub fn build(&self, team: &TeamSpec) -> Result<Coordinator, AgentError> {
        team.validate()?;
        let spec = team.coordinator_or_default();
        let workers = self.build_workers(team)?;
        let tools = self.tool_subset(&spec.name, &spec.tools, &spec.subscriptions)?;

        let prompt = spec.system_prompt_or(crate::agents::spec::DEFAULT_COORDINATOR_PROMPT);
        let mut coordinator =
            Coordinator::new(spec.name.clone(), prompt, Arc::clone(&self.pool), tools)
                .with_max_rounds(self.settings.max_rounds)
                .with_delegation_timeout(self.settings.delegation_timeout);
        for worker in workers {
            if spec.delegates.is_empty() || spec.delegates.iter().any(|d| d == worker.name()) {
                coordinator = coordinator.with_worker(worker);
            }
        }
        tracing::info!(
            coordinator = %coordinator.name(),
            units = ?coordinator.unit_names(),
            "team ready"
        );
        Ok(coordinator)
    }
}
