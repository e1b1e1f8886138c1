//! 运行时构建器：统一的初始化逻辑
//!
//! 从 AppConfig 构造工具注册表、健康表与 Provider 池，再交给 TeamFactory 组装协调者。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::agents::{Coordinator, Session, TeamFactory, TeamSpec};
use crate::config::AppConfig;
use crate::core::AgentError;
use crate::llm::{
    create_client, Credential, HealthTransition, ProviderHealthTracker, ProviderPool, ProviderSpec,
};
use crate::tools::{
    CalculatorTool, HttpQuoteSource, QuoteSource, StaticQuotes, StockPriceTool, ToolRegistry,
};

/// 构建完成的运行时：协调者 + 共享健康表 + 会话记忆预算
pub struct Hive {
    pub coordinator: Coordinator,
    pub health: Arc<ProviderHealthTracker>,
    pub budget_tokens: usize,
}

impl Hive {
    pub fn new_session(&self) -> Session {
        Session::new(self.budget_tokens)
    }
}

pub struct HiveBuilder {
    config: AppConfig,
    read_server_keys: bool,
    observer: Option<mpsc::UnboundedSender<HealthTransition>>,
}

impl HiveBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            read_server_keys: true,
            observer: None,
        }
    }

    /// 是否从 api_key_env 读取服务端默认 Key（测试中关闭以隔离环境）
    pub fn with_server_keys(mut self, enable: bool) -> Self {
        self.read_server_keys = enable;
        self
    }

    /// 订阅 Provider 健康状态变化
    pub fn with_health_observer(mut self, tx: mpsc::UnboundedSender<HealthTransition>) -> Self {
        self.observer = Some(tx);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn quote_source(&self) -> Result<Arc<dyn QuoteSource>, AgentError> {
        let tools = &self.config.tools;
        if !tools.static_quotes.is_empty() {
            return Ok(Arc::new(StaticQuotes::from_prices(&tools.static_quotes)));
        }
        let source = HttpQuoteSource::new(
            tools.quote_base_url.as_deref(),
            Duration::from_secs(tools.tool_timeout_secs),
        )
        .map_err(|e| AgentError::ConfigError(e.to_string()))?;
        Ok(Arc::new(source))
    }

    /// 构建统一的工具注册表（所有 Agent 共享同一套工具，按订阅取子集）
    pub fn build_tool_registry(&self) -> Result<ToolRegistry, AgentError> {
        let mut tools = ToolRegistry::new();
        let register_err = |e: crate::tools::RegistryError| AgentError::ConfigError(e.to_string());
        tools
            .register(StockPriceTool::new(self.quote_source()?))
            .map_err(register_err)?;
        tools.register(CalculatorTool).map_err(register_err)?;
        Ok(tools)
    }

    /// 构建健康表与 Provider 池（配置列表顺序即优先级）
    pub fn build_pool(
        &self,
    ) -> Result<(Arc<ProviderPool>, Arc<ProviderHealthTracker>), AgentError> {
        let providers = &self.config.providers;
        if providers.list.is_empty() {
            return Err(AgentError::ConfigError("no providers configured".to_string()));
        }
        let mut health = ProviderHealthTracker::new(
            providers.list.iter().map(|p| p.id.clone()),
            providers.health_policy(),
        );
        if let Some(tx) = &self.observer {
            health = health.with_observer(tx.clone());
        }
        let health = Arc::new(health);

        let mut pool = ProviderPool::new(Arc::clone(&health))
            .with_request_timeout(providers.request_timeout());
        if let Some(max) = providers.max_attempts {
            pool = pool.with_max_attempts(max);
        }
        for entry in &providers.list {
            let server_key = if self.read_server_keys {
                entry
                    .api_key_env()
                    .and_then(|var| std::env::var(var).ok())
                    .filter(|k| !k.trim().is_empty())
                    .map(Credential::new)
            } else {
                None
            };
            tracing::info!(
                provider = %entry.id,
                kind = ?entry.kind,
                has_server_key = server_key.is_some(),
                "configured provider"
            );
            let spec = ProviderSpec::new(entry.id.clone(), entry.kind)
                .with_requires_credential(entry.requires_credential())
                .with_server_key(server_key);
            let client =
                create_client(entry.kind, entry.model.as_deref(), entry.base_url.as_deref());
            pool.add_provider(spec, client);
        }
        Ok((Arc::new(pool), health))
    }

    pub fn build(&self, team: &TeamSpec) -> Result<Hive, AgentError> {
        let registry = Arc::new(self.build_tool_registry()?);
        let (pool, health) = self.build_pool()?;

        let mut team = team.clone();
        if let Some(prompt) = &self.config.manager.system_prompt {
            let mut coordinator = team.coordinator_or_default();
            coordinator.system_prompt = Some(prompt.clone());
            team.coordinator = Some(coordinator);
        }

        let coordinator = TeamFactory::new(registry, pool)
            .with_settings(self.config.team_settings())
            .build(&team)?;
        Ok(Hive {
            coordinator,
            health,
            budget_tokens: self.config.memory.budget_tokens,
        })
    }
}
