//! Worker Agent：持有一小组工具与自己的 system prompt，跑有界的内层推理循环
//!
//! 工具失败在 Worker 内部吸收为文本观察；只有 NeedsCredential / AllProvidersUnavailable / Cancelled 向上传播。

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::agents::Observation;
use crate::core::{AgentError, RecoveryAction, RecoveryEngine};
use crate::llm::{Credentials, ProviderPool};
use crate::memory::Message;
use crate::react::{parse_llm_output, Planner, PlannerOutput};
use crate::tools::{tool_call_schema_json, ToolExecutor};

pub const DEFAULT_WORKER_MAX_TURNS: usize = 5;

pub struct WorkerAgent {
    name: String,
    description: String,
    planner: Planner,
    tools: ToolExecutor,
    recovery: RecoveryEngine,
    max_turns: usize,
}

impl fmt::Debug for WorkerAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerAgent")
            .field("name", &self.name)
            .field("tools", &self.tools.tool_names())
            .field("max_turns", &self.max_turns)
            .finish()
    }
}

impl WorkerAgent {
    pub fn new(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        pool: Arc<ProviderPool>,
        tools: ToolExecutor,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            planner: Planner::new(pool, system_prompt),
            tools,
            recovery: RecoveryEngine::new(),
            max_turns: DEFAULT_WORKER_MAX_TURNS,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.tool_names()
    }

    fn build_system_prompt(&self) -> String {
        let base = self.planner.base_system_prompt();
        if self.tools.registry().is_empty() {
            return format!("{base}\n\nAnswer in plain text.");
        }
        format!(
            "{base}\n\n## Tools\n{}\n\n\
             To use a tool, reply with exactly one JSON object matching this schema:\n{}\n\
             Otherwise reply with the answer in plain text.",
            self.tools.registry().to_schema_json(),
            tool_call_schema_json()
        )
    }

    /// 执行一次委托：history 为协调者的记忆快照，instruction 为委托内容
    pub async fn step(
        &self,
        instruction: &str,
        history: &[Message],
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> Result<Observation, AgentError> {
        let system = self.build_system_prompt();
        let mut scratch: Vec<Message> = history.to_vec();
        scratch.push(Message::user(instruction));
        tracing::info!(worker = %self.name, "worker starting loop");

        for turn in 1..=self.max_turns {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            tracing::debug!(worker = %self.name, turn, "worker turn");
            let completion = self
                .planner
                .plan_with_system(&scratch, &system, credentials, cancel)
                .await?;

            let call = match parse_llm_output(&completion.content) {
                Ok(PlannerOutput::Response(text)) => {
                    tracing::info!(worker = %self.name, turn, "worker final answer");
                    return Ok(Observation::ok(text));
                }
                Ok(PlannerOutput::ToolCall(call)) => call,
                Err(e) => {
                    scratch.push(Message::assistant(completion.content));
                    if let RecoveryAction::Observe(hint) = self.recovery.handle(&e, &self.name) {
                        scratch.push(Message::tool(hint));
                    }
                    continue;
                }
            };

            tracing::info!(worker = %self.name, tool = %call.tool, "worker calling tool");
            let executed = self.tools.execute(&call.tool, call.args.clone(), cancel).await;
            let observation = match executed {
                Ok(out) => out,
                Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
                Err(AgentError::UnknownTool(name)) => format!("Unknown tool '{name}'"),
                Err(AgentError::ToolExecutionFailed(msg)) => {
                    format!("Tool execution failed: {msg}")
                }
                Err(e) => format!("Tool execution failed: {e}"),
            };
            scratch.push(Message::assistant(
                serde_json::to_string(&call).unwrap_or(completion.content),
            ));
            scratch.push(Message::tool(observation));
        }

        tracing::warn!(worker = %self.name, turns = self.max_turns, "worker ran out of turns");
        Ok(Observation::error(format!(
            "{} timed out after {} turns",
            self.name, self.max_turns
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::llm::{
        HealthPolicy, ProviderError, ProviderHealthTracker, ProviderKind, ProviderSpec,
        ScriptedLlmClient,
    };
    use crate::memory::Role;
    use crate::tools::{StaticQuotes, StockPriceTool, ToolRegistry};

    fn worker(client: Arc<ScriptedLlmClient>) -> WorkerAgent {
        let health = Arc::new(ProviderHealthTracker::new(["mock"], HealthPolicy::default()));
        let pool = Arc::new(
            ProviderPool::new(health)
                .with_provider(ProviderSpec::new("mock", ProviderKind::Mock), client),
        );
        let mut registry = ToolRegistry::new();
        registry
            .register(StockPriceTool::new(Arc::new(
                StaticQuotes::new().with("ACME", 193.4, "USD"),
            )))
            .unwrap();
        WorkerAgent::new(
            "finance_expert",
            "You are a finance expert.",
            pool,
            ToolExecutor::new(Arc::new(registry), Duration::from_secs(5)),
        )
    }

    #[tokio::test]
    async fn test_tool_then_answer() {
        let client = Arc::new(ScriptedLlmClient::replies([
            r#"{"tool": "get_stock_price", "args": {"ticker_symbol": "ACME"}}"#,
            "ACME=193.40",
        ]));
        let w = worker(client.clone());
        let obs = w
            .step("price of ACME?", &[], &Credentials::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(obs, Observation::ok("ACME=193.40"));

        let second = &client.requests()[1];
        let tool_msg = second.iter().rev().find(|m| m.role == Role::Tool).unwrap();
        assert!(tool_msg.content.contains("193.4"));
        assert_eq!(second[0].role, Role::System);
        assert!(second[0].content.contains("get_stock_price"));
    }

    #[tokio::test]
    async fn test_unknown_tool_and_failure_become_observations() {
        let client = Arc::new(ScriptedLlmClient::replies([
            r#"{"tool": "teleport", "args": {}}"#,
            r#"{"tool": "get_stock_price", "args": {"ticker_symbol": "ZZZZ"}}"#,
            "could not find it",
        ]));
        let w = worker(client.clone());
        let obs = w
            .step("q", &[], &Credentials::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(obs.text, "could not find it");

        let last = client.requests().pop().unwrap();
        let tools: Vec<&str> = last
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(tools[0], "Unknown tool 'teleport'");
        assert!(tools[1].starts_with("Tool execution failed:"));
    }

    #[tokio::test]
    async fn test_turn_exhaustion_is_soft() {
        let client = Arc::new(ScriptedLlmClient::always(Ok(
            r#"{"tool": "get_stock_price", "args": {"ticker_symbol": "ACME"}}"#.to_string(),
        )));
        let w = worker(client.clone()).with_max_turns(3);
        let obs = w
            .step("loop", &[], &Credentials::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(obs.is_error);
        assert_eq!(obs.text, "finance_expert timed out after 3 turns");
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn test_pool_exhaustion_propagates() {
        let client = Arc::new(ScriptedLlmClient::always(Err(ProviderError::Transient(
            "503".into(),
        ))));
        let err = worker(client)
            .step("q", &[], &Credentials::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AgentError::AllProvidersUnavailable {
                attempted: vec!["mock".to_string()]
            }
        );
    }
}
