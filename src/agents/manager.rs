//! 协调者（Manager）Agent：递归委托循环
//!
//! 每轮：拼 system prompt（基础 prompt + 团队名单 + 可调用单元描述）与记忆快照，经 Provider 池推理；
//! 回复分类为最终回答或一次委托。委托结果（调用条目 + 观察条目）在委托完成后一起提交到记忆，
//! 取消时丢弃。缺少凭据时保留会话状态，同一 Query 重新提交可继续。

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agents::{CallableUnit, InvokeContext, Observation, WorkerAgent};
use crate::core::{AgentError, AgentPhase, PhaseTracker, RecoveryAction, RecoveryEngine};
use crate::llm::{Credentials, ProviderPool};
use crate::memory::{BoundedMemory, Message, Role, DEFAULT_BUDGET_TOKENS};
use crate::react::{events::preview, parse_llm_output, Planner, PlannerOutput, ReactEvent, ToolCall};
use crate::tools::{tool_call_schema_json, ToolExecutor};

pub const DEFAULT_MAX_ROUNDS: usize = 10;
pub const DEFAULT_DELEGATION_TIMEOUT: Duration = Duration::from_secs(120);

/// 一次请求的输入：文本 + 本次请求的凭据；创建后不可变
#[derive(Debug, Clone)]
pub struct Query {
    text: String,
    credentials: Credentials,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            credentials: Credentials::new(),
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}

/// 一轮委托的记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelegationRecord {
    pub round: usize,
    pub target: String,
    pub args: serde_json::Value,
    pub observation: String,
    pub is_error: bool,
    /// 做出本次委托决定的 Provider
    pub provider: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub provider: String,
    pub transcript: Vec<DelegationRecord>,
    pub rounds: usize,
}

/// 因缺少凭据而挂起的运行
#[derive(Debug, Clone, Default)]
struct PendingRun {
    query: String,
    rounds: usize,
    transcript: Vec<DelegationRecord>,
}

/// 会话：独占的对话记忆 + 挂起状态
#[derive(Debug)]
pub struct Session {
    id: String,
    memory: BoundedMemory,
    pending: Option<PendingRun>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(DEFAULT_BUDGET_TOKENS)
    }
}

impl Session {
    pub fn new(budget_tokens: usize) -> Self {
        Self::with_memory(BoundedMemory::new(budget_tokens))
    }

    pub fn with_memory(memory: BoundedMemory) -> Self {
        Self {
            id: format!("session_{}", Uuid::new_v4()),
            memory,
            pending: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn memory(&self) -> &BoundedMemory {
        &self.memory
    }

    /// 等待凭据的 Query 文本
    pub fn pending_query(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.query.as_str())
    }

    pub fn reset(&mut self) {
        self.memory.clear();
        self.pending = None;
    }
}

pub struct Coordinator {
    name: String,
    planner: Planner,
    units: Vec<CallableUnit>,
    tools: ToolExecutor,
    recovery: RecoveryEngine,
    max_rounds: usize,
    delegation_timeout: Duration,
    event_tx: Option<mpsc::UnboundedSender<ReactEvent>>,
}

impl Coordinator {
    /// tools 中注册的工具即协调者可直接调用的工具（可为空）
    pub fn new(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        pool: Arc<ProviderPool>,
        tools: ToolExecutor,
    ) -> Self {
        let units = tools
            .definitions()
            .into_iter()
            .cloned()
            .map(CallableUnit::Tool)
            .collect();
        Self {
            name: name.into(),
            planner: Planner::new(pool, system_prompt),
            units,
            tools,
            recovery: RecoveryEngine::new(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            delegation_timeout: DEFAULT_DELEGATION_TIMEOUT,
            event_tx: None,
        }
    }

    /// Worker 排在工具之前，按加入顺序
    pub fn with_worker(mut self, worker: Arc<WorkerAgent>) -> Self {
        let idx = self.units.iter().take_while(|u| u.is_worker()).count();
        self.units.insert(idx, CallableUnit::Worker(worker));
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_delegation_timeout(mut self, timeout: Duration) -> Self {
        self.delegation_timeout = timeout;
        self
    }

    pub fn with_event_sender(mut self, tx: mpsc::UnboundedSender<ReactEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    pub fn pool(&self) -> &Arc<ProviderPool> {
        self.planner.pool()
    }

    pub fn worker_names(&self) -> Vec<&str> {
        self.units
            .iter()
            .filter(|u| u.is_worker())
            .map(|u| u.target())
            .collect()
    }

    pub fn unit_names(&self) -> Vec<String> {
        self.units.iter().map(|u| u.name()).collect()
    }

    fn resolve(&self, name: &str) -> Option<&CallableUnit> {
        self.units.iter().find(|u| u.name() == name)
    }

    fn emit(&self, event: ReactEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }

    pub fn build_system_prompt(&self) -> String {
        let roster = self.worker_names().join(", ");
        let descriptors: Vec<serde_json::Value> =
            self.units.iter().map(|u| u.descriptor()).collect();
        let descriptors =
            serde_json::to_string_pretty(&descriptors).unwrap_or_else(|_| "[]".to_string());
        format!(
            "{}\nYou manage a team of agents: [{}].\n\
             Delegate tasks to them using the available tools.\n\
             Combine their outputs into a comprehensive final answer.\n\
             Use the conversation history to answer follow-up questions.\n\n\
             ## Callable units\n{}\n\n\
             To call one, reply with exactly one JSON object matching this schema:\n{}\n\
             Otherwise reply with the final answer in plain text.",
            self.planner.base_system_prompt(),
            roster,
            descriptors,
            tool_call_schema_json()
        )
    }

    /// 处理一个 Query
    ///
    /// 与会话中挂起的 Query 文本相同时继续上次的运行（不重复追加 user 条目，轮数与 transcript 延续）；
    /// 否则重新开始。最终回答或硬错误都会清除挂起状态，只有 NeedsCredential 保留它。
    pub async fn run(
        &self,
        session: &mut Session,
        query: &Query,
        cancel: &CancellationToken,
    ) -> Result<Answer, AgentError> {
        let mut state = match session.pending.take() {
            Some(pending) if pending.query == query.text() => {
                tracing::info!(
                    session = %session.id,
                    rounds = pending.rounds,
                    "resuming query after credential prompt"
                );
                pending
            }
            _ => {
                session.memory.append(Role::User, query.text());
                PendingRun {
                    query: query.text().to_string(),
                    ..PendingRun::default()
                }
            }
        };

        let mut phases = PhaseTracker::new();
        let result = self
            .drive(&mut session.memory, &mut state, query, cancel, &mut phases)
            .await;

        match &result {
            Ok(answer) => {
                tracing::info!(
                    coordinator = %self.name,
                    provider = %answer.provider,
                    rounds = answer.rounds,
                    "final synthesis"
                );
            }
            Err(AgentError::NeedsCredential { provider }) => {
                phases.enter(AgentPhase::NeedsCredential);
                tracing::info!(
                    provider = %provider,
                    rounds = state.rounds,
                    "waiting for credential"
                );
                self.emit(ReactEvent::NeedsCredential {
                    provider: provider.clone(),
                });
                session.pending = Some(state);
            }
            Err(e) => {
                phases.enter(AgentPhase::Failed);
                tracing::error!(coordinator = %self.name, error = %e, "query failed");
                self.emit(ReactEvent::Error {
                    text: e.to_string(),
                });
            }
        }
        result
    }

    async fn drive(
        &self,
        memory: &mut BoundedMemory,
        state: &mut PendingRun,
        query: &Query,
        cancel: &CancellationToken,
        phases: &mut PhaseTracker,
    ) -> Result<Answer, AgentError> {
        let system = self.build_system_prompt();
        loop {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            phases.enter(AgentPhase::Thinking);
            self.emit(ReactEvent::Thinking {
                round: state.rounds,
                max_rounds: self.max_rounds,
            });
            let messages = memory.to_messages();
            let completion = self
                .planner
                .plan_with_system(&messages, &system, query.credentials(), cancel)
                .await?;
            self.emit(ReactEvent::ProviderSelected {
                provider: completion.provider.clone(),
                attempts: completion.attempts,
            });

            let parsed = match parse_llm_output(&completion.content) {
                Ok(PlannerOutput::Response(text)) => {
                    phases.enter(AgentPhase::Answering);
                    memory.append(Role::Assistant, text.as_str());
                    self.emit(ReactEvent::Answer {
                        text: text.clone(),
                        provider: completion.provider.clone(),
                    });
                    return Ok(Answer {
                        text,
                        provider: completion.provider,
                        transcript: std::mem::take(&mut state.transcript),
                        rounds: state.rounds,
                    });
                }
                Ok(PlannerOutput::ToolCall(call)) => Ok(call),
                Err(e) => Err(e),
            };

            // 非法的调用格式也计入轮数，保证循环必然终止
            if state.rounds >= self.max_rounds {
                tracing::warn!(rounds = state.rounds, "delegation requested past the round cap");
                return Err(AgentError::IterationCapExceeded {
                    iterations: state.rounds,
                });
            }
            phases.enter(AgentPhase::Delegating);

            let (staged_call, target, args, observation) = match parsed {
                Ok(call) => {
                    tracing::info!(
                        coordinator = %self.name,
                        unit = %call.tool,
                        round = state.rounds + 1,
                        "delegating"
                    );
                    self.emit(ReactEvent::Delegation {
                        target: call.tool.clone(),
                        args: call.args.clone(),
                    });
                    let (target, observation) =
                        self.delegate(&call, &messages, query, cancel).await?;
                    let staged =
                        serde_json::to_string(&call).unwrap_or_else(|_| completion.content.clone());
                    (staged, target, call.args, observation)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "coordinator produced an invalid tool call");
                    let observation = self.observe(&e, &self.name)?;
                    (
                        completion.content.clone(),
                        self.name.clone(),
                        serde_json::Value::Null,
                        observation,
                    )
                }
            };

            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            state.rounds += 1;
            let outcome = memory.extend([
                Message::assistant(staged_call),
                Message::tool(format!("Output from {}:\n{}", target, observation.text)),
            ]);
            if outcome.evicted > 0 {
                tracing::debug!(
                    evicted = outcome.evicted,
                    "memory evicted entries while committing observation"
                );
            }
            self.emit(ReactEvent::Observation {
                target: target.clone(),
                preview: preview(&observation.text, 200),
            });
            state.transcript.push(DelegationRecord {
                round: state.rounds,
                target,
                args,
                observation: observation.text,
                is_error: observation.is_error,
                provider: completion.provider,
            });
        }
    }

    /// 调用目标单元；未知目标、超时、软失败都转为观察，其余错误向上传播
    async fn delegate(
        &self,
        call: &ToolCall,
        history: &[Message],
        query: &Query,
        cancel: &CancellationToken,
    ) -> Result<(String, Observation), AgentError> {
        let Some(unit) = self.resolve(&call.tool) else {
            tracing::warn!(unit = %call.tool, "coordinator tried to call an unknown unit");
            let err = AgentError::UnknownTool(call.tool.clone());
            return Ok((call.tool.clone(), self.observe(&err, &call.tool)?));
        };
        let target = unit.target().to_string();
        let ctx = InvokeContext {
            history,
            credentials: query.credentials(),
            cancel,
            tools: &self.tools,
        };
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            r = tokio::time::timeout(self.delegation_timeout, unit.invoke(&call.args, &ctx)) => r,
        };
        let observation = match outcome {
            Ok(Ok(obs)) => obs,
            Ok(Err(e)) => self.observe(&e, &target)?,
            Err(_) => {
                tracing::warn!(
                    unit = %target,
                    timeout_secs = self.delegation_timeout.as_secs(),
                    "delegation timed out"
                );
                self.observe(&AgentError::ToolTimeout(target.clone()), &target)?
            }
        };
        Ok((target, observation))
    }

    fn observe(&self, err: &AgentError, source: &str) -> Result<Observation, AgentError> {
        match self.recovery.handle(err, source) {
            RecoveryAction::Observe(text) => Ok(Observation::error(text)),
            RecoveryAction::AskUser(_) | RecoveryAction::Abort => Err(err.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{
        HealthPolicy, ProviderHealthTracker, ProviderKind, ProviderSpec, ScriptedLlmClient,
    };
    use crate::tools::{CalculatorTool, ToolRegistry, DEFAULT_TOOL_TIMEOUT};

    fn pool() -> Arc<ProviderPool> {
        let health = Arc::new(ProviderHealthTracker::new(["local"], HealthPolicy::default()));
        Arc::new(ProviderPool::new(health).with_provider(
            ProviderSpec::new("local", ProviderKind::Mock),
            Arc::new(ScriptedLlmClient::default()),
        ))
    }

    fn coordinator() -> Coordinator {
        let mut registry = ToolRegistry::new();
        registry.register(CalculatorTool).unwrap();
        let tools = ToolExecutor::new(Arc::new(registry), DEFAULT_TOOL_TIMEOUT);
        let worker = WorkerAgent::new("finance_expert", "You watch markets.", pool(), tools.clone())
            .with_description("Stock prices.");
        Coordinator::new("Manager", "You are a manager.", pool(), tools)
            .with_worker(Arc::new(worker))
    }

    #[test]
    fn test_workers_listed_before_tools() {
        let c = coordinator();
        assert_eq!(c.unit_names(), vec!["delegate_to_finance_expert", "calculator"]);
        assert_eq!(c.worker_names(), vec!["finance_expert"]);
    }

    #[test]
    fn test_system_prompt_describes_units_and_format() {
        let prompt = coordinator().build_system_prompt();
        assert!(prompt.starts_with("You are a manager."));
        assert!(prompt.contains("[finance_expert]"));
        assert!(prompt.contains("delegate_to_finance_expert"));
        assert!(prompt.contains("Capability: Stock prices."));
        assert!(prompt.contains("\"tool\""));
    }

    #[test]
    fn test_session_reset_clears_memory_and_pending() {
        let mut session = Session::new(64);
        assert!(session.id().starts_with("session_"));
        session.memory.append(Role::User, "hi");
        session.pending = Some(PendingRun {
            query: "hi".to_string(),
            ..PendingRun::default()
        });
        assert_eq!(session.pending_query(), Some("hi"));

        session.reset();
        assert!(session.memory().is_empty());
        assert!(session.pending_query().is_none());
    }
}
