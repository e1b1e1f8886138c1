//! 可调用单元：协调者眼中 Worker 与工具是同一种东西
//!
//! Worker 以 `delegate_to_<name>` 暴露（参数 `{"query": string}`），工具以自身名称与 schema 暴露。

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::agents::WorkerAgent;
use crate::core::AgentError;
use crate::llm::Credentials;
use crate::memory::Message;
use crate::tools::{ToolDefinition, ToolExecutor};

pub const DELEGATE_PREFIX: &str = "delegate_to_";

/// 一次委托的结果文本；is_error 表示软失败（已转为观察，循环继续）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub text: String,
    pub is_error: bool,
}

impl Observation {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

/// 调用上下文：记忆快照、本次请求的凭据、取消令牌、执行工具所用的执行器
pub struct InvokeContext<'a> {
    pub history: &'a [Message],
    pub credentials: &'a Credentials,
    pub cancel: &'a CancellationToken,
    pub tools: &'a ToolExecutor,
}

#[derive(Debug, Clone)]
pub enum CallableUnit {
    Worker(Arc<WorkerAgent>),
    Tool(ToolDefinition),
}

impl CallableUnit {
    /// LLM 调用时使用的名称
    pub fn name(&self) -> String {
        match self {
            CallableUnit::Worker(w) => format!("{DELEGATE_PREFIX}{}", w.name()),
            CallableUnit::Tool(def) => def.name.clone(),
        }
    }

    /// 可读的目标名（Worker 名或工具名）
    pub fn target(&self) -> &str {
        match self {
            CallableUnit::Worker(w) => w.name(),
            CallableUnit::Tool(def) => &def.name,
        }
    }

    pub fn is_worker(&self) -> bool {
        matches!(self, CallableUnit::Worker(_))
    }

    /// 注入 system prompt 的 JSON 描述符
    pub fn descriptor(&self) -> Value {
        match self {
            CallableUnit::Worker(w) => {
                let capability = if w.description().is_empty() {
                    "A helper agent."
                } else {
                    w.description()
                };
                serde_json::json!({
                    "name": self.name(),
                    "description": format!(
                        "Delegate a query to the {}. Capability: {}",
                        w.name(),
                        capability
                    ),
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "query": {
                                "type": "string",
                                "description": "The specific question or instruction for this worker."
                            }
                        },
                        "required": ["query"]
                    }
                })
            }
            CallableUnit::Tool(def) => def.descriptor(),
        }
    }

    pub async fn invoke(
        &self,
        args: &Value,
        ctx: &InvokeContext<'_>,
    ) -> Result<Observation, AgentError> {
        match self {
            CallableUnit::Worker(worker) => {
                let Some(query) = args.get("query").and_then(|q| q.as_str()) else {
                    return Ok(Observation::error(format!(
                        "Error: {} requires a string 'query' argument.",
                        self.name()
                    )));
                };
                worker
                    .step(query, ctx.history, ctx.credentials, ctx.cancel)
                    .await
            }
            CallableUnit::Tool(def) => ctx
                .tools
                .execute(&def.name, args.clone(), ctx.cancel)
                .await
                .map(Observation::ok),
        }
    }
}
