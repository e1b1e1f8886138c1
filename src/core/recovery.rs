//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction，供协调循环决定是写回观察继续、交还调用方还是终止。

use crate::core::{AgentError, RecoveryAction};

/// 语义化错误恢复：工具 / Worker 的失败吸收为观察，凭据缺失交还调用方，其余终止
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    /// `source` 为出错的 Worker 或工具名，用于生成观察文本
    pub fn handle(&self, err: &AgentError, source: &str) -> RecoveryAction {
        match err {
            AgentError::ToolExecutionFailed(msg) => {
                RecoveryAction::Observe(format!("Error from {source}: {msg}"))
            }
            AgentError::ToolTimeout(_) => {
                RecoveryAction::Observe(format!("Error from {source}: timed out"))
            }
            AgentError::UnknownTool(name) => {
                RecoveryAction::Observe(format!("Error: Agent or tool '{name}' does not exist."))
            }
            AgentError::JsonParseError(raw) => RecoveryAction::Observe(format!(
                "Error: the previous output was not a valid tool call ({raw}). \
                 Reply with plain text for a final answer, or exactly one JSON object \
                 {{\"tool\": \"<name>\", \"args\": {{...}}}}."
            )),
            AgentError::NeedsCredential { provider } => RecoveryAction::AskUser(format!(
                "Provider '{provider}' needs a credential; supply it and resubmit the query."
            )),
            _ => RecoveryAction::Abort,
        }
    }
}
