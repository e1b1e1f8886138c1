//! Agent 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 AgentError 决定 Observe（写回观察继续推理）/ AskUser（可恢复，交还调用方）/ Abort。

use thiserror::Error;

use crate::llm::PoolError;

/// 协调循环中可能出现的错误
///
/// 分三类：可恢复（NeedsCredential）、终止（AllProvidersUnavailable / IterationCapExceeded / Cancelled），
/// 以及在 Worker / Tool 内部被吸收为文本观察的软错误（ToolExecutionFailed 等）。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    /// 选中的 Provider 缺少本次请求的凭据；Provider 本身可能是健康的
    #[error("Missing credential for provider '{provider}'")]
    NeedsCredential { provider: String },

    #[error("All providers unavailable (attempted: {attempted:?})")]
    AllProvidersUnavailable { attempted: Vec<String> },

    #[error("Iteration cap exceeded after {iterations} delegation rounds")]
    IterationCapExceeded { iterations: usize },

    #[error("Cancelled")]
    Cancelled,

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Invalid agent spec: {0}")]
    InvalidSpec(String),
}

impl AgentError {
    /// 调用方补充凭据后可用同一 Query 重新提交
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AgentError::NeedsCredential { .. })
    }

    /// 对当前 Query 而言是终止性错误（不会被协调循环吸收）
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentError::AllProvidersUnavailable { .. }
                | AgentError::IterationCapExceeded { .. }
                | AgentError::Cancelled
        )
    }
}

impl From<PoolError> for AgentError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::NeedsCredential { provider } => AgentError::NeedsCredential { provider },
            PoolError::AllProvidersUnavailable { attempted } => {
                AgentError::AllProvidersUnavailable { attempted }
            }
            PoolError::NoProviderAvailable => AgentError::AllProvidersUnavailable {
                attempted: Vec::new(),
            },
            PoolError::Cancelled => AgentError::Cancelled,
        }
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 转为文本观察写回记忆，让协调者在下一轮修正
    Observe(String),
    /// 交还调用方决策（如补充凭据后重新提交）
    AskUser(String),
    /// 终止当前 Query
    Abort,
}
