//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient::complete；失败统一归类为 ProviderError，供熔断器使用。

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::health::FailureKind;
use crate::llm::Credential;
use crate::memory::Message;

/// Provider 调用失败（仅在 ProviderPool 内部流转，不直接暴露给调用方）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// 限流、5xx、超时、空回复等，可在冷却后重试
    #[error("Provider transient failure: {0}")]
    Transient(String),

    /// 额度耗尽，需要重置窗口或外部重置
    #[error("Provider quota exhausted: {0}")]
    QuotaExhausted(String),
}

impl ProviderError {
    /// 根据错误文本归类：含 quota / resource_exhausted / insufficient_quota 为额度耗尽，其余视为瞬时故障
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("quota")
            || lower.contains("resource_exhausted")
            || lower.contains("insufficient_quota")
        {
            ProviderError::QuotaExhausted(message)
        } else {
            ProviderError::Transient(message)
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ProviderError::Transient(_) => FailureKind::Transient,
            ProviderError::QuotaExhausted(_) => FailureKind::Quota,
        }
    }
}

/// LLM 客户端 trait：非流式完成，凭据按调用传入
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[Message],
        credential: Option<&Credential>,
    ) -> Result<String, ProviderError>;
}
