//! Provider 种类（封闭枚举）与客户端构造
//!
//! 所有在线 Provider 都提供 OpenAI 兼容接口，差异只在 base_url / 默认模型 / Key 环境变量。
//! 优先级顺序由配置中的列表顺序决定，不支持运行时注册。

use std::sync::Arc;

use serde::Deserialize;

use crate::llm::{Credential, EchoLlmClient, LlmClient, OpenAiClient};

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

/// 支持的 Provider 种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Groq,
    Gemini,
    DeepSeek,
    OpenAi,
    /// 离线回显（不需要凭据）
    Mock,
}

impl ProviderKind {
    pub fn default_base_url(self) -> Option<&'static str> {
        match self {
            ProviderKind::Groq => Some(GROQ_BASE_URL),
            ProviderKind::Gemini => Some(GEMINI_BASE_URL),
            ProviderKind::DeepSeek => Some(DEEPSEEK_BASE_URL),
            ProviderKind::OpenAi | ProviderKind::Mock => None,
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::Groq => "llama-3.1-8b-instant",
            ProviderKind::Gemini => "gemini-2.0-flash",
            ProviderKind::DeepSeek => "deepseek-chat",
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::Mock => "mock",
        }
    }

    /// 服务端默认 Key 的环境变量名
    pub fn default_api_key_env(self) -> Option<&'static str> {
        match self {
            ProviderKind::Groq => Some("GROQ_API_KEY"),
            ProviderKind::Gemini => Some("GEMINI_API_KEY"),
            ProviderKind::DeepSeek => Some("DEEPSEEK_API_KEY"),
            ProviderKind::OpenAi => Some("OPENAI_API_KEY"),
            ProviderKind::Mock => None,
        }
    }

    pub fn requires_credential(self) -> bool {
        !matches!(self, ProviderKind::Mock)
    }
}

/// Pool 中一个 Provider 的静态描述
#[derive(Debug, Clone)]
pub struct ProviderSpec {
    pub id: String,
    pub kind: ProviderKind,
    pub requires_credential: bool,
    /// 服务端配置的默认 Key；请求自带的凭据优先
    pub server_key: Option<Credential>,
}

impl ProviderSpec {
    pub fn new(id: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            id: id.into(),
            kind,
            requires_credential: kind.requires_credential(),
            server_key: None,
        }
    }

    pub fn with_server_key(mut self, key: Option<Credential>) -> Self {
        self.server_key = key;
        self
    }

    pub fn with_requires_credential(mut self, required: bool) -> Self {
        self.requires_credential = required;
        self
    }
}

/// 按种类构造客户端；model / base_url 为空时使用默认值
pub fn create_client(
    kind: ProviderKind,
    model: Option<&str>,
    base_url: Option<&str>,
) -> Arc<dyn LlmClient> {
    match kind {
        ProviderKind::Mock => Arc::new(EchoLlmClient),
        _ => {
            let model = model.unwrap_or_else(|| kind.default_model());
            let base_url = base_url.or_else(|| kind.default_base_url());
            Arc::new(OpenAiClient::new(base_url, model))
        }
    }
}
