//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；Groq、Gemini、DeepSeek、OpenAI 共用此实现。
//! API Key 按调用传入，每次调用用该 Key 构造 Client，避免跨请求共享凭据。

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::{Credential, LlmClient, ProviderError};
use crate::memory::{Message, Role};

/// OpenAI 兼容客户端：持有 base_url 与 model 名，complete 时转 Message 为 API 格式并取首条 content
pub struct OpenAiClient {
    base_url: Option<String>,
    model: String,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str) -> Self {
        Self {
            base_url: base_url.map(String::from),
            model: model.to_string(),
            temperature: 0.1,
        }
    }

    fn client_for(&self, credential: Option<&Credential>) -> Client<OpenAIConfig> {
        let mut config = OpenAIConfig::new();
        if let Some(url) = &self.base_url {
            config = config.with_api_base(url);
        }
        if let Some(key) = credential {
            config = config.with_api_key(key.expose());
        }
        Client::with_config(config)
    }

    /// Tool 观察没有独立的 API 角色（不走 function calling），以 user 消息形式回灌
    fn to_openai_messages(
        messages: &[Message],
    ) -> Result<Vec<ChatCompletionRequestMessage>, ProviderError> {
        let build_err = |e: async_openai::error::OpenAIError| {
            ProviderError::Transient(format!("request build failed: {e}"))
        };
        messages
            .iter()
            .map(|m| {
                Ok(match m.role {
                    Role::System => ChatCompletionRequestMessage::System(
                        ChatCompletionRequestSystemMessageArgs::default()
                            .content(m.content.clone())
                            .build()
                            .map_err(build_err)?,
                    ),
                    Role::User => ChatCompletionRequestMessage::User(
                        ChatCompletionRequestUserMessageArgs::default()
                            .content(m.content.clone())
                            .build()
                            .map_err(build_err)?,
                    ),
                    Role::Tool => ChatCompletionRequestMessage::User(
                        ChatCompletionRequestUserMessageArgs::default()
                            .content(format!("Observation:\n{}", m.content))
                            .build()
                            .map_err(build_err)?,
                    ),
                    Role::Assistant => ChatCompletionRequestMessage::Assistant(
                        ChatCompletionRequestAssistantMessageArgs::default()
                            .content(m.content.clone())
                            .build()
                            .map_err(build_err)?,
                    ),
                })
            })
            .collect()
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(
        &self,
        messages: &[Message],
        credential: Option<&Credential>,
    ) -> Result<String, ProviderError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(self.temperature)
            .messages(Self::to_openai_messages(messages)?)
            .build()
            .map_err(|e| ProviderError::Transient(format!("request build failed: {e}")))?;

        let response = self
            .client_for(credential)
            .chat()
            .create(request)
            .await
            .map_err(|e| ProviderError::classify(e.to_string()))?;

        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ProviderError::Transient(format!("{}: empty completion", self.model)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_role_maps_to_user_message() {
        let msgs = vec![
            Message::system("sys"),
            Message::user("q"),
            Message::tool("ACME=193.40"),
            Message::assistant("a"),
        ];
        let mapped = OpenAiClient::to_openai_messages(&msgs).unwrap();
        assert_eq!(mapped.len(), 4);
        assert!(matches!(mapped[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(mapped[2], ChatCompletionRequestMessage::User(_)));
        assert!(matches!(mapped[3], ChatCompletionRequestMessage::Assistant(_)));
    }
}
