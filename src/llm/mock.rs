//! Mock LLM 客户端（用于测试与离线运行，无需 API）
//!
//! - EchoLlmClient：回显最后一条 User 消息作为最终回答
//! - ScriptedLlmClient：按脚本依次返回回复或失败，并记录每次调用收到的消息与凭据

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{Credential, LlmClient, ProviderError};
use crate::memory::{Message, Role};

/// 回显客户端：取最后一条 User 消息原样作为回答
#[derive(Debug, Default)]
pub struct EchoLlmClient;

#[async_trait]
impl LlmClient for EchoLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        _credential: Option<&Credential>,
    ) -> Result<String, ProviderError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(format!("Echo from Mock: {}", last_user))
    }
}

/// 脚本化客户端：脚本耗尽后若设置了 repeat 则一直返回它，否则返回瞬时失败
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    repeat: Option<Result<String, ProviderError>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<Vec<Message>>>,
    credentials: Mutex<Vec<Option<String>>>,
}

impl ScriptedLlmClient {
    pub fn new(script: impl IntoIterator<Item = Result<String, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    /// 按顺序返回这些文本回复
    pub fn replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(replies.into_iter().map(|r| Ok(r.into())))
    }

    /// 每次都返回同一结果
    pub fn always(result: Result<String, ProviderError>) -> Self {
        Self {
            repeat: Some(result),
            ..Self::default()
        }
    }

    /// 脚本耗尽后一直返回 result
    pub fn then_always(mut self, result: Result<String, ProviderError>) -> Self {
        self.repeat = Some(result);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 每次调用收到的完整消息列表
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// 每次调用收到的凭据明文（仅测试断言用）
    pub fn seen_credentials(&self) -> Vec<Option<String>> {
        self.credentials.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        credential: Option<&Credential>,
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut r) = self.requests.lock() {
            r.push(messages.to_vec());
        }
        if let Ok(mut c) = self.credentials.lock() {
            c.push(credential.map(|k| k.expose().to_string()));
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(result) => result,
            None => self
                .repeat
                .clone()
                .unwrap_or_else(|| Err(ProviderError::Transient("script exhausted".to_string()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_last_user_message() {
        let client = EchoLlmClient;
        let out = client
            .complete(
                &[
                    Message::user("first"),
                    Message::assistant("x"),
                    Message::user("second"),
                ],
                None,
            )
            .await
            .unwrap();
        assert_eq!(out, "Echo from Mock: second");
    }

    #[tokio::test]
    async fn test_scripted_replays_in_order() {
        let client = ScriptedLlmClient::new(vec![
            Err(ProviderError::Transient("503".to_string())),
            Ok("done".to_string()),
        ]);
        assert!(client.complete(&[], None).await.is_err());
        assert_eq!(client.complete(&[], None).await.unwrap(), "done");
        assert!(client.complete(&[], None).await.is_err());
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn test_scripted_records_credentials() {
        let client = ScriptedLlmClient::always(Ok("ok".to_string()));
        let key = Credential::new("k1");
        client.complete(&[Message::user("q")], Some(&key)).await.unwrap();
        client.complete(&[Message::user("q")], None).await.unwrap();
        assert_eq!(client.seen_credentials(), vec![Some("k1".to_string()), None]);
        assert_eq!(client.requests()[0], vec![Message::user("q")]);
    }
}
