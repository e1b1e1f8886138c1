//! Provider 池：按固定优先级选择健康 Provider，失败时自动切换（故障转移）
//!
//! 每次 execute 最多尝试 max_attempts 个不同的 Provider（默认等于 Provider 数）；
//! 凭据缺失不算 Provider 故障，立即返回 NeedsCredential，不修改健康状态。

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::llm::{Credential, Credentials, LlmClient, ProviderHealthTracker, ProviderSpec};
use crate::memory::Message;

/// 单次 Provider 调用默认超时
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("No provider available")]
    NoProviderAvailable,

    #[error("Missing credential for provider '{provider}'")]
    NeedsCredential { provider: String },

    #[error("All providers unavailable (attempted: {attempted:?})")]
    AllProvidersUnavailable { attempted: Vec<String> },

    #[error("Cancelled")]
    Cancelled,
}

/// 成功完成的一次调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolCompletion {
    pub provider: String,
    pub content: String,
    /// 本次 execute 实际调用过的 Provider 数（含成功的那个）
    pub attempts: usize,
}

struct PoolEntry {
    spec: ProviderSpec,
    client: Arc<dyn LlmClient>,
}

/// Provider 池：Provider 列表（优先级顺序）+ 共享的健康表
pub struct ProviderPool {
    entries: Vec<PoolEntry>,
    health: Arc<ProviderHealthTracker>,
    max_attempts: Option<usize>,
    request_timeout: Duration,
}

impl ProviderPool {
    pub fn new(health: Arc<ProviderHealthTracker>) -> Self {
        Self {
            entries: Vec::new(),
            health,
            max_attempts: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// 追加 Provider（追加顺序即优先级）；健康表中没有的 Provider 永远不会被选中
    pub fn add_provider(&mut self, spec: ProviderSpec, client: Arc<dyn LlmClient>) {
        if !self.health.contains(&spec.id) {
            tracing::warn!(
                provider = %spec.id,
                "provider not tracked by health tracker; it will never be selected"
            );
        }
        self.entries.push(PoolEntry { spec, client });
    }

    pub fn with_provider(mut self, spec: ProviderSpec, client: Arc<dyn LlmClient>) -> Self {
        self.add_provider(spec, client);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = Some(max_attempts.max(1));
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn health(&self) -> &Arc<ProviderHealthTracker> {
        &self.health
    }

    pub fn provider_ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.spec.id.clone()).collect()
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts.unwrap_or(self.entries.len())
    }

    /// 按优先级返回第一个可用的 Provider
    pub fn acquire(&self, now: Instant) -> Result<&ProviderSpec, PoolError> {
        self.next_eligible(now, &[])
            .map(|e| &e.spec)
            .ok_or(PoolError::NoProviderAvailable)
    }

    fn next_eligible(&self, now: Instant, tried: &[String]) -> Option<&PoolEntry> {
        self.entries
            .iter()
            .filter(|e| !tried.contains(&e.spec.id))
            .find(|e| self.health.is_eligible(&e.spec.id, now))
    }

    /// 请求凭据优先，其次服务端默认 Key
    fn resolve_credential<'a>(
        spec: &'a ProviderSpec,
        credentials: &'a Credentials,
    ) -> Result<Option<&'a Credential>, PoolError> {
        match credentials.get(&spec.id).or(spec.server_key.as_ref()) {
            Some(key) => Ok(Some(key)),
            None if spec.requires_credential => Err(PoolError::NeedsCredential {
                provider: spec.id.clone(),
            }),
            None => Ok(None),
        }
    }

    /// 调用一个健康 Provider；瞬时失败或额度耗尽时上报健康表并切换到下一个
    pub async fn execute(
        &self,
        messages: &[Message],
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> Result<PoolCompletion, PoolError> {
        let max_attempts = self.max_attempts();
        let mut attempted: Vec<String> = Vec::new();

        while attempted.len() < max_attempts {
            if cancel.is_cancelled() {
                return Err(PoolError::Cancelled);
            }
            let Some(entry) = self.next_eligible(Instant::now(), &attempted) else {
                break;
            };
            let id = entry.spec.id.clone();
            let credential = Self::resolve_credential(&entry.spec, credentials)?;
            attempted.push(id.clone());

            tracing::info!(
                provider = %id,
                attempt = attempted.len(),
                "routing request via provider"
            );
            let call = tokio::time::timeout(
                self.request_timeout,
                entry.client.complete(messages, credential),
            );
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PoolError::Cancelled),
                r = call => r,
            };

            match outcome {
                Ok(Ok(content)) => {
                    self.health.report_success(&id);
                    return Ok(PoolCompletion {
                        provider: id,
                        content,
                        attempts: attempted.len(),
                    });
                }
                Ok(Err(e)) => {
                    tracing::warn!(provider = %id, error = %e, "provider failed, switching");
                    self.health.report_failure(&id, e.failure_kind(), Instant::now());
                }
                Err(_) => {
                    tracing::warn!(
                        provider = %id,
                        timeout_secs = self.request_timeout.as_secs(),
                        "provider timed out, switching"
                    );
                    self.health.report_failure(
                        &id,
                        crate::llm::FailureKind::Transient,
                        Instant::now(),
                    );
                }
            }
        }

        tracing::error!(?attempted, "all providers are down or exhausted");
        Err(PoolError::AllProvidersUnavailable { attempted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{
        FailureKind, HealthPolicy, HealthState, ProviderError, ProviderKind, ScriptedLlmClient,
    };

    fn health(ids: &[&str]) -> Arc<ProviderHealthTracker> {
        Arc::new(ProviderHealthTracker::new(
            ids.iter().copied(),
            HealthPolicy::default(),
        ))
    }

    fn spec(id: &str) -> ProviderSpec {
        ProviderSpec::new(id, ProviderKind::Groq)
    }

    fn creds() -> Credentials {
        Credentials::new().with("a", "ka").with("b", "kb")
    }

    #[test]
    fn test_acquire_skips_down_provider() {
        let h = health(&["a", "b"]);
        let pool = ProviderPool::new(h.clone())
            .with_provider(spec("a"), Arc::new(ScriptedLlmClient::default()))
            .with_provider(spec("b"), Arc::new(ScriptedLlmClient::default()));
        let now = Instant::now();
        assert_eq!(pool.acquire(now).unwrap().id, "a");

        h.report_failure("a", FailureKind::Transient, now);
        assert_eq!(pool.acquire(now).unwrap().id, "b");

        h.report_failure("b", FailureKind::Quota, now);
        assert_eq!(pool.acquire(now).unwrap_err(), PoolError::NoProviderAvailable);
    }

    #[tokio::test]
    async fn test_execute_fails_over_on_transient_error() {
        let h = health(&["a", "b"]);
        let a = Arc::new(ScriptedLlmClient::always(Err(ProviderError::Transient(
            "503".into(),
        ))));
        let b = Arc::new(ScriptedLlmClient::always(Ok("from b".into())));
        let pool = ProviderPool::new(h.clone())
            .with_provider(spec("a"), a.clone())
            .with_provider(spec("b"), b.clone());

        let out = pool
            .execute(&[Message::user("hi")], &creds(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.provider, "b");
        assert_eq!(out.content, "from b");
        assert_eq!(out.attempts, 2);
        assert_eq!(h.state("a"), Some(HealthState::Down));
        assert_eq!(a.seen_credentials(), vec![Some("ka".to_string())]);
        assert_eq!(b.seen_credentials(), vec![Some("kb".to_string())]);
    }

    #[tokio::test]
    async fn test_quota_failure_marks_exhausted() {
        let h = health(&["a", "b"]);
        let pool = ProviderPool::new(h.clone())
            .with_provider(
                spec("a"),
                Arc::new(ScriptedLlmClient::always(Err(
                    ProviderError::QuotaExhausted("quota".into()),
                ))),
            )
            .with_provider(spec("b"), Arc::new(ScriptedLlmClient::always(Ok("ok".into()))));
        pool.execute(&[], &creds(), &CancellationToken::new()).await.unwrap();
        assert_eq!(h.state("a"), Some(HealthState::QuotaExhausted));
    }

    #[tokio::test]
    async fn test_execute_exhausts_all_providers() {
        let h = health(&["a", "b"]);
        let failing = || {
            Arc::new(ScriptedLlmClient::always(Err(ProviderError::Transient(
                "down".into(),
            ))))
        };
        let pool = ProviderPool::new(h.clone())
            .with_provider(spec("a"), failing())
            .with_provider(spec("b"), failing());
        let err = pool
            .execute(&[], &creds(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PoolError::AllProvidersUnavailable {
                attempted: vec!["a".to_string(), "b".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn test_max_attempts_bounds_failover() {
        let h = health(&["a", "b", "c"]);
        let failing = || {
            Arc::new(ScriptedLlmClient::always(Err(ProviderError::Transient(
                "down".into(),
            ))))
        };
        let c = failing();
        let pool = ProviderPool::new(h.clone())
            .with_provider(spec("a"), failing())
            .with_provider(spec("b"), failing())
            .with_provider(spec("c").with_server_key(Some(Credential::new("kc"))), c.clone())
            .with_max_attempts(2);
        assert_eq!(pool.max_attempts(), 2);

        let err = pool
            .execute(&[], &creds(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PoolError::AllProvidersUnavailable {
                attempted: vec!["a".to_string(), "b".to_string()]
            }
        );
        assert_eq!(c.calls(), 0);
        assert_eq!(h.state("c"), Some(HealthState::Active));
    }

    #[tokio::test]
    async fn test_zero_cool_down_does_not_retry_same_provider() {
        let h = Arc::new(ProviderHealthTracker::new(
            ["a"],
            HealthPolicy {
                cool_down: Duration::ZERO,
                quota_reset: Duration::ZERO,
            },
        ));
        let a = Arc::new(ScriptedLlmClient::always(Err(ProviderError::Transient(
            "x".into(),
        ))));
        let pool = ProviderPool::new(h)
            .with_provider(spec("a"), a.clone())
            .with_max_attempts(5);
        assert!(pool.execute(&[], &creds(), &CancellationToken::new()).await.is_err());
        assert_eq!(a.calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_credential_does_not_touch_health() {
        let h = health(&["a", "b"]);
        let a = Arc::new(ScriptedLlmClient::always(Ok("x".into())));
        let pool = ProviderPool::new(h.clone())
            .with_provider(spec("a"), a.clone())
            .with_provider(spec("b"), Arc::new(ScriptedLlmClient::always(Ok("y".into()))));
        let err = pool
            .execute(&[], &Credentials::new().with("b", "kb"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PoolError::NeedsCredential {
                provider: "a".to_string()
            }
        );
        assert_eq!(a.calls(), 0);
        assert_eq!(h.state("a"), Some(HealthState::Active));
    }

    #[tokio::test]
    async fn test_server_key_used_when_request_has_none() {
        let h = health(&["a"]);
        let a = Arc::new(ScriptedLlmClient::always(Ok("x".into())));
        let pool = ProviderPool::new(h).with_provider(
            spec("a").with_server_key(Some(Credential::new("server"))),
            a.clone(),
        );
        pool.execute(&[], &Credentials::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(a.seen_credentials(), vec![Some("server".to_string())]);
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let h = health(&["a"]);
        let a = Arc::new(ScriptedLlmClient::always(Ok("x".into())));
        let pool = ProviderPool::new(h).with_provider(spec("a"), a.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(
            pool.execute(&[], &creds(), &cancel).await.unwrap_err(),
            PoolError::Cancelled
        );
        assert_eq!(a.calls(), 0);
    }
}
