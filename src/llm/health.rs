//! Provider 健康跟踪（熔断器）
//!
//! 每个 Provider 一条 ProviderRecord，状态机：
//! - Active --瞬时失败--> Down --冷却结束后探测成功--> Active
//! - Active/Down --额度耗尽--> QuotaExhausted --重置窗口结束或显式 reset--> 可再次探测
//!
//! 只做簿记，不做 I/O。记录集合在构造时固定，每条记录一把锁：状态转换在该锁内完成读改写，
//! 不同 Provider 之间互不阻塞。状态变化通过 tracing 审计日志与可选的无界通道对外可见。

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

/// 瞬时故障默认冷却时间
pub const DEFAULT_COOL_DOWN: Duration = Duration::from_secs(60);
/// 额度耗尽默认重置窗口（24 小时）
pub const DEFAULT_QUOTA_RESET: Duration = Duration::from_secs(24 * 60 * 60);

/// Provider 健康状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Active,
    Down,
    QuotaExhausted,
}

/// 失败类型
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    Transient,
    Quota,
}

/// 冷却策略（可按 Provider 单独配置）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HealthPolicy {
    pub cool_down: Duration,
    pub quota_reset: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            cool_down: DEFAULT_COOL_DOWN,
            quota_reset: DEFAULT_QUOTA_RESET,
        }
    }
}

/// 单个 Provider 的健康记录
#[derive(Clone, Debug)]
pub struct ProviderRecord {
    pub id: String,
    pub state: HealthState,
    pub last_failure: Option<Instant>,
    pub consecutive_failures: u32,
    pub policy: HealthPolicy,
}

impl ProviderRecord {
    fn new(id: String, policy: HealthPolicy) -> Self {
        Self {
            id,
            state: HealthState::Active,
            last_failure: None,
            consecutive_failures: 0,
            policy,
        }
    }

    /// Down 在冷却结束后允许一次探测；QuotaExhausted 在重置窗口结束前一律不可用
    pub fn is_eligible(&self, now: Instant) -> bool {
        let elapsed = |window: Duration| match self.last_failure {
            Some(at) => now.saturating_duration_since(at) >= window,
            None => true,
        };
        match self.state {
            HealthState::Active => true,
            HealthState::Down => elapsed(self.policy.cool_down),
            HealthState::QuotaExhausted => elapsed(self.policy.quota_reset),
        }
    }
}

/// 一次状态转换（审计用）
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthTransition {
    pub provider: String,
    pub from: HealthState,
    pub to: HealthState,
    pub at: DateTime<Utc>,
}

/// 进程级 Provider 健康表；显式构造并注入（Arc），测试可各自持有独立实例
pub struct ProviderHealthTracker {
    order: Vec<String>,
    records: HashMap<String, Mutex<ProviderRecord>>,
    observer: Option<UnboundedSender<HealthTransition>>,
}

fn lock(record: &Mutex<ProviderRecord>) -> MutexGuard<'_, ProviderRecord> {
    record.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ProviderHealthTracker {
    /// 所有 Provider 使用同一策略；顺序即优先级顺序
    pub fn new<I, S>(providers: I, policy: HealthPolicy) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_policies(providers.into_iter().map(|id| (id.into(), policy)))
    }

    pub fn with_policies(providers: impl IntoIterator<Item = (String, HealthPolicy)>) -> Self {
        let mut order = Vec::new();
        let mut records = HashMap::new();
        for (id, policy) in providers {
            if records.contains_key(&id) {
                tracing::warn!(provider = %id, "duplicate provider id ignored");
                continue;
            }
            order.push(id.clone());
            records.insert(id.clone(), Mutex::new(ProviderRecord::new(id, policy)));
        }
        Self {
            order,
            records,
            observer: None,
        }
    }

    /// 订阅状态转换；发送不阻塞，接收端关闭后静默丢弃
    pub fn with_observer(mut self, tx: UnboundedSender<HealthTransition>) -> Self {
        self.observer = Some(tx);
        self
    }

    pub fn provider_ids(&self) -> &[String] {
        &self.order
    }

    pub fn contains(&self, provider: &str) -> bool {
        self.records.contains_key(provider)
    }

    /// 未知 Provider 永远不可用
    pub fn is_eligible(&self, provider: &str, now: Instant) -> bool {
        self.records
            .get(provider)
            .map(|r| lock(r).is_eligible(now))
            .unwrap_or(false)
    }

    pub fn state(&self, provider: &str) -> Option<HealthState> {
        self.records.get(provider).map(|r| lock(r).state)
    }

    pub fn record(&self, provider: &str) -> Option<ProviderRecord> {
        self.records.get(provider).map(|r| lock(r).clone())
    }

    /// 按优先级顺序返回所有记录的副本
    pub fn snapshot(&self) -> Vec<ProviderRecord> {
        self.order
            .iter()
            .filter_map(|id| self.record(id))
            .collect()
    }

    /// 记录一次失败；返回状态发生变化时的转换（Down 再次失败只刷新时间戳）
    pub fn report_failure(
        &self,
        provider: &str,
        kind: FailureKind,
        now: Instant,
    ) -> Option<HealthTransition> {
        let record = self.records.get(provider)?;
        let transition = {
            let mut r = lock(record);
            let from = r.state;
            r.state = match kind {
                FailureKind::Transient => HealthState::Down,
                FailureKind::Quota => HealthState::QuotaExhausted,
            };
            r.last_failure = Some(now);
            r.consecutive_failures = r.consecutive_failures.saturating_add(1);
            tracing::debug!(
                provider,
                failures = r.consecutive_failures,
                ?kind,
                "provider failure recorded"
            );
            Self::transition(provider, from, r.state)
        };
        self.emit(transition)
    }

    /// 记录一次成功：回到 Active 并清空失败信息
    pub fn report_success(&self, provider: &str) -> Option<HealthTransition> {
        self.restore(provider)
    }

    /// 显式重置（如额度在外部充值后）
    pub fn reset(&self, provider: &str) -> Option<HealthTransition> {
        self.restore(provider)
    }

    fn restore(&self, provider: &str) -> Option<HealthTransition> {
        let record = self.records.get(provider)?;
        let transition = {
            let mut r = lock(record);
            let from = r.state;
            r.state = HealthState::Active;
            r.last_failure = None;
            r.consecutive_failures = 0;
            Self::transition(provider, from, HealthState::Active)
        };
        self.emit(transition)
    }

    fn transition(provider: &str, from: HealthState, to: HealthState) -> Option<HealthTransition> {
        (from != to).then(|| HealthTransition {
            provider: provider.to_string(),
            from,
            to,
            at: Utc::now(),
        })
    }

    fn emit(&self, transition: Option<HealthTransition>) -> Option<HealthTransition> {
        let t = transition?;
        let audit = serde_json::json!({
            "event": "provider_transition",
            "provider": t.provider,
            "from": t.from,
            "to": t.to,
            "at": t.at.to_rfc3339(),
        });
        match t.to {
            HealthState::Active => tracing::info!(audit = %audit, "provider"),
            _ => tracing::warn!(audit = %audit, "provider"),
        }
        if let Some(tx) = &self.observer {
            let _ = tx.send(t.clone());
        }
        Some(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ProviderHealthTracker {
        ProviderHealthTracker::new(
            ["groq", "gemini"],
            HealthPolicy {
                cool_down: Duration::from_secs(60),
                quota_reset: Duration::from_secs(3600),
            },
        )
    }

    #[test]
    fn test_initially_active() {
        let t = tracker();
        let now = Instant::now();
        assert!(t.is_eligible("groq", now));
        assert_eq!(t.state("groq"), Some(HealthState::Active));
        assert!(!t.is_eligible("unknown", now));
    }

    #[test]
    fn test_transient_failure_until_cool_down() {
        let t = tracker();
        let start = Instant::now();
        for i in 0..3u64 {
            let at = start + Duration::from_secs(i);
            t.report_failure("groq", FailureKind::Transient, at);
            assert!(!t.is_eligible("groq", at), "failure {} must be ineligible", i + 1);
        }
        let last = start + Duration::from_secs(2);
        assert!(!t.is_eligible("groq", last + Duration::from_secs(59)));
        assert!(t.is_eligible("groq", last + Duration::from_secs(60)));
        // 探测资格不改变状态，直到 report_success
        assert_eq!(t.state("groq"), Some(HealthState::Down));
        assert_eq!(t.record("groq").unwrap().consecutive_failures, 3);
    }

    #[test]
    fn test_success_restores_active() {
        let t = tracker();
        let now = Instant::now();
        t.report_failure("groq", FailureKind::Transient, now);
        let tr = t.report_success("groq").expect("transition");
        assert_eq!(tr.from, HealthState::Down);
        assert_eq!(tr.to, HealthState::Active);
        let r = t.record("groq").unwrap();
        assert!(r.last_failure.is_none());
        assert_eq!(r.consecutive_failures, 0);
        assert!(t.report_success("groq").is_none());
    }

    #[test]
    fn test_quota_ignores_cool_down_until_reset() {
        let t = tracker();
        let now = Instant::now();
        t.report_failure("gemini", FailureKind::Quota, now);
        assert_eq!(t.state("gemini"), Some(HealthState::QuotaExhausted));
        assert!(!t.is_eligible("gemini", now + Duration::from_secs(61)));
        assert!(!t.is_eligible("gemini", now + Duration::from_secs(3599)));
        assert!(t.is_eligible("gemini", now + Duration::from_secs(3600)));

        t.report_failure("gemini", FailureKind::Quota, now);
        t.reset("gemini");
        assert!(t.is_eligible("gemini", now));
    }

    #[test]
    fn test_repeated_failure_reports_single_transition() {
        let t = tracker();
        let now = Instant::now();
        assert!(t.report_failure("groq", FailureKind::Transient, now).is_some());
        assert!(t.report_failure("groq", FailureKind::Transient, now).is_none());
        let tr = t.report_failure("groq", FailureKind::Quota, now).unwrap();
        assert_eq!(tr.from, HealthState::Down);
        assert_eq!(tr.to, HealthState::QuotaExhausted);
    }

    #[test]
    fn test_observer_receives_transitions() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let t = tracker().with_observer(tx);
        t.report_failure("groq", FailureKind::Transient, Instant::now());
        t.report_success("groq");
        assert_eq!(rx.try_recv().unwrap().to, HealthState::Down);
        assert_eq!(rx.try_recv().unwrap().to, HealthState::Active);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_snapshot_keeps_priority_order() {
        let t = tracker();
        let ids: Vec<_> = t.snapshot().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["groq", "gemini"]);
    }

    #[test]
    fn test_concurrent_updates_do_not_corrupt() {
        use std::sync::Arc;
        let t = Arc::new(tracker());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let t = Arc::clone(&t);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        t.report_failure("groq", FailureKind::Transient, Instant::now());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let r = t.record("groq").unwrap();
        assert_eq!(r.consecutive_failures, 800);
        assert_eq!(r.state, HealthState::Down);
        assert_eq!(t.state("gemini"), Some(HealthState::Active));
    }
}
