//! 短期记忆：按 token 预算裁剪的对话日志
//!
//! 插入时计算一次 token 成本；超出预算时从最旧的条目开始逐出（FIFO），最新条目永不逐出。

use std::collections::vec_deque;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::token_budget::{TokenCounter, TokenEstimator};

/// 默认 token 预算
pub const DEFAULT_BUDGET_TOKENS: usize = 4096;

/// 消息角色（与 LLM API 一致；Tool 为工具 / Worker 的观察）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// 单条消息（发给 Provider 的上下文）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
        }
    }
}

/// 记忆条目：token 数在插入时计算并缓存
#[derive(Clone, Debug, Serialize)]
pub struct ConversationEntry {
    pub role: Role,
    pub content: String,
    pub tokens: usize,
    pub created_at: DateTime<Utc>,
}

impl ConversationEntry {
    pub fn to_message(&self) -> Message {
        Message {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// 单次 append 的结果
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AppendOutcome {
    /// 本次逐出的旧条目数
    pub evicted: usize,
    /// 新条目单独超出预算（退化情况）
    pub over_budget: bool,
}

/// 有界对话记忆
///
/// 不变量：任何变更后 `total_tokens() <= budget()`，唯一例外是最后一条单独超出预算的条目，
/// 此时 `is_over_budget()` 为 true，且下一次 append 会将其逐出。
#[derive(Clone)]
pub struct BoundedMemory {
    entries: VecDeque<ConversationEntry>,
    total_tokens: usize,
    budget: usize,
    counter: Arc<dyn TokenCounter>,
}

impl fmt::Debug for BoundedMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedMemory")
            .field("len", &self.entries.len())
            .field("total_tokens", &self.total_tokens)
            .field("budget", &self.budget)
            .finish()
    }
}

impl Default for BoundedMemory {
    fn default() -> Self {
        Self::new(DEFAULT_BUDGET_TOKENS)
    }
}

impl BoundedMemory {
    pub fn new(budget: usize) -> Self {
        Self::with_counter(budget, Arc::new(TokenEstimator))
    }

    pub fn with_counter(budget: usize, counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            entries: VecDeque::new(),
            total_tokens: 0,
            budget,
            counter,
        }
    }

    /// 插入一条消息；先按 FIFO 逐出直到能放下，再写入
    pub fn append(&mut self, role: Role, content: impl Into<String>) -> AppendOutcome {
        let content = content.into();
        let cost = self.counter.count(&content);

        let mut evicted = 0;
        while self.total_tokens + cost > self.budget {
            let Some(oldest) = self.entries.pop_front() else {
                break;
            };
            self.total_tokens -= oldest.tokens;
            evicted += 1;
            tracing::info!(
                role = ?oldest.role,
                tokens = oldest.tokens,
                chars = oldest.content.len(),
                "memory full, evicted oldest entry"
            );
        }

        let over_budget = cost > self.budget;
        if over_budget {
            tracing::warn!(
                tokens = cost,
                budget = self.budget,
                "single entry exceeds memory budget; kept as the only entry"
            );
        }

        self.entries.push_back(ConversationEntry {
            role,
            content,
            tokens: cost,
            created_at: Utc::now(),
        });
        self.total_tokens += cost;

        AppendOutcome {
            evicted,
            over_budget,
        }
    }

    pub fn push(&mut self, msg: Message) -> AppendOutcome {
        self.append(msg.role, msg.content)
    }

    /// 批量提交（一轮委派暂存的条目），逐条套用相同逐出规则
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) -> AppendOutcome {
        let mut total = AppendOutcome::default();
        for msg in messages {
            let o = self.push(msg);
            total.evicted += o.evicted;
            total.over_budget = o.over_budget;
        }
        total
    }

    /// 按插入顺序遍历；迭代器可 clone 以重新开始，不修改底层序列
    pub fn snapshot(&self) -> vec_deque::Iter<'_, ConversationEntry> {
        self.entries.iter()
    }

    pub fn to_messages(&self) -> Vec<Message> {
        self.snapshot().map(ConversationEntry::to_message).collect()
    }

    pub fn is_over_budget(&self) -> bool {
        self.total_tokens > self.budget
    }

    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_tokens = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
