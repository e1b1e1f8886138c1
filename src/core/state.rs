//! 协调者单次 Query 的阶段状态机
//!
//! Thinking -> {Delegating, Answering, NeedsCredential, Failed}；Delegating 完成后回到 Thinking。

use serde::Serialize;

/// 协调循环阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentPhase {
    Idle,
    Thinking,
    Delegating,
    Answering,
    NeedsCredential,
    Failed,
}

impl AgentPhase {
    /// 合法转换表；Idle 仅能进入 Thinking，终态之后只能回到 Idle（下一次 Query）
    pub fn can_transition_to(self, next: AgentPhase) -> bool {
        use AgentPhase::*;
        match (self, next) {
            (Idle, Thinking) => true,
            (Thinking, Delegating | Answering | NeedsCredential | Failed) => true,
            (Delegating, Thinking | NeedsCredential | Failed) => true,
            (Answering | NeedsCredential | Failed, Idle) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AgentPhase::Answering | AgentPhase::NeedsCredential | AgentPhase::Failed
        )
    }
}

/// 带断言的阶段跟踪器：记录经过的阶段，便于审计与测试
#[derive(Clone, Debug)]
pub struct PhaseTracker {
    current: AgentPhase,
    history: Vec<AgentPhase>,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self {
            current: AgentPhase::Idle,
            history: vec![AgentPhase::Idle],
        }
    }
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> AgentPhase {
        self.current
    }

    pub fn history(&self) -> &[AgentPhase] {
        &self.history
    }

    /// 非法转换只记录 warn，不中断循环
    pub fn enter(&mut self, next: AgentPhase) {
        if !self.current.can_transition_to(next) {
            tracing::warn!(from = ?self.current, to = ?next, "unexpected phase transition");
        }
        self.current = next;
        self.history.push(next);
    }
}
