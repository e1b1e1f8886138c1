//! 多 Agent 协作：声明式团队、Worker、协调者与构建工厂

pub mod factory;
pub mod loader;
pub mod manager;
pub mod spec;
pub mod unit;
pub mod worker;

pub use factory::{TeamFactory, TeamSettings};
pub use loader::{load_team_spec, parse_team_spec};
pub use manager::{
    Answer, Coordinator, DelegationRecord, Query, Session, DEFAULT_DELEGATION_TIMEOUT,
    DEFAULT_MAX_ROUNDS,
};
pub use spec::{AgentSpec, TeamSpec, DEFAULT_WORKER_PROMPT};
pub use unit::{CallableUnit, InvokeContext, Observation, DELEGATE_PREFIX};
pub use worker::{WorkerAgent, DEFAULT_WORKER_MAX_TURNS};
