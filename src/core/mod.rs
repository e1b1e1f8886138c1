//! 核心层：错误与恢复、协调阶段状态机、运行时构建

pub mod builder;
pub mod error;
pub mod recovery;
pub mod state;

pub use builder::{Hive, HiveBuilder};
pub use error::{AgentError, RecoveryAction};
pub use recovery::RecoveryEngine;
pub use state::{AgentPhase, PhaseTracker};
