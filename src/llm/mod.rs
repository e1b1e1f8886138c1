//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）、Provider 熔断器、故障转移池

pub mod credentials;
pub mod health;
pub mod mock;
pub mod openai;
pub mod pool;
pub mod provider;
pub mod traits;

pub use credentials::{Credential, Credentials};
pub use health::{
    FailureKind, HealthPolicy, HealthState, HealthTransition, ProviderHealthTracker,
    ProviderRecord,
};
pub use mock::{EchoLlmClient, ScriptedLlmClient};
pub use openai::OpenAiClient;
pub use pool::{PoolCompletion, PoolError, ProviderPool};
pub use provider::{create_client, ProviderKind, ProviderSpec};
pub use traits::{LlmClient, ProviderError};
