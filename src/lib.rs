//! Hive - 多 Agent 协调与 Provider 故障转移
//!
//! 模块划分：
//! - **agents**: 声明式团队、Worker、协调者（递归委托循环）与构建工厂
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、阶段状态机、运行时构建
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）、Provider 熔断器与故障转移池
//! - **memory**: 按 token 预算裁剪的会话记忆
//! - **observability**: tracing 初始化
//! - **react**: Planner 与 Tool Call 解析、过程事件
//! - **tools**: 工具注册表（含分类索引）、执行器与内置工具

pub mod agents;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use agents::{Answer, Coordinator, Query, Session};
pub use core::{AgentError, Hive, HiveBuilder};
