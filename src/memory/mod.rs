//! 记忆层：按 token 预算裁剪的会话内对话记忆（不跨会话持久化）

pub mod conversation;
pub mod token_budget;

pub use conversation::{
    AppendOutcome, BoundedMemory, ConversationEntry, Message, Role, DEFAULT_BUDGET_TOKENS,
};
pub use token_budget::{TokenCounter, TokenEstimator, WhitespaceCounter};
