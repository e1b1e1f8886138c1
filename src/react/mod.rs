//! 认知层：Planner（经 Provider 池推理）、Tool Call 解析、过程事件

pub mod events;
pub mod planner;

pub use events::ReactEvent;
pub use planner::{parse_llm_output, Planner, PlannerOutput, ToolCall};
