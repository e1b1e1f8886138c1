//! Planner：意图规划与 Tool Call 解析
//!
//! 通过 ProviderPool 调用 LLM 得到回复；parse_llm_output 从文本中提取 JSON 并解析为 ToolCall 或直接回复。
//! 回复中出现多个调用（JSON 数组或 `tool_calls` 列表）时只取第一个，其余记录日志后忽略。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::llm::{Credentials, PoolCompletion, ProviderPool};
use crate::memory::Message;

/// LLM 返回的 Tool Call（简化 JSON：{"tool": "get_stock_price", "args": {"ticker_symbol": "..."}}）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default = "empty_args")]
    pub args: serde_json::Value,
}

fn empty_args() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

/// Planner 输出
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerOutput {
    /// 直接回复用户
    Response(String),
    /// 需要执行工具（或委托 Worker）
    ToolCall(ToolCall),
}

/// 看起来是调用意图的 JSON 值（含 `tool` 或 `tool_calls` 键的对象）
fn is_call_shaped(value: &serde_json::Value) -> bool {
    value
        .as_object()
        .is_some_and(|m| m.contains_key("tool") || m.contains_key("tool_calls"))
}

/// 从 JSON 值中取出第一个调用及被忽略的个数
///
/// Ok(None) 表示这段 JSON 不是调用（按普通回复处理）；调用形状但字段不合法时返回错误。
fn first_call(value: serde_json::Value) -> Result<Option<(ToolCall, usize)>, String> {
    match value {
        serde_json::Value::Array(items) => {
            let total = items.len();
            let Some(first) = items.into_iter().next() else {
                return Ok(None);
            };
            if !is_call_shaped(&first) {
                return Ok(None);
            }
            Ok(first_call(first)?.map(|(call, _)| (call, total.saturating_sub(1))))
        }
        serde_json::Value::Object(mut map) => {
            if let Some(list) = map.remove("tool_calls") {
                return first_call(list);
            }
            if !map.contains_key("tool") {
                return Ok(None);
            }
            let call: ToolCall = serde_json::from_value(serde_json::Value::Object(map))
                .map_err(|e| e.to_string())?;
            Ok(Some((call, 0)))
        }
        _ => Ok(None),
    }
}

/// 解析 LLM 输出：若含有效 JSON 且 tool 非空则为 ToolCall，否则为 Response
///
/// 显式的 ```json 代码块必须能解析，否则返回 JsonParseError；能解析但 `tool` / `args` 形状不对的调用同样报错。
/// 其余文本（包括以 `[` / `{` 开头的正文，如 `[1] ...` 脚注或 markdown 链接）解析失败时按普通回复处理。
pub fn parse_llm_output(output: &str) -> Result<PlannerOutput, AgentError> {
    let trimmed = output.trim();
    let response = || Ok(PlannerOutput::Response(trimmed.to_string()));

    let (json_str, strict) = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        let body = rest
            .find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or(rest.trim());
        (body, true)
    } else if trimmed.starts_with('[') {
        (trimmed, false)
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end < start {
            return response();
        }
        (&trimmed[start..=end], false)
    } else {
        return response();
    };

    let value: serde_json::Value = match serde_json::from_str(json_str) {
        Ok(v) => v,
        Err(e) if strict => {
            return Err(AgentError::JsonParseError(format!("{}: {}", e, json_str)));
        }
        Err(_) => return response(),
    };

    match first_call(value) {
        Ok(Some((call, ignored))) if !call.tool.is_empty() => {
            if ignored > 0 {
                tracing::warn!(
                    tool = %call.tool,
                    ignored,
                    "multiple tool calls in one reply; only the first is honoured"
                );
            }
            Ok(PlannerOutput::ToolCall(call))
        }
        Ok(_) => response(),
        Err(e) => Err(AgentError::JsonParseError(format!("{}: {}", e, json_str))),
    }
}

/// Planner：持有 Provider 池与 system prompt，拼 system + messages 后经池调用 LLM
pub struct Planner {
    pool: Arc<ProviderPool>,
    system_prompt: String,
}

impl Planner {
    pub fn new(pool: Arc<ProviderPool>, system_prompt: impl Into<String>) -> Self {
        Self {
            pool,
            system_prompt: system_prompt.into(),
        }
    }

    pub fn base_system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn pool(&self) -> &Arc<ProviderPool> {
        &self.pool
    }

    /// 使用动态拼接的 system（含团队名单、可调用单元描述等）
    pub async fn plan_with_system(
        &self,
        messages: &[Message],
        system: &str,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> Result<PoolCompletion, AgentError> {
        let mut full_messages = Vec::with_capacity(messages.len() + 1);
        full_messages.push(Message::system(system.to_string()));
        full_messages.extend_from_slice(messages);
        tracing::debug!(
            messages = full_messages.len(),
            system_chars = system.chars().count(),
            "planning request"
        );
        Ok(self.pool.execute(&full_messages, credentials, cancel).await?)
    }
}
