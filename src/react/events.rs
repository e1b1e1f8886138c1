//! 协调过程事件：用于流式展示思考、Provider 选择、委托、观察与回复

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactEvent {
    /// 正在调用 LLM 思考（第几轮委托之后）
    Thinking { round: usize, max_rounds: usize },
    /// 本次推理由哪个 Provider 完成（attempts > 1 表示发生过故障转移）
    ProviderSelected { provider: String, attempts: usize },
    /// 委托给 Worker 或调用工具
    Delegation {
        target: String,
        args: serde_json::Value,
    },
    /// 委托返回（预览，避免过长）
    Observation { target: String, preview: String },
    /// 需要调用方补充凭据
    NeedsCredential { provider: String },
    /// 最终回复
    Answer { text: String, provider: String },
    /// 错误
    Error { text: String },
}

/// 截断为至多 max 个字符的预览
pub fn preview(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max).collect::<String>())
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(ReactEvent::NeedsCredential {
            provider: "groq".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "needs_credential");
        assert_eq!(json["provider"], "groq");
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("价格很高", 2), "价格...");
        assert_eq!(preview("ok", 10), "ok");
    }
}
