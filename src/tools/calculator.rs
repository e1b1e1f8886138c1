//! 四则运算工具（utils 类）

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::Tool;

pub struct CalculatorTool;

/// 数字参数：接受 JSON number，也接受可解析的字符串（LLM 常把数字写成字符串）
fn number_arg(args: &Value, key: &str) -> Result<f64, String> {
    match args.get(key) {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| format!("'{key}' is not a finite number")),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("'{key}' is not a number: {s}")),
        Some(other) => Err(format!("'{key}' is not a number: {other}")),
        None => Err(format!("Missing argument '{key}'")),
    }
}

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Perform basic arithmetic operations. Use this for calculating differences, ratios, or percentages."
    }

    fn categories(&self) -> Vec<String> {
        vec!["utils".to_string()]
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["add", "subtract", "multiply", "divide"],
                    "description": "The math operation to perform."
                },
                "x": { "type": "number", "description": "The first number." },
                "y": { "type": "number", "description": "The second number." }
            },
            "required": ["operation", "x", "y"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let operation = args
            .get("operation")
            .and_then(|v| v.as_str())
            .ok_or("Missing argument 'operation'")?;
        let x = number_arg(&args, "x")?;
        let y = number_arg(&args, "y")?;
        let result = match operation {
            "add" => x + y,
            "subtract" => x - y,
            "multiply" => x * y,
            "divide" if y == 0.0 => return Err("Division by zero".to_string()),
            "divide" => x / y,
            other => return Err(format!("Unknown operation: {other}")),
        };
        Ok(serde_json::json!({ "result": result }).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_basic_operations() {
        let c = CalculatorTool;
        let out = c
            .execute(serde_json::json!({"operation": "subtract", "x": 10, "y": 2.5}))
            .await
            .unwrap();
        assert_eq!(out, r#"{"result":7.5}"#);

        let out = c
            .execute(serde_json::json!({"operation": "multiply", "x": "3", "y": "4"}))
            .await
            .unwrap();
        assert_eq!(out, r#"{"result":12.0}"#);
    }

    #[tokio::test]
    async fn test_soft_errors() {
        let c = CalculatorTool;
        let err = c
            .execute(serde_json::json!({"operation": "divide", "x": 1, "y": 0}))
            .await
            .unwrap_err();
        assert!(err.contains("Division by zero"));

        let err = c
            .execute(serde_json::json!({"operation": "pow", "x": 1, "y": 2}))
            .await
            .unwrap_err();
        assert!(err.contains("Unknown operation"));

        assert!(c.execute(serde_json::json!({"operation": "add"})).await.is_err());
    }
}
