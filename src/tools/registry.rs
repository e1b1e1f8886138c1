//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / categories / execute），由 ToolRegistry 按名注册，
//! 同时建立分类索引供 Agent 按类别订阅；注册后不可变，以 Arc 在所有 Agent 间只读共享。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// 工具 trait：名称、描述（供 LLM 理解）、分类标签、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（用于 JSON 中的 "tool" 字段）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 分类标签（如 finance、utils），供 AgentSpec 订阅
    fn categories(&self) -> Vec<String> {
        Vec::new()
    }

    /// 参数 JSON Schema（供 LLM 生成正确的参数格式）
    /// 默认返回空对象，表示无参数或参数格式不限
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具；Err 为可读的失败原因，由调用方转为观察而非硬错误
    async fn execute(&self, args: Value) -> Result<String, String>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Tool '{0}' is already registered")]
    Duplicate(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool '{tool}' failed: {message}")]
    ExecutionFailed { tool: String, message: String },
}

/// 注册后的工具定义：名称、描述、分类、输入 schema 与可执行体
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub categories: Vec<String>,
    pub schema: Value,
    pub tool: Arc<dyn Tool>,
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("categories", &self.categories)
            .finish()
    }
}

impl ToolDefinition {
    fn from_tool(tool: Arc<dyn Tool>) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            categories: tool.categories(),
            schema: tool.parameters_schema(),
            tool,
        }
    }

    /// 供 prompt 使用的描述符
    pub fn descriptor(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "parameters": self.schema,
        })
    }
}

/// 工具注册表：名称索引 + 分类索引；保留注册顺序，保证 prompt 中工具描述顺序稳定
#[derive(Default, Clone, Debug)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDefinition>,
    order: Vec<String>,
    by_category: HashMap<String, Vec<String>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), RegistryError> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let def = ToolDefinition::from_tool(tool);
        if self.tools.contains_key(&def.name) {
            return Err(RegistryError::Duplicate(def.name));
        }
        for category in &def.categories {
            self.by_category
                .entry(category.clone())
                .or_default()
                .push(def.name.clone());
        }
        self.order.push(def.name.clone());
        self.tools.insert(def.name.clone(), def);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn by_category(&self, category: &str) -> Vec<&ToolDefinition> {
        self.by_category
            .get(category)
            .map(|names| names.iter().filter_map(|n| self.tools.get(n)).collect())
            .unwrap_or_default()
    }

    /// 按名称与分类挑出子集（去重，保持原注册顺序）；名称不存在时报错，分类不存在时为空
    pub fn subset(
        &self,
        names: &[String],
        categories: &[String],
    ) -> Result<ToolRegistry, RegistryError> {
        if let Some(missing) = names.iter().find(|n| !self.tools.contains_key(n.as_str())) {
            return Err(RegistryError::UnknownTool(missing.clone()));
        }
        let wanted = |def: &ToolDefinition| {
            names.contains(&def.name) || def.categories.iter().any(|c| categories.contains(c))
        };
        let mut out = ToolRegistry::new();
        for name in &self.order {
            if let Some(def) = self.tools.get(name) {
                if wanted(def) {
                    out.register_arc(Arc::clone(&def.tool))?;
                }
            }
        }
        Ok(out)
    }

    pub async fn execute(&self, name: &str, args: Value) -> Result<String, RegistryError> {
        let def = self
            .tools
            .get(name)
            .ok_or_else(|| RegistryError::UnknownTool(name.to_string()))?;
        def.tool
            .execute(args)
            .await
            .map_err(|message| RegistryError::ExecutionFailed {
                tool: name.to_string(),
                message,
            })
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// 注册顺序的定义列表
    pub fn definitions(&self) -> Vec<&ToolDefinition> {
        self.order.iter().filter_map(|n| self.tools.get(n)).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// 动态生成工具 schema JSON（与实际注册工具匹配）
    pub fn to_schema_json(&self) -> String {
        let tools: Vec<Value> = self.definitions().iter().map(|d| d.descriptor()).collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        name: &'static str,
        categories: &'static [&'static str],
    }

    #[async_trait]
    impl Tool for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "fixed output"
        }

        fn categories(&self) -> Vec<String> {
            self.categories.iter().map(|c| c.to_string()).collect()
        }

        async fn execute(&self, args: Value) -> Result<String, String> {
            match args.get("fail").and_then(|v| v.as_bool()) {
                Some(true) => Err("asked to fail".to_string()),
                _ => Ok(format!("{} ok", self.name)),
            }
        }
    }

    fn fixed(name: &'static str, categories: &'static [&'static str]) -> Fixed {
        Fixed { name, categories }
    }

    fn registry() -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(fixed("price", &["finance"])).unwrap();
        r.register(fixed("calc", &["utils", "finance"])).unwrap();
        r.register(fixed("clock", &["utils"])).unwrap();
        r
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut r = registry();
        let err = r.register(fixed("calc", &[])).unwrap_err();
        assert_eq!(err, RegistryError::Duplicate("calc".to_string()));
        assert_eq!(r.len(), 3);
    }

    #[test]
    fn test_category_index() {
        let r = registry();
        let names: Vec<&str> = r.by_category("finance").iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["price", "calc"]);
        assert!(r.by_category("weather").is_empty());
    }

    #[test]
    fn test_subset_by_name_and_category_keeps_order() {
        let r = registry();
        let sub = r.subset(&["clock".to_string()], &["finance".to_string()]).unwrap();
        assert_eq!(sub.tool_names(), vec!["price", "calc", "clock"]);

        let sub = r.subset(&["clock".to_string()], &[]).unwrap();
        assert_eq!(sub.tool_names(), vec!["clock"]);

        let err = r.subset(&["nope".to_string()], &[]).unwrap_err();
        assert_eq!(err, RegistryError::UnknownTool("nope".to_string()));
    }

    #[tokio::test]
    async fn test_execute_reports_failure_and_unknown() {
        let r = registry();
        assert_eq!(r.execute("calc", serde_json::json!({})).await.unwrap(), "calc ok");
        assert!(matches!(
            r.execute("calc", serde_json::json!({"fail": true})).await,
            Err(RegistryError::ExecutionFailed { .. })
        ));
        assert_eq!(
            r.execute("ghost", Value::Null).await.unwrap_err(),
            RegistryError::UnknownTool("ghost".to_string())
        );
    }

    #[test]
    fn test_schema_json_lists_tools_in_order() {
        let json: Vec<Value> = serde_json::from_str(&registry().to_schema_json()).unwrap();
        assert_eq!(json.len(), 3);
        assert_eq!(json[0]["name"], "price");
        assert!(json[0].get("parameters").is_some());
    }
}
