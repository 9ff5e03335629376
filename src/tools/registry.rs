//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），
//! ToolRegistry 按名注册并在注册时提取 ToolDescriptor（required / all 参数集）。
//! 同名注册是配置错误；schema 提取失败只降级校验强度，绝不拒绝注册。

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AgentError;
use crate::llm::ToolSpec;

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（tool call 中的 name 字段，注册表内唯一）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能，也参与阶段归类启发式）
    fn description(&self) -> &str;

    /// 参数 JSON Schema。默认返回空对象，表示无参数或参数格式不限
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具
    async fn execute(&self, args: Value) -> Result<String, String>;
}

/// 注册时提取的参数描述：required 为必填名集合，all 为全部已知参数名
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub required: BTreeSet<String>,
    pub all: BTreeSet<String>,
}

/// 从参数 schema 提取 required / all 集合。
///
/// 依次尝试：
/// 1. 顶层 "required": ["a", "b"] 数组（标准 JSON Schema 写法，外部拉取的
///    描述符也是这个形状）；
/// 2. 属性级 "required": true 标记（历史方言）；
/// 3. 都没有时按签名推断：属性无 "default" 且类型不可空即视为必填。
///
/// 形状不符合预期时一律降级为「无已知必填参数」。
pub fn extract_descriptor(name: &str, description: &str, schema: &Value) -> ToolDescriptor {
    let mut descriptor = ToolDescriptor {
        name: name.to_string(),
        description: description.to_string(),
        ..Default::default()
    };

    let properties = match schema.get("properties").and_then(Value::as_object) {
        Some(props) => props,
        None => return descriptor,
    };
    descriptor.all = properties.keys().cloned().collect();

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for entry in required {
            if let Some(param) = entry.as_str() {
                descriptor.required.insert(param.to_string());
                descriptor.all.insert(param.to_string());
            }
        }
        return descriptor;
    }

    let flagged: BTreeSet<String> = properties
        .iter()
        .filter(|(_, prop)| prop.get("required").and_then(Value::as_bool) == Some(true))
        .map(|(param, _)| param.clone())
        .collect();
    if !flagged.is_empty() {
        descriptor.required = flagged;
        return descriptor;
    }

    descriptor.required = properties
        .iter()
        .filter(|(_, prop)| prop.get("default").is_none() && !is_nullable(prop))
        .map(|(param, _)| param.clone())
        .collect();
    descriptor
}

/// 类型可空即视为可选："nullable": true，或 type 含 "null"
fn is_nullable(prop: &Value) -> bool {
    if prop.get("nullable").and_then(Value::as_bool) == Some(true) {
        return true;
    }
    match prop.get("type") {
        Some(Value::String(t)) => t == "null",
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some("null")),
        _ => false,
    }
}

/// 工具注册表：按名称存储 Arc<dyn Tool> 与其 ToolDescriptor
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    descriptors: HashMap<String, ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个工具；同名已存在时返回 ToolNameCollision
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), AgentError> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<(), AgentError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(AgentError::ToolNameCollision(name));
        }
        let descriptor = extract_descriptor(&name, tool.description(), &tool.parameters_schema());
        self.descriptors.insert(name.clone(), descriptor);
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.descriptors.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 返回 (name, description) 列表，用于提示词中的 Available tools 段落
    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .tools
            .iter()
            .map(|(name, tool)| (name.clone(), tool.description().to_string()))
            .collect();
        out.sort();
        out
    }

    /// 生成绑定给模型的 ToolSpec 列表；names 为 None 时取全部
    pub fn tool_specs(&self, names: Option<&[String]>) -> Vec<ToolSpec> {
        let mut selected: Vec<&Arc<dyn Tool>> = match names {
            Some(names) => names.iter().filter_map(|n| self.tools.get(n)).collect(),
            None => self.tools.values().collect(),
        };
        selected.sort_by(|a, b| a.name().cmp(b.name()));
        selected
            .into_iter()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }
}
