//! 阶段类型与工具归类
//!
//! 每轮的执行计划是有限词表 {policy, research, task, response} 上的线性序列，
//! 恒以 response 收尾。工具按命名启发式划入前三类阶段，response 不占工具。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::tools::ToolRegistry;

/// 阶段类型（封闭词表）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// 策略/权限检查
    Policy,
    /// 知识检索
    Research,
    /// 业务动作执行
    Task,
    /// 最终回复合成
    Response,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Policy => "policy",
            Stage::Research => "research",
            Stage::Task => "task",
            Stage::Response => "response",
        }
    }

    /// 解析阶段 token；兼容 "policy_node" 之类的带后缀写法，未知返回 None
    pub fn parse(token: &str) -> Option<Stage> {
        let token = token.trim().to_lowercase();
        let token = token.strip_suffix("_node").unwrap_or(&token);
        match token {
            "policy" => Some(Stage::Policy),
            "research" => Some(Stage::Research),
            "task" => Some(Stage::Task),
            "response" => Some(Stage::Response),
            _ => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 策略类关键词
const POLICY_MARKERS: [&str; 3] = ["policy", "policies", "politica"];
/// 检索类关键词
const RESEARCH_MARKERS: [&str; 4] = ["search", "buscar", "knowledge", "consultar"];

/// 按名称/描述启发式把注册表中的工具划入阶段；不匹配者归 task
pub fn partition_tools(registry: &ToolRegistry) -> HashMap<Stage, Vec<String>> {
    let mut partitions: HashMap<Stage, Vec<String>> = HashMap::from([
        (Stage::Policy, Vec::new()),
        (Stage::Research, Vec::new()),
        (Stage::Task, Vec::new()),
    ]);

    for (name, description) in registry.tool_descriptions() {
        let haystack = format!("{} {}", name.to_lowercase(), description.to_lowercase());
        let stage = if POLICY_MARKERS.iter().any(|m| haystack.contains(m)) {
            Stage::Policy
        } else if RESEARCH_MARKERS.iter().any(|m| haystack.contains(m)) {
            Stage::Research
        } else {
            Stage::Task
        };
        partitions.entry(stage).or_default().push(name);
    }
    partitions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Tool;
    use async_trait::async_trait;
    use serde_json::Value;

    struct NamedTool {
        name: &'static str,
        description: &'static str,
    }

    #[async_trait]
    impl Tool for NamedTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            self.description
        }
        async fn execute(&self, _args: Value) -> Result<String, String> {
            Ok("ok".to_string())
        }
    }

    #[test]
    fn test_parse_accepts_node_suffix() {
        assert_eq!(Stage::parse("research_node"), Some(Stage::Research));
        assert_eq!(Stage::parse("RESPONSE"), Some(Stage::Response));
        assert_eq!(Stage::parse("banana"), None);
    }

    #[test]
    fn test_partition_by_name_and_description() {
        let mut registry = ToolRegistry::new();
        registry
            .register(NamedTool {
                name: "accept_policies",
                description: "Saves policy acceptance",
            })
            .unwrap();
        registry
            .register(NamedTool {
                name: "search_knowledge_documents",
                description: "Search docs",
            })
            .unwrap();
        registry
            .register(NamedTool {
                name: "book_car",
                description: "Books a rental car",
            })
            .unwrap();
        registry
            .register(NamedTool {
                name: "faq",
                description: "Consultar preguntas frecuentes",
            })
            .unwrap();

        let partitions = partition_tools(&registry);
        assert_eq!(partitions[&Stage::Policy], vec!["accept_policies"]);
        assert_eq!(
            partitions[&Stage::Research],
            vec!["faq", "search_knowledge_documents"]
        );
        assert_eq!(partitions[&Stage::Task], vec!["book_car"]);
    }
}
