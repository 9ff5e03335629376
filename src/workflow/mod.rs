//! 工作流层：阶段词表与工具归类、Architect 路由、顺序解释引擎、回复合成

pub mod architect;
pub mod engine;
pub mod stage;
pub mod synthesizer;

pub use architect::{plan_schema_json, Architect, ArchitectPlan};
pub use engine::WorkflowEngine;
pub use stage::{partition_tools, Stage};
pub use synthesizer::{ResponseSynthesizer, FALLBACK_RESPONSE};
