//! 认知层：ReAct 单步规划与过程事件

pub mod events;
pub mod planner;

pub use events::{emit, AgentEvent};
pub use planner::{
    conditional_rules, extract_json_block, Decision, Planner, PlannerDecision,
    DEFAULT_MAX_ITERATIONS,
};
