//! Agent 层：契约、定义、注册表与选择池

pub mod definition;
pub mod pool;
pub mod registry;

pub use definition::{Agent, AgentDefinition, AgentFailure, GoalAffinity, ALL_GOALS};
pub use pool::{AgentPool, AgentPools, FirstMatch, RoundRobin, SelectionStrategy};
pub use registry::AgentRegistry;
