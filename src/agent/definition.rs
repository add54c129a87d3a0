//! Agent 契约与定义
//!
//! Agent 是显式注册的可调用对象：invoke(state, variables) -> 是否继续。
//! AgentDefinition 把 Agent 与名称、描述、私有变量缓存、Goal 亲和性绑在一起，
//! 并把调用失败统一转换为 HiveError（无法调用 -> Input，其余 -> Internal）。

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::Value;
use thiserror::Error;

use crate::cache::catalog::local_cache;
use crate::cache::Cache;
use crate::core::error::{codes, HiveError};
use crate::model::ExecutionState;

/// 通配亲和性：服务池内所有 Goal
pub const ALL_GOALS: &str = "*";

/// Agent 调用失败
#[derive(Error, Debug)]
pub enum AgentFailure {
    /// 无法定位或调用实现（视为输入/配置问题）
    #[error("agent unavailable: {0}")]
    Unavailable(String),

    /// 其他意外错误
    #[error("agent failed: {0}")]
    Failed(#[from] anyhow::Error),
}

/// Agent trait：对当前 Task 执行一步，返回是否继续处理下一个 Task
#[async_trait]
pub trait Agent: Send + Sync {
    async fn invoke(
        &self,
        state: &mut ExecutionState,
        variables: &dyn Cache<String, Value>,
    ) -> Result<bool, AgentFailure>;
}

/// Agent 可服务的 Goal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoalAffinity {
    All,
    Goals(Vec<String>),
}

impl GoalAffinity {
    /// 只有一个 "*" 时视为通配
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.len() == 1 && labels[0] == ALL_GOALS {
            Self::All
        } else {
            Self::Goals(labels)
        }
    }
}

pub struct AgentDefinition {
    name: String,
    description: String,
    agent: Arc<dyn Agent>,
    variables: Arc<dyn Cache<String, Value>>,
    affinity: GoalAffinity,
}

impl AgentDefinition {
    pub fn new(name: impl Into<String>, agent: impl Agent + 'static) -> Self {
        Self::from_arc(name, Arc::new(agent))
    }

    pub fn from_arc(name: impl Into<String>, agent: Arc<dyn Agent>) -> Self {
        let name = name.into();
        let variables = local_cache(format!("agent:{name}:variables"));
        Self {
            name,
            description: String::new(),
            agent,
            variables,
            affinity: GoalAffinity::Goals(Vec::new()),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// 声明可服务的 Goal 标签；传入 ["*"] 等同 for_all_goals
    pub fn with_goals<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.affinity = GoalAffinity::from_labels(labels);
        self
    }

    pub fn for_all_goals(mut self) -> Self {
        self.affinity = GoalAffinity::All;
        self
    }

    pub fn with_variables(mut self, variables: Arc<dyn Cache<String, Value>>) -> Self {
        self.variables = variables;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn affinity(&self) -> &GoalAffinity {
        &self.affinity
    }

    pub fn variables(&self) -> &Arc<dyn Cache<String, Value>> {
        &self.variables
    }

    /// 调用 Agent；panic 也会被捕获为 Internal 错误
    pub async fn invoke(&self, state: &mut ExecutionState) -> Result<bool, HiveError> {
        let call = self.agent.invoke(state, self.variables.as_ref());
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(next)) => Ok(next),
            Ok(Err(AgentFailure::Unavailable(reason))) => Err(HiveError::input(
                codes::AGENT_INPUT,
                format!("unable to invoke agent {}: {}", self.name, reason),
            )),
            Ok(Err(AgentFailure::Failed(e))) => Err(HiveError::internal(
                codes::AGENT_FAILED,
                format!("unexpected error occurred while invoking agent {}: {:#}", self.name, e),
            )),
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(HiveError::internal(
                    codes::AGENT_FAILED,
                    format!("agent {} panicked: {}", self.name, reason),
                ))
            }
        }
    }
}

impl fmt::Debug for AgentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("affinity", &self.affinity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_affinity() {
        assert_eq!(GoalAffinity::from_labels(["*"]), GoalAffinity::All);
        assert_eq!(
            GoalAffinity::from_labels(["billing"]),
            GoalAffinity::Goals(vec!["billing".to_string()])
        );
        // 与其他标签混用时不视为通配
        assert_eq!(
            GoalAffinity::from_labels(["*", "billing"]),
            GoalAffinity::Goals(vec!["*".to_string(), "billing".to_string()])
        );
    }
}
