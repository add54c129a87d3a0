//! Agent 池：Goal -> 可服务 Agent 的索引，以及为 Task 选择 Agent 的策略
//!
//! refresh() 从头重建索引：通配 Agent 展开到池当前已知的全部 Goal，
//! 其余 Agent 挂到各自声明的 Goal 下；Agent 按注册顺序访问，保证结果确定。

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use super::{AgentDefinition, AgentRegistry, GoalAffinity};
use crate::core::error::{codes, HiveError};
use crate::model::Task;
use crate::sync::{read, write};

/// 选择策略：候选列表为该 Goal 下按索引顺序排列的 Agent
pub trait SelectionStrategy: Send + Sync {
    fn select(&self, task: &Task, candidates: &[Arc<AgentDefinition>]) -> Option<Arc<AgentDefinition>>;
}

/// 总是取第一个候选
#[derive(Debug, Default)]
pub struct FirstMatch;

impl SelectionStrategy for FirstMatch {
    fn select(&self, _task: &Task, candidates: &[Arc<AgentDefinition>]) -> Option<Arc<AgentDefinition>> {
        candidates.first().cloned()
    }
}

/// 依次轮转候选
#[derive(Debug, Default)]
pub struct RoundRobin {
    next: AtomicUsize,
}

impl SelectionStrategy for RoundRobin {
    fn select(&self, _task: &Task, candidates: &[Arc<AgentDefinition>]) -> Option<Arc<AgentDefinition>> {
        if candidates.is_empty() {
            return None;
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % candidates.len();
        candidates.get(idx).cloned()
    }
}

pub struct AgentPool {
    name: String,
    /// 池已知的 Goal 标签（通配展开的范围）
    goals: RwLock<Vec<String>>,
    agents: RwLock<Vec<Arc<AgentDefinition>>>,
    /// goal 标签 -> Agent 名（有序）
    index: RwLock<HashMap<String, Vec<String>>>,
    strategy: Box<dyn SelectionStrategy>,
}

impl AgentPool {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_strategy(name, Box::new(FirstMatch))
    }

    pub fn with_strategy(name: impl Into<String>, strategy: Box<dyn SelectionStrategy>) -> Self {
        Self {
            name: name.into(),
            goals: RwLock::new(Vec::new()),
            agents: RwLock::new(Vec::new()),
            index: RwLock::new(HashMap::new()),
            strategy,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 登记一个已知 Goal（重复忽略）
    pub fn add_goal(&self, label: impl Into<String>) {
        let label = label.into();
        let mut goals = write(&self.goals);
        if !goals.contains(&label) {
            goals.push(label);
        }
    }

    pub fn goals(&self) -> Vec<String> {
        read(&self.goals).clone()
    }

    /// 注册 Agent；同名定义原位替换
    pub fn register_agent(&self, definition: Arc<AgentDefinition>) {
        let mut agents = write(&self.agents);
        match agents.iter().position(|a| a.name() == definition.name()) {
            Some(idx) => agents[idx] = definition,
            None => agents.push(definition),
        }
    }

    pub fn agent(&self, name: &str) -> Option<Arc<AgentDefinition>> {
        read(&self.agents).iter().find(|a| a.name() == name).cloned()
    }

    pub fn agent_count(&self) -> usize {
        read(&self.agents).len()
    }

    /// 从注册表载入本池的 Agent；池名为空或注册表中没有本池时报 Input 错误
    pub fn configure(&self, registry: &AgentRegistry) -> Result<(), HiveError> {
        if self.name.trim().is_empty() {
            return Err(HiveError::input(codes::AGENT_INPUT, "agent pool name is blank"));
        }
        let definitions = registry
            .agents(&self.name)
            .filter(|defs| !defs.is_empty())
            .ok_or_else(|| {
                HiveError::input(codes::AGENT_INPUT, format!("no agents registered for pool {}", self.name))
            })?;
        for def in definitions {
            self.register_agent(Arc::clone(def));
        }
        tracing::info!(pool = %self.name, agents = definitions.len(), "Agent pool configured");
        Ok(())
    }

    /// 重建 goal -> agents 索引
    pub fn refresh(&self) {
        let goals = self.goals();
        let mut index: HashMap<String, Vec<String>> = HashMap::new();
        for agent in read(&self.agents).iter() {
            let labels: &[String] = match agent.affinity() {
                GoalAffinity::All => &goals,
                GoalAffinity::Goals(labels) => labels,
            };
            for label in labels {
                let names = index.entry(label.clone()).or_default();
                if !names.iter().any(|n| n == agent.name()) {
                    names.push(agent.name().to_string());
                }
            }
        }
        tracing::debug!(pool = %self.name, goals = index.len(), "Agent index rebuilt");
        *write(&self.index) = index;
    }

    /// 某 Goal 下的 Agent 名（索引顺序）
    pub fn agents_for_goal(&self, label: &str) -> Vec<String> {
        read(&self.index).get(label).cloned().unwrap_or_default()
    }

    /// 为 Task 所属 Goal 选择一个 Agent；Task 已脱离 Goal 或无候选时为 None
    pub fn get_matching_agent(&self, task: &Task) -> Option<Arc<AgentDefinition>> {
        let goal = task.owning_goal()?;
        let names = self.agents_for_goal(goal.label());
        let candidates: Vec<Arc<AgentDefinition>> = {
            let agents = read(&self.agents);
            names
                .iter()
                .filter_map(|n| agents.iter().find(|a| a.name() == n).cloned())
                .collect()
        };
        self.strategy.select(task, &candidates)
    }
}

/// 池名 -> 池；由组合根持有
#[derive(Default)]
pub struct AgentPools {
    pools: HashMap<String, Arc<AgentPool>>,
}

impl AgentPools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pool: AgentPool) -> Arc<AgentPool> {
        let pool = Arc::new(pool);
        self.pools.insert(pool.name().to_string(), Arc::clone(&pool));
        pool
    }

    pub fn get(&self, name: &str) -> Option<Arc<AgentPool>> {
        self.pools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pools.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Agent, AgentFailure};
    use crate::cache::Cache;
    use crate::model::{ExecutionState, Goal};
    use async_trait::async_trait;
    use serde_json::Value;

    struct Noop;

    #[async_trait]
    impl Agent for Noop {
        async fn invoke(
            &self,
            _state: &mut ExecutionState,
            _variables: &dyn Cache<String, Value>,
        ) -> Result<bool, AgentFailure> {
            Ok(false)
        }
    }

    fn pool_with(goals: &[&str], defs: Vec<AgentDefinition>) -> AgentPool {
        let pool = AgentPool::new("support");
        for g in goals {
            pool.add_goal(*g);
        }
        for def in defs {
            pool.register_agent(Arc::new(def));
        }
        pool.refresh();
        pool
    }

    #[test]
    fn test_wildcard_expands_to_known_goals() {
        let pool = pool_with(
            &["greeting", "billing", "refunds"],
            vec![
                AgentDefinition::new("router", Noop).for_all_goals(),
                AgentDefinition::new("biller", Noop).with_goals(["billing"]),
            ],
        );

        assert_eq!(pool.agents_for_goal("greeting"), vec!["router"]);
        assert_eq!(pool.agents_for_goal("refunds"), vec!["router"]);
        assert_eq!(pool.agents_for_goal("billing"), vec!["router", "biller"]);
    }

    #[test]
    fn test_wildcard_uses_goals_known_at_refresh_time() {
        let pool = pool_with(&["a"], vec![AgentDefinition::new("any", Noop).with_goals(["*"])]);
        assert!(pool.agents_for_goal("b").is_empty());

        pool.add_goal("b");
        pool.refresh();
        assert_eq!(pool.agents_for_goal("b"), vec!["any"]);
    }

    #[test]
    fn test_refresh_is_idempotent() {
        let pool = pool_with(&["a"], vec![AgentDefinition::new("x", Noop).with_goals(["a"])]);
        pool.refresh();
        pool.refresh();
        assert_eq!(pool.agents_for_goal("a"), vec!["x"]);
    }

    #[test]
    fn test_first_match_is_deterministic() {
        let pool = pool_with(
            &["billing"],
            vec![
                AgentDefinition::new("first", Noop).with_goals(["billing"]),
                AgentDefinition::new("second", Noop).with_goals(["billing"]),
            ],
        );
        let goal = Goal::new("billing", false);
        let task = Task::new("t", "x", "user", &goal);

        for _ in 0..3 {
            assert_eq!(pool.get_matching_agent(&task).unwrap().name(), "first");
        }
    }

    #[test]
    fn test_round_robin_rotates() {
        let pool = AgentPool::with_strategy("rr", Box::new(RoundRobin::default()));
        pool.add_goal("g");
        pool.register_agent(Arc::new(AgentDefinition::new("a", Noop).for_all_goals()));
        pool.register_agent(Arc::new(AgentDefinition::new("b", Noop).for_all_goals()));
        pool.refresh();

        let goal = Goal::new("g", false);
        let task = Task::new("t", "x", "user", &goal);
        let picks: Vec<String> = (0..4)
            .map(|_| pool.get_matching_agent(&task).unwrap().name().to_string())
            .collect();
        assert_eq!(picks, vec!["a", "b", "a", "b"]);
    }

    #[test]
    fn test_no_match_for_unknown_goal_or_detached_task() {
        let pool = pool_with(&["billing"], vec![AgentDefinition::new("b", Noop).with_goals(["billing"])]);
        let other = Goal::new("shipping", false);
        let task = Task::new("t", "x", "user", &other);
        assert!(pool.get_matching_agent(&task).is_none());

        let billing = Goal::new("billing", false);
        let closed = Task::new("t", "x", "user", &billing);
        closed.close();
        assert!(pool.get_matching_agent(&closed).is_none());
    }

    #[test]
    fn test_configure_requires_registered_agents() {
        let registry = AgentRegistry::new();
        let err = AgentPool::new("support").configure(&registry).unwrap_err();
        assert_eq!(err.code(), codes::AGENT_INPUT);

        let err = AgentPool::new("  ").configure(&registry).unwrap_err();
        assert_eq!(err.kind(), crate::core::error::ErrorKind::Input);

        let mut registry = AgentRegistry::new();
        registry.register(AgentDefinition::new("n", Noop).for_all_goals(), &["support"]);
        let pool = AgentPool::new("support");
        pool.configure(&registry).unwrap();
        assert_eq!(pool.agent_count(), 1);
    }
}
