//! 编排循环：SelectGoal -> ExecuteTask -> Continue? -> Terminate
//!
//! 每条入站消息包装为 Task 追加到当前 Goal 队尾；若该 Goal 队首已有进行中的 Task，
//! 先继续处理它（跨多条消息的多步任务）。Agent 返回 true 时继续处理重新推导出的当前 Task。
//! 循环内的所有错误只记日志，对外只暴露 bool；需要细节时调用 step()。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::error::{codes, HiveError};
use super::session::SessionState;
use crate::agent::AgentPools;
use crate::config::OrchestratorSection;
use crate::io::InputOutputHandler;
use crate::model::{ExecutionState, Goal, Task};

/// 入站消息生成的 Task 名
pub const USER_TASK: &str = "user_created_task";
/// 入站消息生成的 Task 的创建者
pub const USER: &str = "user";

/// 编排引擎：处理一条入站消息，返回是否成功
#[async_trait]
pub trait Orchestrator: Send + Sync {
    async fn process(
        &self,
        session: &Arc<SessionState>,
        message: &str,
        handler: &Arc<dyn InputOutputHandler>,
    ) -> bool;
}

/// 一条消息的处理结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutcome {
    /// 消息落入的 Goal
    pub goal: String,
    /// 依次被调用的 Agent
    pub invocations: Vec<String>,
    /// 所有活跃 Goal 的任务都已处理完
    pub drained: bool,
}

/// 不在两次调用间保留状态的编排器；所有状态都在会话里
pub struct StatelessOrchestrator {
    pools: Arc<AgentPools>,
    agent_timeout: Option<Duration>,
    max_steps: usize,
}

impl StatelessOrchestrator {
    pub fn new(pools: Arc<AgentPools>) -> Self {
        let defaults = OrchestratorSection::default();
        Self::from_config(pools, &defaults)
    }

    pub fn from_config(pools: Arc<AgentPools>, section: &OrchestratorSection) -> Self {
        let agent_timeout = match section.agent_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Self {
            pools,
            agent_timeout,
            max_steps: section.max_steps.max(1),
        }
    }

    pub fn with_agent_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.agent_timeout = timeout;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn pools(&self) -> &Arc<AgentPools> {
        &self.pools
    }

    /// 处理一条消息，返回结构化结果
    pub async fn step(
        &self,
        session: &Arc<SessionState>,
        message: &str,
        handler: &Arc<dyn InputOutputHandler>,
    ) -> Result<StepOutcome, HiveError> {
        if session.is_closed() {
            return Err(HiveError::internal(
                codes::INTERRUPTED,
                format!("session {} is closed", session.id()),
            ));
        }

        let pool_name = session.agent_pool().ok_or_else(|| {
            HiveError::internal(
                codes::NOT_FOUND,
                format!("session {} has no bound agent pool", session.id()),
            )
        })?;
        let pool = self.pools.get(&pool_name).ok_or_else(|| {
            HiveError::internal(
                codes::NOT_FOUND,
                format!("unable to find agent pool {}", pool_name),
            )
        })?;

        // SelectGoal
        let mut goal = session
            .current_goal()
            .or_else(|| session.default_goal())
            .ok_or_else(|| {
                HiveError::internal(
                    codes::NOT_FOUND,
                    format!(
                        "no active or default goal in session {} ({})",
                        session.name(),
                        session.id()
                    ),
                )
            })?;

        let previous = goal.head_task();
        let inbound = Task::new(USER_TASK, message, USER, &goal);
        goal.add_task(Arc::clone(&inbound), false);
        let mut task = previous.unwrap_or(inbound);

        let mut outcome = StepOutcome {
            goal: goal.label().to_string(),
            ..Default::default()
        };

        loop {
            if outcome.invocations.len() >= self.max_steps {
                return Err(HiveError::internal(
                    codes::STEP_LIMIT,
                    format!(
                        "step limit {} reached in session {} on goal {}",
                        self.max_steps,
                        session.id(),
                        goal.label()
                    ),
                ));
            }

            // ExecuteTask
            let definition = pool.get_matching_agent(&task).ok_or_else(|| {
                HiveError::internal(
                    codes::NOT_FOUND,
                    format!(
                        "no matching agent in pool {} for task {} on goal {}",
                        pool_name,
                        task.name(),
                        goal.label()
                    ),
                )
            })?;
            let agent = definition.name().to_string();
            let history = session.agent_history().get(&agent).unwrap_or_default();

            let mut state = ExecutionState::new(
                agent.clone(),
                Arc::clone(&task),
                Arc::clone(session),
                history,
                Arc::clone(handler),
            );

            tracing::debug!(agent = %agent, goal = %goal.label(), task = %task.name(), "Invoking agent");
            let invocation = definition.invoke(&mut state);
            let next = match self.agent_timeout {
                Some(limit) => tokio::time::timeout(limit, invocation).await.map_err(|_| {
                    HiveError::internal(
                        codes::STEP_LIMIT,
                        format!("agent {} timed out after {:?}", agent, limit),
                    )
                })??,
                None => invocation.await?,
            };
            outcome.invocations.push(agent.clone());

            // 记录的是本次实际执行的 Goal / Task
            let (mut history, actions) = state.into_parts();
            history.push(Arc::clone(&goal), Arc::clone(&task), actions);
            session.agent_history().save(agent, history);

            // 重新推导当前 Task
            match next_task(session, &goal) {
                Some((g, t)) => {
                    goal = g;
                    task = t;
                }
                None => {
                    outcome.drained = true;
                    break;
                }
            }

            if !next {
                break;
            }
        }

        Ok(outcome)
    }
}

/// 当前 Goal 仍有任务则取其队首；否则看活跃 Goal 队列的队首
fn next_task(session: &SessionState, goal: &Arc<Goal>) -> Option<(Arc<Goal>, Arc<Task>)> {
    if let Some(task) = goal.head_task() {
        return Some((Arc::clone(goal), task));
    }
    let next_goal = session.current_goal()?;
    let task = next_goal.head_task()?;
    Some((next_goal, task))
}

#[async_trait]
impl Orchestrator for StatelessOrchestrator {
    async fn process(
        &self,
        session: &Arc<SessionState>,
        message: &str,
        handler: &Arc<dyn InputOutputHandler>,
    ) -> bool {
        match self.step(session, message, handler).await {
            Ok(outcome) => {
                tracing::info!(
                    goal = %outcome.goal,
                    invocations = outcome.invocations.len(),
                    drained = outcome.drained,
                    "Message processed"
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    session = %session.name(),
                    id = %session.id(),
                    code = e.code(),
                    "Orchestration failed: {}",
                    e
                );
                false
            }
        }
    }
}

