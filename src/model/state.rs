//! ExecutionState：一次 Agent 调用看到的执行快照
//!
//! 包含当前 Task、会话引用、该 Agent 的历史、I/O 处理器；Agent 通过 record_action
//! 记录本次调用做了什么，编排循环结束后写回 Agent 历史。

use std::sync::Arc;

use super::{Action, AgentHistory, Goal, Task};
use crate::core::SessionState;
use crate::io::InputOutputHandler;

pub struct ExecutionState {
    agent: String,
    task: Arc<Task>,
    session: Arc<SessionState>,
    history: AgentHistory,
    actions: Vec<Action>,
    handler: Arc<dyn InputOutputHandler>,
}

impl ExecutionState {
    pub fn new(
        agent: impl Into<String>,
        task: Arc<Task>,
        session: Arc<SessionState>,
        history: AgentHistory,
        handler: Arc<dyn InputOutputHandler>,
    ) -> Self {
        Self {
            agent: agent.into(),
            task,
            session,
            history,
            actions: Vec::new(),
            handler,
        }
    }

    /// 被调用的 Agent 名
    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn task(&self) -> &Arc<Task> {
        &self.task
    }

    pub fn goal(&self) -> Option<Arc<Goal>> {
        self.task.owning_goal()
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    /// 该 Agent 此前的累计历史
    pub fn history(&self) -> &AgentHistory {
        &self.history
    }

    pub fn handler(&self) -> &Arc<dyn InputOutputHandler> {
        &self.handler
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// 记录对当前 Task 的一步操作
    pub fn record_action(&mut self, description: impl Into<String>) {
        let action = Action::new(description, self.task.clone(), self.agent.clone());
        self.actions.push(action);
    }

    /// 记录对其他 Task（如拆分出的子任务）的操作
    pub fn record_action_on(&mut self, description: impl Into<String>, task: Arc<Task>) {
        self.actions
            .push(Action::new(description, task, self.agent.clone()));
    }

    /// 向调用方输出文本
    pub fn reply(&self, text: impl Into<String>) {
        self.handler.reply(text.into());
    }

    /// 关闭当前 Task（完成后编排循环会转向下一个 Task）
    pub fn complete_task(&self) -> bool {
        self.task.close()
    }

    pub(crate) fn into_parts(self) -> (AgentHistory, Vec<Action>) {
        (self.history, self.actions)
    }
}
