//! Action 与 AgentHistory：Agent 对 Task 做过什么

use std::sync::Arc;

use super::{Goal, Task};

/// Agent 在某个 Task 上完成的一步工作（不可变）
#[derive(Debug, Clone)]
pub struct Action {
    description: String,
    task: Arc<Task>,
    executor: String,
}

impl Action {
    pub fn new(description: impl Into<String>, task: Arc<Task>, executor: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            task,
            executor: executor.into(),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn task(&self) -> &Arc<Task> {
        &self.task
    }

    pub fn executor(&self) -> &str {
        &self.executor
    }
}

/// 一次调用的历史记录：在哪个 Goal 的哪个 Task 上执行了哪些 Action
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub goal: Arc<Goal>,
    pub task: Arc<Task>,
    pub actions: Vec<Action>,
}

/// 单个 Agent 在会话内累积的历史
#[derive(Debug, Clone, Default)]
pub struct AgentHistory {
    entries: Vec<HistoryEntry>,
}

impl AgentHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, goal: Arc<Goal>, task: Arc<Task>, actions: Vec<Action>) {
        self.entries.push(HistoryEntry { goal, task, actions });
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    /// 所有记录中的 Action 总数
    pub fn action_count(&self) -> usize {
        self.entries.iter().map(|e| e.actions.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_accumulates_in_order() {
        let goal = Goal::new("g", true);
        let t1 = Task::new("t1", "a", "user", &goal);
        let t2 = Task::new("t2", "b", "user", &goal);

        let mut history = AgentHistory::new();
        history.push(goal.clone(), t1.clone(), vec![Action::new("looked", t1.clone(), "echo")]);
        history.push(
            goal.clone(),
            t2.clone(),
            vec![
                Action::new("replied", t2.clone(), "echo"),
                Action::new("closed", t2.clone(), "echo"),
            ],
        );

        assert_eq!(history.len(), 2);
        assert_eq!(history.action_count(), 3);
        assert_eq!(history.entries()[0].task.name(), "t1");
        assert_eq!(history.last().unwrap().actions[1].description(), "closed");
    }
}
