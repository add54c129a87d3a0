//! Goal：带标签的工作单元，持有有序的 Task 双端队列与 Goal 级变量缓存

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use super::{Status, Task};
use crate::cache::catalog::local_cache;
use crate::cache::Cache;
use crate::sync::lock;

pub struct Goal {
    label: String,
    is_default: bool,
    tasks: Mutex<VecDeque<Arc<Task>>>,
    status: Mutex<Status>,
    variables: Arc<dyn Cache<String, Value>>,
}

impl Goal {
    pub fn new(label: impl Into<String>, is_default: bool) -> Arc<Self> {
        let label = label.into();
        let variables = local_cache(format!("goal:{label}:variables"));
        Self::with_variables(label, is_default, variables)
    }

    pub fn with_variables(
        label: impl Into<String>,
        is_default: bool,
        variables: Arc<dyn Cache<String, Value>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            is_default,
            tasks: Mutex::new(VecDeque::new()),
            status: Mutex::new(Status::new()),
            variables,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn variables(&self) -> &Arc<dyn Cache<String, Value>> {
        &self.variables
    }

    pub fn status(&self) -> Status {
        lock(&self.status).clone()
    }

    /// 队首 Task（不出队）
    pub fn head_task(&self) -> Option<Arc<Task>> {
        lock(&self.tasks).front().cloned()
    }

    /// 按队列顺序的快照
    pub fn tasks(&self) -> Vec<Arc<Task>> {
        lock(&self.tasks).iter().cloned().collect()
    }

    pub fn task_count(&self) -> usize {
        lock(&self.tasks).len()
    }

    pub fn contains(&self, task: &Task) -> bool {
        lock(&self.tasks)
            .iter()
            .any(|t| std::ptr::eq(Arc::as_ptr(t), task))
    }

    /// 加入队列：front=true 插到队首（下一次 head_task 即为它），否则追加到队尾。
    /// Task 必须归属本 Goal 且尚未在队列中，否则返回 false。
    pub fn add_task(self: &Arc<Self>, task: Arc<Task>, front: bool) -> bool {
        let owned = task
            .owning_goal()
            .is_some_and(|owner| Arc::ptr_eq(&owner, self));
        if !owned {
            tracing::warn!(goal = %self.label, task = task.name(), "Task does not belong to this goal");
            return false;
        }
        let mut tasks = lock(&self.tasks);
        if tasks.iter().any(|t| Arc::ptr_eq(t, &task)) {
            return false;
        }
        if front {
            tasks.push_front(task);
        } else {
            tasks.push_back(task);
        }
        true
    }

    /// 移除并关闭本 Goal 队列中的 Task
    pub fn remove_task(&self, task: &Task) -> bool {
        let owned = task
            .owning_goal()
            .is_some_and(|owner| std::ptr::eq(Arc::as_ptr(&owner), self));
        owned && task.close()
    }

    /// 仅从队列摘除（由 Task::close 调用）
    pub(crate) fn detach(&self, task: &Task) -> bool {
        let mut tasks = lock(&self.tasks);
        match tasks.iter().position(|t| std::ptr::eq(Arc::as_ptr(t), task)) {
            Some(idx) => {
                tasks.remove(idx);
                true
            }
            None => false,
        }
    }

    /// 关闭 Goal：不会自动关闭其中的 Task
    pub fn close(&self) {
        let mut status = lock(&self.status);
        if !status.is_completed() {
            status.complete();
        }
    }
}

impl fmt::Debug for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Goal")
            .field("label", &self.label)
            .field("is_default", &self.is_default)
            .field("tasks", &self.task_count())
            .field("status", &self.status())
            .finish()
    }
}
