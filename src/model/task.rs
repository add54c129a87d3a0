//! Task：归属于某个 Goal 任务队列的一个工作单元
//!
//! Task 只通过弱引用指向所属 Goal；关闭时从 Goal 队列移除并置为 Completed，
//! 之后不再归属任何 Goal。Task 不会在 Goal 之间迁移。

use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;

use super::{Goal, Status};
use crate::sync::lock;

#[derive(Debug)]
pub struct Task {
    name: String,
    payload: Value,
    description: Option<String>,
    created_by: String,
    goal: Mutex<Weak<Goal>>,
    status: Mutex<Status>,
}

impl Task {
    pub fn new(
        name: impl Into<String>,
        payload: impl Into<Value>,
        created_by: impl Into<String>,
        goal: &Arc<Goal>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            payload: payload.into(),
            description: None,
            created_by: created_by.into(),
            goal: Mutex::new(Arc::downgrade(goal)),
            status: Mutex::new(Status::new()),
        })
    }

    /// 带描述的 Task（Agent 拆分子任务时使用）
    pub fn described(
        name: impl Into<String>,
        payload: impl Into<Value>,
        description: impl Into<String>,
        created_by: impl Into<String>,
        goal: &Arc<Goal>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            payload: payload.into(),
            description: Some(description.into()),
            created_by: created_by.into(),
            goal: Mutex::new(Arc::downgrade(goal)),
            status: Mutex::new(Status::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// payload 为字符串时直接返回文本
    pub fn text(&self) -> Option<&str> {
        self.payload.as_str()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    /// 所属 Goal；已关闭或 Goal 已释放时为 None
    pub fn owning_goal(&self) -> Option<Arc<Goal>> {
        lock(&self.goal).upgrade()
    }

    pub fn status(&self) -> Status {
        lock(&self.status).clone()
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.status).is_completed()
    }

    pub fn set_extension_code(&self, code: i32) {
        lock(&self.status).extension_code = code;
    }

    /// 关闭：从所属 Goal 队列移除并置为 Completed。
    /// 返回是否确实从某个队列中移除（不在任何队列中时返回 false）。
    pub fn close(&self) -> bool {
        let owner = std::mem::take(&mut *lock(&self.goal)).upgrade();
        let removed = owner.map(|goal| goal.detach(self)).unwrap_or(false);
        let mut status = lock(&self.status);
        if !status.is_completed() {
            status.complete();
        }
        removed
    }
}
