//! 生命周期状态：开始/结束时间、阶段码与扩展码
//!
//! 框架只做 New -> Completed 两态迁移；InProgress 保留给调用方，扩展码对框架不透明。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 生命周期阶段（数值码与外部系统对齐）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lifecycle {
    New,
    InProgress,
    Completed,
}

impl Lifecycle {
    pub fn code(self) -> u8 {
        match self {
            Lifecycle::New => 1,
            Lifecycle::InProgress => 2,
            Lifecycle::Completed => 3,
        }
    }
}

/// Goal / Task 共用的状态记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub lifecycle: Lifecycle,
    /// 留给 Agent 自用的扩展状态码
    pub extension_code: i32,
}

impl Status {
    pub fn new() -> Self {
        Self {
            start_time: Utc::now(),
            end_time: None,
            lifecycle: Lifecycle::New,
            extension_code: 0,
        }
    }

    /// 由所属实体关闭时调用：记录结束时间并置为 Completed
    pub(crate) fn complete(&mut self) {
        let now = Utc::now();
        // 时钟回拨时不让结束时间早于开始时间
        self.end_time = Some(now.max(self.start_time));
        self.lifecycle = Lifecycle::Completed;
    }

    pub fn is_completed(&self) -> bool {
        self.lifecycle == Lifecycle::Completed
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_starts_new() {
        let status = Status::new();
        assert_eq!(status.lifecycle, Lifecycle::New);
        assert!(status.end_time.is_none());
        assert_eq!(status.extension_code, 0);
    }

    #[test]
    fn test_status_complete_sets_end_time() {
        let mut status = Status::new();
        status.complete();
        assert!(status.is_completed());
        assert!(status.end_time.unwrap() >= status.start_time);
    }

    #[test]
    fn test_lifecycle_codes() {
        assert_eq!(Lifecycle::New.code(), 1);
        assert_eq!(Lifecycle::InProgress.code(), 2);
        assert_eq!(Lifecycle::Completed.code(), 3);
    }
}
