//! 会话监管：每个会话私有的执行上下文
//!
//! 持有 CancellationToken 与 TaskTracker：process() 提交的工作都经由 spawn 调度，
//! shutdown 直接取消（在下一个 await 点中断），不等待排空。

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// 会话级生命周期管理：取消令牌与在途任务跟踪
#[derive(Debug, Default)]
pub struct SessionSupervisor {
    /// 会话关闭时触发
    cancel_token: CancellationToken,
    tracker: TaskTracker,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 创建子 token（用于单个任务）
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    /// 在会话上下文中调度一个工作单元；被取消时结果为 None。
    /// 需在 tokio 运行时内调用。
    pub fn spawn<F>(&self, work: F) -> JoinHandle<Option<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let token = self.cancel_token.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => None,
                out = work => Some(out),
            }
        })
    }

    /// 在途工作单元数
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    /// 强制关闭：不再接收新工作，并中断在途工作
    pub fn shutdown(&self) {
        self.tracker.close();
        self.cancel_token.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// 等待所有在途工作结束（需先 shutdown 或 close）
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }
}
