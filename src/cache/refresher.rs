//! 缓存刷新器：后台按固定间隔清理并刷新所有已注册缓存
//!
//! 每轮对距上次刷新超过 min_refresh 的缓存执行 clear() + refresh()；各缓存在独立的
//! blocking 任务中并发刷新，单个缓存 panic 只记录日志，不影响其余缓存。

use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::Refreshable;
use crate::config::CacheSection;
use crate::sync::{read, write};

/// 刷新调度器；不持有任何缓存数据，只驱动刷新节奏
pub struct CacheRefresher {
    caches: RwLock<Vec<Arc<dyn Refreshable>>>,
    /// 同一缓存两次刷新的最小间隔
    min_refresh: Duration,
    /// 后台扫描间隔
    interval: Duration,
}

impl CacheRefresher {
    pub fn new(min_refresh: Duration, interval: Duration) -> Self {
        Self {
            caches: RwLock::new(Vec::new()),
            min_refresh,
            interval,
        }
    }

    pub fn from_config(section: &CacheSection) -> Self {
        Self::new(
            Duration::from_millis(section.min_refresh_ms),
            Duration::from_secs(section.refresh_interval_secs.max(1)),
        )
    }

    /// 注册缓存；顺带移除已关闭的实例，后台循环未启动时列表也不会无限增长
    pub fn register(&self, cache: Arc<dyn Refreshable>) {
        tracing::debug!(cache = cache.name(), "Cache registered for refresh");
        let mut caches = write(&self.caches);
        caches.retain(|c| !c.is_closed());
        caches.push(cache);
    }

    /// 按实例（指针）注销；返回是否找到
    pub fn unregister(&self, cache: &Arc<dyn Refreshable>) -> bool {
        let target = Arc::as_ptr(cache) as *const ();
        let mut caches = write(&self.caches);
        let before = caches.len();
        caches.retain(|c| Arc::as_ptr(c) as *const () != target);
        caches.len() != before
    }

    pub fn len(&self) -> usize {
        read(&self.caches).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.caches).is_empty()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 执行一轮扫描，返回本轮实际刷新成功的缓存数
    pub async fn sweep(&self) -> usize {
        let due: Vec<Arc<dyn Refreshable>> = {
            let mut caches = write(&self.caches);
            caches.retain(|c| !c.is_closed());
            let now = chrono::Utc::now().timestamp_millis();
            let min_ms = self.min_refresh.as_millis() as i64;
            caches
                .iter()
                .filter(|c| now - c.last_refresh_time() > min_ms)
                .cloned()
                .collect()
        };

        tracing::info!(
            registered = self.len(),
            due = due.len(),
            "Starting cache refresh"
        );

        let handles = due.into_iter().map(|cache| {
            let name = cache.name().to_string();
            let handle = tokio::task::spawn_blocking(move || {
                cache.clear();
                cache.refresh()
            });
            async move { (name, handle.await) }
        });

        let mut refreshed = 0;
        for (name, result) in join_all(handles).await {
            match result {
                Ok(true) => refreshed += 1,
                Ok(false) => tracing::warn!(cache = %name, "Cache refresh skipped"),
                Err(e) => tracing::error!(cache = %name, "Cache refresh task failed: {}", e),
            }
        }
        refreshed
    }

    /// 启动后台扫描循环，token 取消后退出
    pub fn spawn(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let refresher = Arc::clone(self);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(refresher.interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::info!("Cache refresher stopped");
                        break;
                    }
                    _ = timer.tick() => {
                        refresher.sweep().await;
                    }
                }
            }
        })
    }
}
