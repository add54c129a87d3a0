//! 缓存层：读穿透的本地存储 + 可插拔回写（source / sink / refresh / clear）
//!
//! - **Cache**: 数据访问面（save / get / put / delete）
//! - **CacheOperations**: 同步面（拉取、回写、刷新、变更通知）
//! - **CacheBackend**: 由持久化提供方实现的后端契约
//! - **CacheRefresher**: 后台周期性 clear + refresh 所有已注册缓存
//! - **CacheCatalog**: 按名称创建缓存实例（会话配置中引用的缓存名）

pub mod backend;
pub mod catalog;
pub mod refresher;
pub mod synced;

pub use backend::{CacheBackend, MemoryBackend, NoopBackend};
pub use catalog::{CacheCatalog, CacheFactory};
pub use refresher::CacheRefresher;
pub use synced::{CacheSettings, SyncedCache};

/// 数据访问面：所有会话可变状态（历史、变量、会话目录）都经由此接口读写
pub trait Cache<K, V>: Send + Sync {
    /// 写入（覆盖已有值）
    fn save(&self, key: K, value: V) -> bool;

    /// 读取；本地未命中时触发一次 source() 后再读
    fn get(&self, key: &K) -> Option<V>;

    /// 更新或插入
    fn put(&self, key: K, value: V) -> bool;

    fn delete(&self, key: &K) -> bool;

    /// 关闭后读返回 None、写返回 false
    fn close(&self);
}

/// 刷新调度面：与键值类型无关，供 CacheRefresher 以 dyn 持有
pub trait Refreshable: Send + Sync {
    /// 缓存实例名（用于日志）
    fn name(&self) -> &str;

    /// 回写待同步键，再从后端整体拉取
    fn refresh(&self) -> bool;

    /// 回写待同步键后清空本地内容；返回值含义由后端决定
    fn clear(&self) -> bool;

    /// 上次刷新完成的墙钟时间（毫秒时间戳，从未刷新为 0）
    fn last_refresh_time(&self) -> i64;

    fn is_closed(&self) -> bool;
}

/// 同步面：与后端交互的底层操作
pub trait CacheOperations<K>: Refreshable {
    /// 从后端整体加载到本地
    fn source(&self) -> bool;

    /// 将单个键的当前本地值写回后端
    fn sink(&self, key: &K) -> bool;

    /// 每次变更后调用：立即回写或进入待写队列
    fn notify_cache_handler(&self, key: K);
}
