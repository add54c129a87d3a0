//! 通用回写缓存：本地 HashMap + 待写队列 + 可插拔后端
//!
//! 变更（save / put / delete）后按配置立即 sink，或把键放进无界 FIFO 待写队列，
//! 由 refresh() 统一回写。refresh 在同一实例内互斥（持有队列接收端的锁）。

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::mpsc;

use super::{Cache, CacheBackend, CacheOperations, CacheRefresher, Refreshable};
use crate::config::CacheSection;
use crate::sync::{lock, read, write};

/// 单个缓存实例的同步参数
#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
    /// 变更后是否立即回写（否则进入待写队列）
    pub sync_on_change: bool,
    /// 待写队列深度超过该值时告警（0 表示不告警）
    pub pending_warn_threshold: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            sync_on_change: false,
            pending_warn_threshold: 10_000,
        }
    }
}

impl From<&CacheSection> for CacheSettings {
    fn from(section: &CacheSection) -> Self {
        Self {
            sync_on_change: section.sync_on_change,
            pending_warn_threshold: section.pending_warn_threshold,
        }
    }
}

/// 后端同步缓存
pub struct SyncedCache<K, V, B> {
    name: String,
    data: RwLock<HashMap<K, V>>,
    backend: B,
    settings: CacheSettings,
    pending_tx: mpsc::UnboundedSender<K>,
    /// 队列消费端；refresh 期间持有，保证同实例刷新互斥
    pending_rx: Mutex<mpsc::UnboundedReceiver<K>>,
    pending_len: AtomicUsize,
    /// 已入队但尚未回写的键及其排队次数；source / clear 不得覆盖这些键的本地值
    dirty: Mutex<HashMap<K, usize>>,
    overflow_warned: AtomicBool,
    last_refresh: AtomicI64,
    closed: AtomicBool,
}

impl<K, V, B> SyncedCache<K, V, B>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    B: CacheBackend<K, V> + 'static,
{
    pub fn new(name: impl Into<String>, backend: B, settings: CacheSettings) -> Self {
        let (pending_tx, pending_rx) = mpsc::unbounded_channel();
        Self {
            name: name.into(),
            data: RwLock::new(HashMap::new()),
            backend,
            settings,
            pending_tx,
            pending_rx: Mutex::new(pending_rx),
            pending_len: AtomicUsize::new(0),
            dirty: Mutex::new(HashMap::new()),
            overflow_warned: AtomicBool::new(false),
            last_refresh: AtomicI64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// 创建并投入使用：先 source() 一次预热，再注册到刷新器（若提供）
    pub fn open(
        name: impl Into<String>,
        backend: B,
        settings: CacheSettings,
        refresher: Option<&CacheRefresher>,
    ) -> Arc<Self> {
        let cache = Arc::new(Self::new(name, backend, settings));
        cache.source();
        if let Some(refresher) = refresher {
            refresher.register(cache.clone());
        }
        cache
    }

    /// 当前待写队列深度
    pub fn pending_writes(&self) -> usize {
        self.pending_len.load(Ordering::SeqCst)
    }

    /// 队列深度是否已越过告警阈值（refresh 后复位）
    pub fn pending_overflow(&self) -> bool {
        self.overflow_warned.load(Ordering::SeqCst)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// 本地已缓存的条目数（不触发 source）
    pub fn len(&self) -> usize {
        read(&self.data).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.data).is_empty()
    }

    /// 按 FIFO 顺序回写队列中所有键；调用方持有接收端锁
    fn drain_pending(&self, rx: &mut mpsc::UnboundedReceiver<K>) -> usize {
        let mut drained = 0usize;
        while let Ok(key) = rx.try_recv() {
            self.pending_len.fetch_sub(1, Ordering::SeqCst);
            // 回写完成后才撤销登记，期间的 source 不会用旧值覆盖本地
            self.sink(&key);
            self.unmark_dirty(&key);
            drained += 1;
        }
        drained
    }

    fn unmark_dirty(&self, key: &K) {
        let mut dirty = lock(&self.dirty);
        if let Entry::Occupied(mut entry) = dirty.entry(key.clone()) {
            *entry.get_mut() -= 1;
            if *entry.get() == 0 {
                entry.remove();
            }
        }
    }

    /// 对本地 Map 执行后端操作，未回写键的本地状态（值或已删除）保持不变
    fn preserving_local_changes(
        &self,
        data: &mut HashMap<K, V>,
        op: impl FnOnce(&mut HashMap<K, V>) -> bool,
    ) -> bool {
        let local: Vec<(K, Option<V>)> = lock(&self.dirty)
            .keys()
            .map(|k| (k.clone(), data.get(k).cloned()))
            .collect();
        let ok = op(data);
        for (key, value) in local {
            match value {
                Some(v) => {
                    data.insert(key, v);
                }
                None => {
                    data.remove(&key);
                }
            }
        }
        ok
    }

    /// 修改本地 Map 并通知；延迟回写时在同一把写锁内登记，source 总能看到这次修改
    fn mutate(&self, key: K, change: impl FnOnce(&mut HashMap<K, V>)) {
        let mut data = write(&self.data);
        change(&mut data);
        if self.settings.sync_on_change {
            drop(data);
            self.sink(&key);
        } else {
            self.enqueue(key);
        }
    }

    fn enqueue(&self, key: K) {
        // 先计数再入队，消费端扣减时计数不会下溢
        *lock(&self.dirty).entry(key.clone()).or_insert(0) += 1;
        let depth = self.pending_len.fetch_add(1, Ordering::SeqCst) + 1;
        if let Err(mpsc::error::SendError(key)) = self.pending_tx.send(key) {
            self.pending_len.fetch_sub(1, Ordering::SeqCst);
            self.unmark_dirty(&key);
            tracing::warn!(cache = %self.name, "Pending write queue closed, dropping key");
            return;
        }
        let threshold = self.settings.pending_warn_threshold;
        if threshold > 0 && depth > threshold && !self.overflow_warned.swap(true, Ordering::SeqCst) {
            tracing::warn!(
                cache = %self.name,
                depth,
                threshold,
                "Pending write queue is growing, backing store may be slow or absent"
            );
        }
    }
}

impl<K, V, B> Cache<K, V> for SyncedCache<K, V, B>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    B: CacheBackend<K, V> + 'static,
{
    fn save(&self, key: K, value: V) -> bool {
        if self.is_closed() {
            return false;
        }
        let local_key = key.clone();
        self.mutate(key, move |data| {
            data.insert(local_key, value);
        });
        true
    }

    fn get(&self, key: &K) -> Option<V> {
        if self.is_closed() {
            return None;
        }
        if let Some(v) = read(&self.data).get(key).cloned() {
            return Some(v);
        }
        self.source();
        read(&self.data).get(key).cloned()
    }

    fn put(&self, key: K, value: V) -> bool {
        self.save(key, value)
    }

    fn delete(&self, key: &K) -> bool {
        if self.is_closed() {
            return false;
        }
        self.mutate(key.clone(), |data| {
            data.remove(key);
        });
        true
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        write(&self.data).clear();
        tracing::debug!(cache = %self.name, "Cache closed");
    }
}

impl<K, V, B> Refreshable for SyncedCache<K, V, B>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    B: CacheBackend<K, V> + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn refresh(&self) -> bool {
        if self.is_closed() {
            return false;
        }
        let mut rx = lock(&self.pending_rx);
        let drained = self.drain_pending(&mut rx);
        self.source();
        self.last_refresh
            .store(chrono::Utc::now().timestamp_millis(), Ordering::SeqCst);
        self.overflow_warned.store(false, Ordering::SeqCst);
        tracing::debug!(cache = %self.name, drained, "Cache refreshed");
        true
    }

    fn clear(&self) -> bool {
        // 先回写待同步键，否则本地值被清掉后 sink 只能写回“已删除”
        let mut rx = lock(&self.pending_rx);
        self.drain_pending(&mut rx);
        let mut data = write(&self.data);
        self.preserving_local_changes(&mut data, |data| self.backend.clear(data))
    }

    fn last_refresh_time(&self) -> i64 {
        self.last_refresh.load(Ordering::SeqCst)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl<K, V, B> CacheOperations<K> for SyncedCache<K, V, B>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    B: CacheBackend<K, V> + 'static,
{
    fn source(&self) -> bool {
        let mut data = write(&self.data);
        let ok = self.preserving_local_changes(&mut data, |data| self.backend.source(data));
        if !ok {
            tracing::warn!(cache = %self.name, "Cache source failed");
        }
        ok
    }

    fn sink(&self, key: &K) -> bool {
        let data = read(&self.data);
        let ok = self.backend.sink(key, data.get(key));
        if !ok {
            tracing::warn!(cache = %self.name, ?key, "Cache sink failed");
        }
        ok
    }

    fn notify_cache_handler(&self, key: K) {
        if self.settings.sync_on_change {
            self.sink(&key);
        } else {
            self.enqueue(key);
        }
    }
}
