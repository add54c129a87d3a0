//! 缓存目录：会话配置按名称引用缓存实现，由此处创建实例
//!
//! 内置两种：`simple`（NoopBackend，仅内存）与 `memory`（每实例独立的 MemoryBackend）。
//! 宿主进程可通过 register_* 注册接入外部存储的实现。

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use serde_json::Value;

use super::{Cache, CacheRefresher, CacheSettings, MemoryBackend, NoopBackend, SyncedCache};
use crate::model::AgentHistory;

/// 缓存工厂：参数为实例名（用于日志）
pub type CacheFactory<V> = Arc<dyn Fn(&str) -> Arc<dyn Cache<String, V>> + Send + Sync>;

pub const SIMPLE_CACHE: &str = "simple";
pub const MEMORY_CACHE: &str = "memory";

/// 按值类型分组的命名缓存工厂
#[derive(Default)]
pub struct CacheCatalog {
    histories: HashMap<String, CacheFactory<AgentHistory>>,
    transcripts: HashMap<String, CacheFactory<String>>,
    variables: HashMap<String, CacheFactory<Value>>,
}

/// 内置工厂：创建时预热并注册到刷新器
fn builtin<V>(
    kind: &'static str,
    settings: CacheSettings,
    refresher: Option<Arc<CacheRefresher>>,
) -> CacheFactory<V>
where
    V: Clone + Send + Sync + 'static,
{
    Arc::new(move |name: &str| -> Arc<dyn Cache<String, V>> {
        if kind == MEMORY_CACHE {
            let cache: Arc<dyn Cache<String, V>> = SyncedCache::open(
                name,
                MemoryBackend::<String, V>::new(),
                settings,
                refresher.as_deref(),
            );
            return cache;
        }
        SyncedCache::open(name, NoopBackend, settings, refresher.as_deref())
    })
}

impl CacheCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 带内置 `simple` / `memory` 实现的目录
    pub fn with_builtin(settings: CacheSettings, refresher: Option<Arc<CacheRefresher>>) -> Self {
        let mut catalog = Self::new();
        for kind in [SIMPLE_CACHE, MEMORY_CACHE] {
            catalog
                .histories
                .insert(kind.to_string(), builtin(kind, settings, refresher.clone()));
            catalog
                .transcripts
                .insert(kind.to_string(), builtin(kind, settings, refresher.clone()));
            catalog
                .variables
                .insert(kind.to_string(), builtin(kind, settings, refresher.clone()));
        }
        catalog
    }

    pub fn register_history(&mut self, name: impl Into<String>, factory: CacheFactory<AgentHistory>) {
        self.histories.insert(name.into(), factory);
    }

    pub fn register_transcript(&mut self, name: impl Into<String>, factory: CacheFactory<String>) {
        self.transcripts.insert(name.into(), factory);
    }

    pub fn register_variables(&mut self, name: impl Into<String>, factory: CacheFactory<Value>) {
        self.variables.insert(name.into(), factory);
    }

    pub fn history(&self, kind: &str, instance: &str) -> Option<Arc<dyn Cache<String, AgentHistory>>> {
        self.histories.get(kind).map(|f| f(instance))
    }

    pub fn transcript(&self, kind: &str, instance: &str) -> Option<Arc<dyn Cache<String, String>>> {
        self.transcripts.get(kind).map(|f| f(instance))
    }

    pub fn variables(&self, kind: &str, instance: &str) -> Option<Arc<dyn Cache<String, Value>>> {
        self.variables.get(kind).map(|f| f(instance))
    }
}

/// 不参与后台刷新的纯内存缓存（Goal 变量、Agent 变量等默认使用）
pub fn local_cache<K, V>(name: impl Into<String>) -> Arc<dyn Cache<K, V>>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    Arc::new(SyncedCache::new(name, NoopBackend, CacheSettings::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_kinds_are_available() {
        let catalog = CacheCatalog::with_builtin(CacheSettings::default(), None);
        assert!(catalog.history(SIMPLE_CACHE, "h").is_some());
        assert!(catalog.transcript(MEMORY_CACHE, "t").is_some());
        assert!(catalog.variables(SIMPLE_CACHE, "v").is_some());
        assert!(catalog.variables("redis", "v").is_none());
    }

    #[test]
    fn test_builtin_registers_with_refresher() {
        let refresher = Arc::new(CacheRefresher::new(
            std::time::Duration::ZERO,
            std::time::Duration::from_secs(300),
        ));
        let catalog = CacheCatalog::with_builtin(CacheSettings::default(), Some(refresher.clone()));
        let _a = catalog.variables(SIMPLE_CACHE, "a");
        let _b = catalog.history(MEMORY_CACHE, "b");
        assert_eq!(refresher.len(), 2);
    }

    #[test]
    fn test_instances_are_independent() {
        let catalog = CacheCatalog::with_builtin(CacheSettings::default(), None);
        let a = catalog.variables(MEMORY_CACHE, "a").unwrap();
        let b = catalog.variables(MEMORY_CACHE, "b").unwrap();
        a.save("k".to_string(), Value::from(1));
        assert_eq!(b.get(&"k".to_string()), None);
    }

    #[test]
    fn test_custom_factory_overrides() {
        let mut catalog = CacheCatalog::new();
        catalog.register_transcript("custom", Arc::new(|name: &str| local_cache::<String, String>(name)));
        assert!(catalog.transcript("custom", "x").is_some());
        assert!(catalog.transcript(SIMPLE_CACHE, "x").is_none());
    }
}
