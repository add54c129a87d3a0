//! 缓存后端契约与内置实现
//!
//! NoopBackend：不做任何外部同步（source/sink 恒成功，clear 返回 false 且不清数据）；
//! MemoryBackend：进程内共享 Map 作为「外部存储」，多个缓存实例可共享同一份数据。

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use crate::sync::{read, write};

/// 持久化提供方实现的后端：Redis、数据库、文件等都通过它接入
pub trait CacheBackend<K, V>: Send + Sync {
    /// 从外部存储加载到本地 Map
    fn source(&self, data: &mut HashMap<K, V>) -> bool;

    /// 持久化单个键；value 为 None 表示本地已删除
    fn sink(&self, key: &K, value: Option<&V>) -> bool;

    /// 清空本地内容
    fn clear(&self, data: &mut HashMap<K, V>) -> bool;
}

/// 空后端：仅内存缓存，无需外部同步时使用
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBackend;

impl<K, V> CacheBackend<K, V> for NoopBackend {
    fn source(&self, _data: &mut HashMap<K, V>) -> bool {
        true
    }

    fn sink(&self, _key: &K, _value: Option<&V>) -> bool {
        true
    }

    fn clear(&self, _data: &mut HashMap<K, V>) -> bool {
        false
    }
}

/// 进程内存储后端；Clone 后共享同一份数据
#[derive(Debug)]
pub struct MemoryBackend<K, V> {
    store: Arc<RwLock<HashMap<K, V>>>,
}

impl<K, V> Clone for MemoryBackend<K, V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<K, V> Default for MemoryBackend<K, V> {
    fn default() -> Self {
        Self {
            store: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<K, V> MemoryBackend<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置外部数据（模拟已有持久化内容）
    pub fn seed(&self, key: K, value: V) {
        write(&self.store).insert(key, value);
    }

    pub fn stored(&self, key: &K) -> Option<V> {
        read(&self.store).get(key).cloned()
    }

    pub fn len(&self) -> usize {
        read(&self.store).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.store).is_empty()
    }
}

impl<K, V> CacheBackend<K, V> for MemoryBackend<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn source(&self, data: &mut HashMap<K, V>) -> bool {
        let store = read(&self.store);
        data.extend(store.iter().map(|(k, v)| (k.clone(), v.clone())));
        true
    }

    fn sink(&self, key: &K, value: Option<&V>) -> bool {
        let mut store = write(&self.store);
        match value {
            Some(v) => {
                store.insert(key.clone(), v.clone());
            }
            None => {
                store.remove(key);
            }
        }
        true
    }

    fn clear(&self, data: &mut HashMap<K, V>) -> bool {
        data.clear();
        true
    }
}
