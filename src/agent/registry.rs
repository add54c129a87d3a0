//! Agent 注册表：启动阶段显式注册，按池名归组
//!
//! 由组合根持有并以引用传给各 AgentPool，没有进程级静态表。

use std::collections::HashMap;
use std::sync::Arc;

use super::AgentDefinition;

#[derive(Default)]
pub struct AgentRegistry {
    pools: HashMap<String, Vec<Arc<AgentDefinition>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 把同一个定义注册到若干池
    pub fn register<S: AsRef<str>>(&mut self, definition: AgentDefinition, pools: &[S]) -> Arc<AgentDefinition> {
        let definition = Arc::new(definition);
        if pools.is_empty() {
            tracing::warn!(agent = definition.name(), "Agent registered without any pool");
        }
        for pool in pools {
            self.pools
                .entry(pool.as_ref().to_string())
                .or_default()
                .push(Arc::clone(&definition));
        }
        definition
    }

    /// 某池下按注册顺序排列的定义
    pub fn agents(&self, pool: &str) -> Option<&[Arc<AgentDefinition>]> {
        self.pools.get(pool).map(Vec::as_slice)
    }

    pub fn pool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pools.keys().cloned().collect();
        names.sort();
        names
    }
}
