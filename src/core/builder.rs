//! 组合根：读取一次配置，显式注册 Agent / I/O 处理器 / 缓存实现 / 选择策略，
//! 组装出 Agent 池、编排器与会话加载器
//!
//! 池的 Goal 集合来自引用该池的会话配置，通配 Agent 据此展开。

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::{codes, HiveError};
use super::loader::SessionLoader;
use super::orchestrator::StatelessOrchestrator;
use super::session::SessionState;
use crate::agent::{AgentDefinition, AgentPool, AgentPools, AgentRegistry, SelectionStrategy};
use crate::cache::{Cache, CacheCatalog, CacheFactory, CacheRefresher, CacheSettings, NoopBackend, SyncedCache};
use crate::config::AppConfig;
use crate::io::{HandlerFactory, HandlerRegistry};
use crate::model::AgentHistory;
use crate::sync::lock;

/// 会话目录缓存的实例名
const SESSION_DIRECTORY: &str = "sessions";

pub struct HiveBuilder {
    config: AppConfig,
    registry: AgentRegistry,
    handlers: HandlerRegistry,
    strategies: HashMap<String, Box<dyn SelectionStrategy>>,
    history_caches: Vec<(String, CacheFactory<AgentHistory>)>,
    transcript_caches: Vec<(String, CacheFactory<String>)>,
    variable_caches: Vec<(String, CacheFactory<Value>)>,
    refresher: Arc<CacheRefresher>,
}

impl HiveBuilder {
    pub fn new(config: AppConfig) -> Self {
        let refresher = Arc::new(CacheRefresher::from_config(&config.cache));
        Self {
            config,
            registry: AgentRegistry::new(),
            handlers: HandlerRegistry::with_builtin(),
            strategies: HashMap::new(),
            history_caches: Vec::new(),
            transcript_caches: Vec::new(),
            variable_caches: Vec::new(),
            refresher,
        }
    }

    /// 共享刷新器；自定义缓存工厂可在创建实例时注册到它
    pub fn refresher(&self) -> Arc<CacheRefresher> {
        Arc::clone(&self.refresher)
    }

    /// 把 Agent 注册到若干池
    pub fn agent<S: AsRef<str>>(mut self, definition: AgentDefinition, pools: &[S]) -> Self {
        self.registry.register(definition, pools);
        self
    }

    pub fn handler(mut self, name: impl Into<String>, factory: HandlerFactory) -> Self {
        self.handlers.register(name, factory);
        self
    }

    /// 为某个池指定选择策略（默认 FirstMatch）
    pub fn strategy(mut self, pool: impl Into<String>, strategy: Box<dyn SelectionStrategy>) -> Self {
        self.strategies.insert(pool.into(), strategy);
        self
    }

    pub fn history_cache(mut self, name: impl Into<String>, factory: CacheFactory<AgentHistory>) -> Self {
        self.history_caches.push((name.into(), factory));
        self
    }

    pub fn transcript_cache(mut self, name: impl Into<String>, factory: CacheFactory<String>) -> Self {
        self.transcript_caches.push((name.into(), factory));
        self
    }

    pub fn variables_cache(mut self, name: impl Into<String>, factory: CacheFactory<Value>) -> Self {
        self.variable_caches.push((name.into(), factory));
        self
    }

    pub fn build(mut self) -> Result<Hive, HiveError> {
        let settings = CacheSettings::from(&self.config.cache);

        let mut catalog = CacheCatalog::with_builtin(settings, Some(Arc::clone(&self.refresher)));
        for (name, factory) in self.history_caches {
            catalog.register_history(name, factory);
        }
        for (name, factory) in self.transcript_caches {
            catalog.register_transcript(name, factory);
        }
        for (name, factory) in self.variable_caches {
            catalog.register_variables(name, factory);
        }

        let pools = Arc::new(build_pools(&self.config, &self.registry, &mut self.strategies));
        if let Some(pool) = self.strategies.keys().next() {
            return Err(HiveError::configuration(
                codes::CONFIG_MISSING,
                format!("selection strategy configured for unknown agent pool {}", pool),
            ));
        }

        let engine = Arc::new(StatelessOrchestrator::from_config(
            Arc::clone(&pools),
            &self.config.orchestrator,
        ));
        let directory: Arc<dyn Cache<String, Arc<SessionState>>> =
            SyncedCache::open(SESSION_DIRECTORY, NoopBackend, settings, Some(&*self.refresher));
        let loader = SessionLoader::new(
            self.config.app.name.clone(),
            self.config.sessions.clone(),
            Arc::new(catalog),
            Arc::new(self.handlers),
            engine.clone(),
            directory,
        );

        tracing::info!(
            pools = pools.names().len(),
            templates = self.config.sessions.len(),
            "Hive assembled"
        );

        Ok(Hive {
            config: self.config,
            pools,
            engine,
            loader,
            refresher: self.refresher,
            shutdown_token: CancellationToken::new(),
            refresher_task: Mutex::new(None),
        })
    }
}

/// 为注册表与会话配置中出现的每个池建立索引
fn build_pools(
    config: &AppConfig,
    registry: &AgentRegistry,
    strategies: &mut HashMap<String, Box<dyn SelectionStrategy>>,
) -> AgentPools {
    let mut pool_goals: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for name in registry.pool_names() {
        pool_goals.entry(name).or_default();
    }

    let mut templates: Vec<_> = config.sessions.iter().collect();
    templates.sort_by(|a, b| a.0.cmp(b.0));
    for (_, section) in templates {
        let Some(pool) = section.agent_pool.as_deref().map(str::trim).filter(|p| !p.is_empty()) else {
            continue;
        };
        let goals = pool_goals.entry(pool.to_string()).or_default();
        for entry in section.goals.iter().flatten() {
            goals.push(entry.label.clone());
        }
    }

    let mut pools = AgentPools::new();
    for (name, goals) in pool_goals {
        let pool = match strategies.remove(&name) {
            Some(strategy) => AgentPool::with_strategy(name.as_str(), strategy),
            None => AgentPool::new(name.as_str()),
        };
        for goal in goals {
            pool.add_goal(goal);
        }
        // 没有 Agent 的池仍然保留：消息处理时报找不到 Agent
        if let Err(e) = pool.configure(registry) {
            tracing::warn!(pool = %name, "Agent pool left empty: {}", e);
        }
        pool.refresh();
        pools.insert(pool);
    }
    pools
}

/// 组装完成的运行时
pub struct Hive {
    config: AppConfig,
    pools: Arc<AgentPools>,
    engine: Arc<StatelessOrchestrator>,
    loader: SessionLoader,
    refresher: Arc<CacheRefresher>,
    shutdown_token: CancellationToken,
    refresher_task: Mutex<Option<JoinHandle<()>>>,
}

impl Hive {
    pub fn builder(config: AppConfig) -> HiveBuilder {
        HiveBuilder::new(config)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn pools(&self) -> &Arc<AgentPools> {
        &self.pools
    }

    pub fn engine(&self) -> &Arc<StatelessOrchestrator> {
        &self.engine
    }

    pub fn refresher(&self) -> &Arc<CacheRefresher> {
        &self.refresher
    }

    pub fn loader(&self) -> &SessionLoader {
        &self.loader
    }

    /// 取已有会话（id 非空且存在）或按模板新建
    pub fn session(&self, name: &str, id: Option<&str>) -> Result<Arc<SessionState>, HiveError> {
        self.loader.get_or_create(name, id)
    }

    pub fn find_session(&self, id: &str) -> Option<Arc<SessionState>> {
        self.loader.get(id)
    }

    pub fn close_session(&self, id: &str) -> bool {
        self.loader.close(id)
    }

    /// 启动后台缓存刷新；已启动时返回 false。需在 tokio 运行时内调用。
    pub fn start_refresher(&self) -> bool {
        let mut task = lock(&self.refresher_task);
        if task.is_some() || self.shutdown_token.is_cancelled() {
            return false;
        }
        *task = Some(self.refresher.spawn(self.shutdown_token.child_token()));
        tracing::info!(interval = ?self.refresher.interval(), "Cache refresher started");
        true
    }

    /// 停止后台刷新并关闭所有会话
    pub async fn shutdown(&self) {
        self.shutdown_token.cancel();
        let task = lock(&self.refresher_task).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!("Cache refresher task failed: {}", e);
            }
        }
        let closed = self.loader.close_all();
        tracing::info!(sessions = closed, "Hive shut down");
    }
}
