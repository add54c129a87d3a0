//! 应用配置：从 config/hive.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__CACHE__SYNC_ON_CHANGE=true`）。
//! 会话段中的字段均为 Option，缺失项在创建会话时报配置错误，而不是在加载时。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/hive.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub orchestrator: OrchestratorSection,
    /// 会话模板：名称 -> 定义
    #[serde(default)]
    pub sessions: HashMap<String, SessionSection>,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    /// 写入日志上下文的应用名
    #[serde(default = "default_app_name")]
    pub name: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: default_app_name(),
        }
    }
}

fn default_app_name() -> String {
    "hive".to_string()
}

/// [cache] 段：回写与后台刷新
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    /// 变更后立即 sink，否则进入待写队列等待 refresh
    #[serde(default)]
    pub sync_on_change: bool,
    /// 同一缓存两次刷新的最小间隔（毫秒）
    #[serde(default = "default_min_refresh_ms")]
    pub min_refresh_ms: u64,
    /// 后台扫描间隔（秒）
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// 待写队列告警阈值（0 关闭告警）
    #[serde(default = "default_pending_warn_threshold")]
    pub pending_warn_threshold: usize,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            sync_on_change: false,
            min_refresh_ms: default_min_refresh_ms(),
            refresh_interval_secs: default_refresh_interval_secs(),
            pending_warn_threshold: default_pending_warn_threshold(),
        }
    }
}

fn default_min_refresh_ms() -> u64 {
    5000
}

fn default_refresh_interval_secs() -> u64 {
    300
}

fn default_pending_warn_threshold() -> usize {
    10_000
}

/// [orchestrator] 段
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSection {
    /// 单次 Agent 调用超时（秒），0 表示不限
    #[serde(default)]
    pub agent_timeout_secs: u64,
    /// 单条入站消息最多调用 Agent 的次数
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            agent_timeout_secs: 0,
            max_steps: default_max_steps(),
        }
    }
}

fn default_max_steps() -> usize {
    64
}

/// [sessions.<name>] 段：一个会话模板
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SessionSection {
    /// 有序 Goal 列表
    pub goals: Option<Vec<GoalEntry>>,
    pub caches: Option<SessionCaches>,
    /// 绑定的 Agent 池名
    pub agent_pool: Option<String>,
    /// 绑定的 I/O 处理器名
    pub io_handler: Option<String>,
}

/// Goal 配置项
#[derive(Debug, Clone, Deserialize)]
pub struct GoalEntry {
    pub label: String,
    #[serde(default)]
    pub default: bool,
}

/// [sessions.<name>.caches] 段：三类会话缓存引用的实现名
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SessionCaches {
    pub agent_history: Option<String>,
    pub transcript: Option<String>,
    pub variables: Option<String>,
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/hive.toml、../config/hive.toml、hive.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/hive", "../config/hive", "hive"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
