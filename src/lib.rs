//! Hive - 目标驱动的多 Agent 编排核心
//!
//! 模块划分：
//! - **model**: Status / Task / Goal / Action / AgentHistory 与 Agent 的执行快照
//! - **cache**: 读穿透本地缓存、待写队列、可插拔后端与后台刷新
//! - **agent**: Agent 契约、注册表与按 Goal 选择 Agent 的池
//! - **core**: 会话状态、编排循环、会话加载与组合根
//! - **io**: I/O 处理器契约与注册表
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **observability**: 日志初始化与关联上下文

pub mod agent;
pub mod cache;
pub mod config;
pub mod core;
pub mod io;
pub mod model;
pub mod observability;

mod sync;

pub use crate::core::{Hive, HiveBuilder, HiveError, SessionState};
