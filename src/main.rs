//! Hive 演示入口
//!
//! 加载配置，注册一个回显 Agent，从标准输入逐行读取消息并打印回复。
//! 未配置任何会话时使用内置的 `demo` 会话模板。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};

use hive::agent::{Agent, AgentDefinition, AgentFailure};
use hive::cache::Cache;
use hive::config::{load_config, AppConfig, GoalEntry, SessionCaches, SessionSection};
use hive::io::BUFFERED_HANDLER;
use hive::model::ExecutionState;
use hive::observability;
use hive::HiveBuilder;

const DEMO_SESSION: &str = "demo";
const DEMO_POOL: &str = "demo";

/// 回显消息，并在会话变量里累计处理次数
struct EchoAgent;

#[async_trait]
impl Agent for EchoAgent {
    async fn invoke(
        &self,
        state: &mut ExecutionState,
        _variables: &dyn Cache<String, Value>,
    ) -> Result<bool, AgentFailure> {
        let text = state
            .task()
            .text()
            .ok_or_else(|| AgentFailure::Unavailable("task payload is not text".to_string()))?
            .to_string();

        let session = Arc::clone(state.session());
        let key = "echo_count".to_string();
        let count = session
            .variables()
            .get(&key)
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
            + 1;
        session.variables().put(key, Value::from(count));
        session
            .transcript()
            .save(format!("{count:06}"), text.clone());

        state.reply(format!("[{count}] {text}"));
        state.record_action(format!("echoed {} chars", text.chars().count()));
        state.complete_task();
        Ok(false)
    }
}

fn with_demo_session(mut config: AppConfig) -> AppConfig {
    if config.sessions.is_empty() {
        config.sessions.insert(
            DEMO_SESSION.to_string(),
            SessionSection {
                goals: Some(vec![GoalEntry {
                    label: "chat".to_string(),
                    default: true,
                }]),
                caches: Some(SessionCaches {
                    agent_history: Some("simple".to_string()),
                    transcript: Some("memory".to_string()),
                    variables: Some("simple".to_string()),
                }),
                agent_pool: Some(DEMO_POOL.to_string()),
                io_handler: Some(BUFFERED_HANDLER.to_string()),
            },
        );
    }
    config
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path).context("Failed to load config")?;
    let config = with_demo_session(config);

    let mut names: Vec<String> = config.sessions.keys().cloned().collect();
    names.sort();
    let session_name = names
        .first()
        .cloned()
        .context("No session template configured")?;
    let pool_names: Vec<String> = config
        .sessions
        .values()
        .filter_map(|s| s.agent_pool.clone())
        .collect();

    let hive = HiveBuilder::new(config)
        .agent(
            AgentDefinition::new("echo", EchoAgent)
                .with_description("Echoes every message back")
                .for_all_goals(),
            pool_names.as_slice(),
        )
        .build()
        .context("Failed to assemble hive")?;
    hive.start_refresher();

    let session = hive
        .session(&session_name, None)
        .context("Failed to create session")?;
    tracing::info!(session = %session_name, id = %session.id(), "Ready, type messages (Ctrl+D to quit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match session.process(line).wait().await {
            Ok(handler) => {
                for reply in handler.replies() {
                    println!("{reply}");
                }
                if handler.status() != Some(true) {
                    eprintln!("(message was not handled)");
                }
            }
            Err(e) => eprintln!("{}", e.user_message()),
        }
    }

    hive.shutdown().await;
    Ok(())
}
