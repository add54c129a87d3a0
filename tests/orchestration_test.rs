//! 编排集成测试：从配置组装 Hive，经会话处理消息

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use hive::agent::{Agent, AgentDefinition, AgentFailure};
use hive::cache::Cache;
use hive::config::{AppConfig, GoalEntry, SessionCaches, SessionSection};
use hive::core::{codes, ErrorKind, StatelessOrchestrator};
use hive::io::{BufferedHandler, InputOutputHandler};
use hive::model::ExecutionState;
use hive::{Hive, HiveBuilder};

fn goal(label: &str, default: bool) -> GoalEntry {
    GoalEntry {
        label: label.to_string(),
        default,
    }
}

fn config_with(goals: Vec<GoalEntry>) -> AppConfig {
    let mut config = AppConfig::default();
    config.sessions.insert(
        "support".to_string(),
        SessionSection {
            goals: Some(goals),
            caches: Some(SessionCaches {
                agent_history: Some("simple".to_string()),
                transcript: Some("memory".to_string()),
                variables: Some("simple".to_string()),
            }),
            agent_pool: Some("support".to_string()),
            io_handler: Some("buffered".to_string()),
        },
    );
    config
}

fn config() -> AppConfig {
    config_with(vec![goal("greeting", true), goal("billing", false)])
}

fn buffered() -> Arc<dyn InputOutputHandler> {
    Arc::new(BufferedHandler::new())
}

/// 回复所见 Task 的文本；标记为 "multi" 的 Task 第一次只推进一步，不关闭
struct Stepper;

#[async_trait]
impl Agent for Stepper {
    async fn invoke(
        &self,
        state: &mut ExecutionState,
        _variables: &dyn Cache<String, Value>,
    ) -> Result<bool, AgentFailure> {
        let text = state.task().text().unwrap_or_default().to_string();
        state.reply(text.clone());

        let seen_before = state
            .history()
            .entries()
            .iter()
            .any(|e| Arc::ptr_eq(&e.task, state.task()));
        if text == "multi" && !seen_before {
            state.record_action("started multi-step task");
            return Ok(false);
        }
        state.record_action("finished");
        state.complete_task();
        Ok(true)
    }
}

/// 回复自己的名字并关闭 Task
struct Named(&'static str);

#[async_trait]
impl Agent for Named {
    async fn invoke(
        &self,
        state: &mut ExecutionState,
        _variables: &dyn Cache<String, Value>,
    ) -> Result<bool, AgentFailure> {
        state.reply(self.0);
        state.complete_task();
        Ok(false)
    }
}

enum Misbehave {
    Unavailable,
    Fail,
    Panic,
    Hang,
    Spin,
}

#[async_trait]
impl Agent for Misbehave {
    async fn invoke(
        &self,
        _state: &mut ExecutionState,
        _variables: &dyn Cache<String, Value>,
    ) -> Result<bool, AgentFailure> {
        match self {
            Misbehave::Unavailable => Err(AgentFailure::Unavailable("no such endpoint".to_string())),
            Misbehave::Fail => Err(anyhow::anyhow!("backend exploded").into()),
            Misbehave::Panic => panic!("agent bug"),
            Misbehave::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(false)
            }
            // 从不关闭 Task 却一直要求继续
            Misbehave::Spin => Ok(true),
        }
    }
}

fn hive_with(agent: AgentDefinition) -> Hive {
    HiveBuilder::new(config())
        .agent(agent, &["support"])
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_no_agents_reports_failure() {
    let hive = HiveBuilder::new(config_with(vec![goal("greeting", true)]))
        .build()
        .unwrap();
    let session = hive.session("support", None).unwrap();

    let handler = session.process("hello").wait().await.unwrap();
    assert_eq!(handler.status(), Some(false));
    assert_eq!(handler.input().as_deref(), Some("hello"));

    let err = hive
        .engine()
        .step(&session, "hello again", &buffered())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(err.code(), codes::NOT_FOUND);
}

#[tokio::test]
async fn test_no_default_goal_reports_failure() {
    let hive = HiveBuilder::new(config_with(vec![goal("greeting", false)]))
        .agent(AgentDefinition::new("stepper", Stepper).for_all_goals(), &["support"])
        .build()
        .unwrap();
    let session = hive.session("support", None).unwrap();

    let handler = session.process("hello").wait().await.unwrap();
    assert_eq!(handler.status(), Some(false));
    assert!(handler.replies().is_empty());
}

#[tokio::test]
async fn test_head_task_continues_before_new_message() {
    let hive = hive_with(AgentDefinition::new("stepper", Stepper).for_all_goals());
    let session = hive.session("support", None).unwrap();
    let greeting = session.default_goal().unwrap();

    let first = session.process("multi").wait().await.unwrap();
    assert_eq!(first.status(), Some(true));
    assert_eq!(first.replies(), vec!["multi"]);
    assert_eq!(greeting.task_count(), 1);
    let pending = greeting.head_task().unwrap();
    assert_eq!(pending.text(), Some("multi"));

    let second = session.process("next").wait().await.unwrap();
    assert_eq!(second.status(), Some(true));
    assert_eq!(second.replies(), vec!["multi", "next"]);
    assert!(pending.is_closed());
    assert_eq!(greeting.task_count(), 0);

    let history = session.agent_history().get(&"stepper".to_string()).unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history.entries()[0].task.text(), Some("multi"));
    assert_eq!(history.entries()[1].task.text(), Some("multi"));
    assert_eq!(history.entries()[2].task.text(), Some("next"));
    assert_eq!(history.entries()[0].goal.label(), "greeting");
    assert_eq!(history.action_count(), 3);
}

#[tokio::test]
async fn test_wildcard_and_explicit_affinity_routing() {
    let hive = HiveBuilder::new(config())
        .agent(AgentDefinition::new("biller", Named("biller")).with_goals(["billing"]), &["support"])
        .agent(AgentDefinition::new("router", Named("router")).for_all_goals(), &["support"])
        .build()
        .unwrap();
    let pool = hive.pools().get("support").unwrap();
    assert_eq!(pool.agents_for_goal("greeting"), vec!["router"]);
    assert_eq!(pool.agents_for_goal("billing"), vec!["biller", "router"]);

    let session = hive.session("support", None).unwrap();
    let handler = session.process("hi").wait().await.unwrap();
    assert_eq!(handler.replies(), vec!["router"]);

    assert!(session.activate_goal("billing"));
    let handler = session.process("invoice please").wait().await.unwrap();
    assert_eq!(handler.replies(), vec!["biller"]);
}

#[tokio::test]
async fn test_agent_failures_are_classified() {
    let cases = [
        (Misbehave::Unavailable, ErrorKind::Input, codes::AGENT_INPUT),
        (Misbehave::Fail, ErrorKind::Internal, codes::AGENT_FAILED),
        (Misbehave::Panic, ErrorKind::Internal, codes::AGENT_FAILED),
    ];
    for (agent, kind, code) in cases {
        let hive = hive_with(AgentDefinition::new("bad", agent).for_all_goals());
        let session = hive.session("support", None).unwrap();

        let err = hive.engine().step(&session, "x", &buffered()).await.unwrap_err();
        assert_eq!(err.kind(), kind);
        assert_eq!(err.code(), code);

        let handler = session.process("y").wait().await.unwrap();
        assert_eq!(handler.status(), Some(false));
    }
}

#[tokio::test]
async fn test_agent_timeout_and_step_limit() {
    let hive = hive_with(AgentDefinition::new("hang", Misbehave::Hang).for_all_goals());
    let session = hive.session("support", None).unwrap();
    let engine = StatelessOrchestrator::new(Arc::clone(hive.pools()))
        .with_agent_timeout(Some(Duration::from_millis(50)));
    let err = engine.step(&session, "x", &buffered()).await.unwrap_err();
    assert_eq!(err.code(), codes::STEP_LIMIT);

    let hive = hive_with(AgentDefinition::new("spin", Misbehave::Spin).for_all_goals());
    let session = hive.session("support", None).unwrap();
    let engine = StatelessOrchestrator::new(Arc::clone(hive.pools())).with_max_steps(3);
    let err = engine.step(&session, "x", &buffered()).await.unwrap_err();
    assert_eq!(err.code(), codes::STEP_LIMIT);
    let history = session.agent_history().get(&"spin".to_string()).unwrap();
    assert_eq!(history.len(), 3);
}

#[tokio::test]
async fn test_unknown_template_is_configuration_error() {
    let hive = hive_with(AgentDefinition::new("stepper", Stepper).for_all_goals());
    let err = hive.session("sales", None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(err.code(), codes::CONFIG_MISSING);
    assert!(!err.user_message().is_empty());
}

#[tokio::test]
async fn test_session_lookup_and_close() {
    let hive = hive_with(AgentDefinition::new("stepper", Stepper).for_all_goals());
    let session = hive.session("support", None).unwrap();
    let id = session.id().to_string();
    assert!(Arc::ptr_eq(&hive.session("support", Some(&id)).unwrap(), &session));

    session.process("hello").wait().await.unwrap();
    assert!(hive.close_session(&id));

    assert!(session.goals().is_empty());
    assert!(session.active_goals().is_empty());
    assert!(session.agent_history().get(&"stepper".to_string()).is_none());
    assert!(!session.variables().save("k".to_string(), Value::from(1)));
    assert!(!session.transcript().put("k".to_string(), "v".to_string()));

    let err = session.process("late").wait().await.err().unwrap();
    assert_eq!(err.code(), codes::INTERRUPTED);

    let registered = hive.refresher().len();
    let fresh = hive.session("support", Some(&id)).unwrap();
    assert_ne!(fresh.id(), id);
    // 新会话注册缓存时，已关闭会话的三个缓存被移除
    assert_eq!(hive.refresher().len(), registered);
    hive.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_messages_on_one_session_are_serialized() {
    let hive = hive_with(AgentDefinition::new("stepper", Stepper).for_all_goals());
    let session = hive.session("support", None).unwrap();

    let handles: Vec<_> = (0..8).map(|i| session.process(format!("m{i}"))).collect();
    for handle in handles {
        let handler = handle.wait().await.unwrap();
        assert_eq!(handler.status(), Some(true));
    }

    assert_eq!(session.default_goal().unwrap().task_count(), 0);
    let history = session.agent_history().get(&"stepper".to_string()).unwrap();
    assert_eq!(history.len(), 8);
}
