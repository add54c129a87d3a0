//! 会话状态：一次对话的 Goal、历史、变量与私有执行上下文
//!
//! process() 立即返回 ProcessHandle，实际工作在会话的 SessionSupervisor 中调度；
//! 同一会话的多次 process() 由步骤锁串行执行，不同会话互不阻塞。

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::error::{codes, HiveError};
use super::orchestrator::Orchestrator;
use super::supervisor::SessionSupervisor;
use crate::cache::Cache;
use crate::io::{HandlerRegistry, InputOutputHandler};
use crate::model::{AgentHistory, Goal};
use crate::observability::LogContext;
use crate::sync::{lock, read, write};

/// 组装一个会话所需的部件（由 SessionLoader 按配置构造）
pub struct SessionParts {
    pub name: String,
    /// 写入日志上下文的应用名
    pub application: String,
    /// 配置顺序的 Goal 列表
    pub goals: Vec<Arc<Goal>>,
    /// Agent 名 -> 该 Agent 的历史
    pub agent_history: Arc<dyn Cache<String, AgentHistory>>,
    /// 会话级（环境级）对话记录
    pub transcript: Arc<dyn Cache<String, String>>,
    /// 会话共享变量
    pub variables: Arc<dyn Cache<String, Value>>,
    pub agent_pool: String,
    pub io_handler: String,
}

pub struct SessionState {
    id: String,
    name: String,
    application: String,
    created_at: DateTime<Utc>,
    goals: RwLock<Vec<Arc<Goal>>>,
    /// 运行时活跃 Goal 队列（与配置列表分离）
    goal_queue: Mutex<VecDeque<Arc<Goal>>>,
    default_goal: RwLock<Option<Arc<Goal>>>,
    agent_history: Arc<dyn Cache<String, AgentHistory>>,
    transcript: Arc<dyn Cache<String, String>>,
    variables: Arc<dyn Cache<String, Value>>,
    agent_pool: RwLock<Option<String>>,
    engine: RwLock<Option<Arc<dyn Orchestrator>>>,
    handler_name: String,
    handlers: Arc<HandlerRegistry>,
    supervisor: SessionSupervisor,
    /// 串行化同一会话的编排步骤
    step_lock: tokio::sync::Mutex<()>,
    closed: AtomicBool,
}

impl SessionState {
    pub fn new(
        id: impl Into<String>,
        parts: SessionParts,
        engine: Arc<dyn Orchestrator>,
        handlers: Arc<HandlerRegistry>,
    ) -> Arc<Self> {
        // 多个默认 Goal 时取第一个
        let default_goal = parts.goals.iter().find(|g| g.is_default()).cloned();
        Arc::new(Self {
            id: id.into(),
            name: parts.name,
            application: parts.application,
            created_at: Utc::now(),
            goals: RwLock::new(parts.goals),
            goal_queue: Mutex::new(VecDeque::new()),
            default_goal: RwLock::new(default_goal),
            agent_history: parts.agent_history,
            transcript: parts.transcript,
            variables: parts.variables,
            agent_pool: RwLock::new(Some(parts.agent_pool)),
            engine: RwLock::new(Some(engine)),
            handler_name: parts.io_handler,
            handlers,
            supervisor: SessionSupervisor::new(),
            step_lock: tokio::sync::Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// 配置的 Goal 列表快照
    pub fn goals(&self) -> Vec<Arc<Goal>> {
        read(&self.goals).clone()
    }

    /// 按标签查找配置的 Goal
    pub fn goal(&self, label: &str) -> Option<Arc<Goal>> {
        read(&self.goals).iter().find(|g| g.label() == label).cloned()
    }

    pub fn default_goal(&self) -> Option<Arc<Goal>> {
        read(&self.default_goal).clone()
    }

    /// 活跃队列快照（队首在前）
    pub fn active_goals(&self) -> Vec<Arc<Goal>> {
        lock(&self.goal_queue).iter().cloned().collect()
    }

    /// 加入活跃队列队尾
    pub fn push_goal(&self, goal: Arc<Goal>) {
        lock(&self.goal_queue).push_back(goal);
    }

    /// 按标签激活一个配置的 Goal；未配置时返回 false
    pub fn activate_goal(&self, label: &str) -> bool {
        match self.goal(label) {
            Some(goal) => {
                self.push_goal(goal);
                true
            }
            None => false,
        }
    }

    /// 活跃队列队首（不出队）
    pub fn current_goal(&self) -> Option<Arc<Goal>> {
        lock(&self.goal_queue).front().cloned()
    }

    /// 出队并关闭队首 Goal
    pub fn remove_goal(&self) -> Option<Arc<Goal>> {
        let goal = lock(&self.goal_queue).pop_front()?;
        goal.close();
        Some(goal)
    }

    pub fn agent_history(&self) -> &Arc<dyn Cache<String, AgentHistory>> {
        &self.agent_history
    }

    pub fn transcript(&self) -> &Arc<dyn Cache<String, String>> {
        &self.transcript
    }

    pub fn variables(&self) -> &Arc<dyn Cache<String, Value>> {
        &self.variables
    }

    /// 绑定的 Agent 池名；关闭后为 None
    pub fn agent_pool(&self) -> Option<String> {
        read(&self.agent_pool).clone()
    }

    pub fn engine(&self) -> Option<Arc<dyn Orchestrator>> {
        read(&self.engine).clone()
    }

    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    pub fn supervisor(&self) -> &SessionSupervisor {
        &self.supervisor
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// 提交一条入站消息，使用新生成的关联上下文
    pub fn process(self: &Arc<Self>, message: impl Into<String>) -> ProcessHandle {
        let context = LogContext::for_session(self.application.clone(), &self.id);
        self.process_with(message, context)
    }

    /// 提交一条入站消息；context 在提交时捕获，随工作单元一起调度，结束即脱离
    pub fn process_with(self: &Arc<Self>, message: impl Into<String>, context: LogContext) -> ProcessHandle {
        if self.is_closed() {
            return ProcessHandle::rejected(
                &self.id,
                HiveError::internal(codes::INTERRUPTED, format!("session {} is closed", self.id)),
            );
        }

        let span = context.span(&tracing::Span::current());
        let session = Arc::clone(self);
        let message = message.into();
        let work = async move { session.run(message).await }.instrument(span);

        ProcessHandle {
            session_id: self.id.clone(),
            pending: Pending::Spawned(self.supervisor.spawn(work)),
        }
    }

    async fn run(self: Arc<Self>, message: String) -> Result<Arc<dyn InputOutputHandler>, HiveError> {
        let handler = self.handlers.resolve(&self.handler_name).ok_or_else(|| {
            HiveError::internal(
                codes::NOT_FOUND,
                format!("io handler {} is not registered", self.handler_name),
            )
        })?;
        handler.set_input(&message);
        handler.bind_session(&self);

        let _turn = self.step_lock.lock().await;
        let engine = self.engine().ok_or_else(|| {
            HiveError::internal(
                codes::INTERRUPTED,
                format!("session {} closed before processing", self.id),
            )
        })?;
        let ok = engine.process(&self, &message, &handler).await;
        handler.set_status(ok);
        Ok(handler)
    }

    /// 关闭会话：清空 Goal、关闭三个缓存、解除池与引擎绑定、中断在途工作。可重复调用。
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        write(&self.goals).clear();
        lock(&self.goal_queue).clear();
        *write(&self.default_goal) = None;

        self.agent_history.close();
        self.transcript.close();
        self.variables.close();

        *write(&self.agent_pool) = None;
        *write(&self.engine) = None;
        self.supervisor.shutdown();
        tracing::info!(session = %self.name, id = %self.id, "Session closed");
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("goals", &read(&self.goals).len())
            .field("active_goals", &lock(&self.goal_queue).len())
            .field("agent_pool", &self.agent_pool())
            .field("handler", &self.handler_name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

type Completion = Option<Result<Arc<dyn InputOutputHandler>, HiveError>>;

enum Pending {
    Spawned(JoinHandle<Completion>),
    Rejected(HiveError),
}

/// process() 的完成句柄
pub struct ProcessHandle {
    session_id: String,
    pending: Pending,
}

impl ProcessHandle {
    fn rejected(session_id: &str, error: HiveError) -> Self {
        Self {
            session_id: session_id.to_string(),
            pending: Pending::Rejected(error),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_finished(&self) -> bool {
        match &self.pending {
            Pending::Spawned(handle) => handle.is_finished(),
            Pending::Rejected(_) => true,
        }
    }

    /// 等待完成，返回写入了结果的 I/O 处理器；会话关闭导致的中断为 Internal 错误
    pub async fn wait(self) -> Result<Arc<dyn InputOutputHandler>, HiveError> {
        match self.pending {
            Pending::Rejected(e) => Err(e),
            Pending::Spawned(handle) => match handle.await {
                Ok(Some(result)) => result,
                Ok(None) => Err(HiveError::internal(
                    codes::INTERRUPTED,
                    format!("session {} closed while processing", self.session_id),
                )),
                Err(e) => Err(HiveError::internal(
                    codes::INTERRUPTED,
                    format!("processing in session {} aborted: {}", self.session_id, e),
                )),
            },
        }
    }
}
