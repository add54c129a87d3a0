//! 会话加载：按配置创建会话，并维护 id -> 会话 的目录
//!
//! 配置缺失或引用了未知实现时返回 Configuration 错误，不会产出会话。

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use super::error::{codes, HiveError};
use super::orchestrator::Orchestrator;
use super::session::{SessionParts, SessionState};
use crate::cache::{Cache, CacheCatalog};
use crate::config::{SessionCaches, SessionSection};
use crate::io::HandlerRegistry;
use crate::model::Goal;
use crate::sync::lock;

pub struct SessionLoader {
    application: String,
    templates: HashMap<String, SessionSection>,
    caches: Arc<CacheCatalog>,
    handlers: Arc<HandlerRegistry>,
    engine: Arc<dyn Orchestrator>,
    /// 会话目录
    directory: Arc<dyn Cache<String, Arc<SessionState>>>,
    /// 目录中的 id（缓存接口不支持遍历）
    ids: Mutex<BTreeSet<String>>,
}

fn missing(session: &str, what: &str) -> HiveError {
    HiveError::configuration(
        codes::CONFIG_MISSING,
        format!("{} is not configured for session {}", what, session),
    )
    .with_user_message("This conversation is not available right now.")
}

fn required<'a>(session: &str, what: &str, value: Option<&'a str>) -> Result<&'a str, HiveError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(missing(session, what)),
    }
}

impl SessionLoader {
    pub fn new(
        application: impl Into<String>,
        templates: HashMap<String, SessionSection>,
        caches: Arc<CacheCatalog>,
        handlers: Arc<HandlerRegistry>,
        engine: Arc<dyn Orchestrator>,
        directory: Arc<dyn Cache<String, Arc<SessionState>>>,
    ) -> Self {
        Self {
            application: application.into(),
            templates,
            caches,
            handlers,
            engine,
            directory,
            ids: Mutex::new(BTreeSet::new()),
        }
    }

    /// 已配置的会话模板名（排序）
    pub fn template_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.templates.keys().cloned().collect();
        names.sort();
        names
    }

    /// 按模板创建新会话并登记到目录
    pub fn create(&self, name: &str) -> Result<Arc<SessionState>, HiveError> {
        let section = self
            .templates
            .get(name)
            .ok_or_else(|| missing(name, "session template"))?;

        let goals = build_goals(name, section)?;
        let agent_pool = required(name, "agent pool", section.agent_pool.as_deref())?;
        let io_handler = required(name, "io handler", section.io_handler.as_deref())?;
        if !self.handlers.contains(io_handler) {
            return Err(HiveError::configuration(
                codes::CONFIG_MISSING,
                format!("io handler {} for session {} is not registered", io_handler, name),
            ));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let caches = section
            .caches
            .as_ref()
            .ok_or_else(|| missing(name, "caches section"))?;
        let parts = self.build_parts(name, &id, caches, goals, agent_pool, io_handler)?;

        let session = SessionState::new(
            id.clone(),
            parts,
            Arc::clone(&self.engine),
            Arc::clone(&self.handlers),
        );
        self.directory.save(id.clone(), Arc::clone(&session));
        lock(&self.ids).insert(id);
        tracing::info!(session = %name, id = %session.id(), "Session created");
        Ok(session)
    }

    fn build_parts(
        &self,
        name: &str,
        id: &str,
        caches: &SessionCaches,
        goals: Vec<Arc<Goal>>,
        agent_pool: &str,
        io_handler: &str,
    ) -> Result<SessionParts, HiveError> {
        let history_kind = required(name, "agent history cache", caches.agent_history.as_deref())?;
        let transcript_kind = required(name, "transcript cache", caches.transcript.as_deref())?;
        let variables_kind = required(name, "variables cache", caches.variables.as_deref())?;

        let unknown = |kind: &str| {
            HiveError::configuration(
                codes::CONFIG_MISSING,
                format!("unknown cache implementation {} for session {}", kind, name),
            )
        };
        let agent_history = self
            .caches
            .history(history_kind, &format!("{name}:{id}:agent_history"))
            .ok_or_else(|| unknown(history_kind))?;
        let transcript = self
            .caches
            .transcript(transcript_kind, &format!("{name}:{id}:transcript"))
            .ok_or_else(|| unknown(transcript_kind))?;
        let variables = self
            .caches
            .variables(variables_kind, &format!("{name}:{id}:variables"))
            .ok_or_else(|| unknown(variables_kind))?;

        Ok(SessionParts {
            name: name.to_string(),
            application: self.application.clone(),
            goals,
            agent_history,
            transcript,
            variables,
            agent_pool: agent_pool.to_string(),
            io_handler: io_handler.to_string(),
        })
    }

    /// id 非空且目录中存在时返回已有会话，否则按模板新建
    pub fn get_or_create(&self, name: &str, id: Option<&str>) -> Result<Arc<SessionState>, HiveError> {
        if let Some(id) = id.map(str::trim).filter(|id| !id.is_empty()) {
            if let Some(session) = self.get(id) {
                return Ok(session);
            }
            tracing::debug!(session = %name, id = %id, "Session not found, creating a new one");
        }
        self.create(name)
    }

    pub fn get(&self, id: &str) -> Option<Arc<SessionState>> {
        self.directory.get(&id.to_string()).filter(|s| !s.is_closed())
    }

    /// 从目录移除并关闭会话
    pub fn close(&self, id: &str) -> bool {
        let key = id.to_string();
        let session = self.directory.get(&key);
        lock(&self.ids).remove(id);
        match session {
            Some(session) => {
                self.directory.delete(&key);
                session.close();
                true
            }
            None => false,
        }
    }

    /// 关闭目录中所有会话
    pub fn close_all(&self) -> usize {
        let ids: Vec<String> = lock(&self.ids).iter().cloned().collect();
        ids.iter().filter(|id| self.close(id)).count()
    }

    pub fn len(&self) -> usize {
        lock(&self.ids).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.ids).is_empty()
    }
}

fn build_goals(name: &str, section: &SessionSection) -> Result<Vec<Arc<Goal>>, HiveError> {
    let entries = section
        .goals
        .as_ref()
        .filter(|goals| !goals.is_empty())
        .ok_or_else(|| missing(name, "goal list"))?;
    entries
        .iter()
        .map(|entry| -> Result<Arc<Goal>, HiveError> {
            let label = required(name, "goal label", Some(entry.label.as_str()))?;
            Ok(Goal::new(label, entry.default))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::catalog::local_cache;
    use crate::cache::CacheSettings;
    use crate::config::GoalEntry;
    use crate::core::error::ErrorKind;
    use crate::io::{InputOutputHandler, BUFFERED_HANDLER};
    use async_trait::async_trait;

    struct Accept;

    #[async_trait]
    impl Orchestrator for Accept {
        async fn process(
            &self,
            _session: &Arc<SessionState>,
            _message: &str,
            _handler: &Arc<dyn InputOutputHandler>,
        ) -> bool {
            true
        }
    }

    fn template() -> SessionSection {
        SessionSection {
            goals: Some(vec![
                GoalEntry { label: "greeting".to_string(), default: true },
                GoalEntry { label: "billing".to_string(), default: false },
            ]),
            caches: Some(SessionCaches {
                agent_history: Some("simple".to_string()),
                transcript: Some("memory".to_string()),
                variables: Some("simple".to_string()),
            }),
            agent_pool: Some("support".to_string()),
            io_handler: Some(BUFFERED_HANDLER.to_string()),
        }
    }

    fn loader(section: SessionSection) -> SessionLoader {
        let mut templates = HashMap::new();
        templates.insert("support".to_string(), section);
        SessionLoader::new(
            "hive",
            templates,
            Arc::new(CacheCatalog::with_builtin(CacheSettings::default(), None)),
            Arc::new(HandlerRegistry::with_builtin()),
            Arc::new(Accept),
            local_cache("sessions"),
        )
    }

    #[test]
    fn test_create_builds_session_from_template() {
        let loader = loader(template());
        let session = loader.create("support").unwrap();

        assert_eq!(session.name(), "support");
        assert_eq!(session.goals().len(), 2);
        assert_eq!(session.default_goal().unwrap().label(), "greeting");
        assert_eq!(session.agent_pool().as_deref(), Some("support"));
        assert!(Arc::ptr_eq(&loader.get(session.id()).unwrap(), &session));
        assert_eq!(loader.len(), 1);
    }

    #[test]
    fn test_missing_entries_are_configuration_errors() {
        let cases: Vec<Box<dyn Fn(&mut SessionSection)>> = vec![
            Box::new(|s: &mut SessionSection| s.goals = None),
            Box::new(|s: &mut SessionSection| s.goals = Some(Vec::new())),
            Box::new(|s: &mut SessionSection| s.agent_pool = None),
            Box::new(|s: &mut SessionSection| s.io_handler = Some("websocket".to_string())),
            Box::new(|s: &mut SessionSection| s.caches = None),
            Box::new(|s: &mut SessionSection| {
                if let Some(c) = s.caches.as_mut() {
                    c.variables = Some("redis".to_string());
                }
            }),
        ];
        for mutate in cases {
            let mut section = template();
            mutate(&mut section);
            let loader = loader(section);
            let err = loader.create("support").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration);
            assert_eq!(err.code(), codes::CONFIG_MISSING);
            assert!(loader.is_empty());
        }

        let err = loader(template()).create("sales").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_get_or_create_reuses_known_id() {
        let loader = loader(template());
        let first = loader.get_or_create("support", None).unwrap();
        let same = loader.get_or_create("support", Some(first.id())).unwrap();
        assert!(Arc::ptr_eq(&first, &same));

        let blank = loader.get_or_create("support", Some("  ")).unwrap();
        assert!(!Arc::ptr_eq(&first, &blank));

        let unknown = loader.get_or_create("support", Some("nope")).unwrap();
        assert_ne!(unknown.id(), "nope");
    }

    #[test]
    fn test_close_removes_and_closes() {
        let loader = loader(template());
        let session = loader.create("support").unwrap();
        let id = session.id().to_string();

        assert!(loader.close(&id));
        assert!(session.is_closed());
        assert!(loader.get(&id).is_none());
        assert!(!loader.close(&id));

        loader.create("support").unwrap();
        loader.create("support").unwrap();
        assert_eq!(loader.close_all(), 2);
        assert!(loader.is_empty());
    }
}
