//! I/O 处理器：承接一条入站消息与其所属会话，记录编排结果与 Agent 的输出
//!
//! 每次 process() 都按会话绑定的处理器名，从 HandlerRegistry 新建一个实例。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use crate::core::SessionState;
use crate::sync::lock;

/// 内置处理器名
pub const BUFFERED_HANDLER: &str = "buffered";

/// I/O 处理器契约（外部协作者实现）
pub trait InputOutputHandler: Send + Sync {
    /// 绑定原始入站消息
    fn set_input(&self, message: &str);

    fn input(&self) -> Option<String>;

    /// 绑定所属会话
    fn bind_session(&self, session: &Arc<SessionState>);

    fn session(&self) -> Option<Arc<SessionState>>;

    /// 编排循环的结果
    fn set_status(&self, ok: bool);

    /// 尚未完成时为 None
    fn status(&self) -> Option<bool>;

    /// Agent 向调用方输出一段文本
    fn reply(&self, text: String);

    fn replies(&self) -> Vec<String>;
}

/// 在内存中缓存输入、结果与回复的处理器
#[derive(Default)]
pub struct BufferedHandler {
    input: Mutex<Option<String>>,
    session: Mutex<Weak<SessionState>>,
    status: Mutex<Option<bool>>,
    replies: Mutex<Vec<String>>,
}

impl BufferedHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InputOutputHandler for BufferedHandler {
    fn set_input(&self, message: &str) {
        *lock(&self.input) = Some(message.to_string());
    }

    fn input(&self) -> Option<String> {
        lock(&self.input).clone()
    }

    fn bind_session(&self, session: &Arc<SessionState>) {
        *lock(&self.session) = Arc::downgrade(session);
    }

    fn session(&self) -> Option<Arc<SessionState>> {
        lock(&self.session).upgrade()
    }

    fn set_status(&self, ok: bool) {
        *lock(&self.status) = Some(ok);
    }

    fn status(&self) -> Option<bool> {
        *lock(&self.status)
    }

    fn reply(&self, text: String) {
        lock(&self.replies).push(text);
    }

    fn replies(&self) -> Vec<String> {
        lock(&self.replies).clone()
    }
}

pub type HandlerFactory = Arc<dyn Fn() -> Arc<dyn InputOutputHandler> + Send + Sync>;

/// 处理器名 -> 工厂
#[derive(Default)]
pub struct HandlerRegistry {
    factories: HashMap<String, HandlerFactory>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置 `buffered` 处理器
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(BUFFERED_HANDLER, Arc::new(|| -> Arc<dyn InputOutputHandler> {
            Arc::new(BufferedHandler::new())
        }));
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: HandlerFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// 按名创建新实例
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn InputOutputHandler>> {
        self.factories.get(name).map(|f| f())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_handler_records_everything() {
        let handler = BufferedHandler::new();
        assert_eq!(handler.status(), None);

        handler.set_input("hello");
        handler.reply("hi".to_string());
        handler.set_status(true);

        assert_eq!(handler.input().as_deref(), Some("hello"));
        assert_eq!(handler.replies(), vec!["hi".to_string()]);
        assert_eq!(handler.status(), Some(true));
        assert!(handler.session().is_none());
    }

    #[test]
    fn test_registry_creates_fresh_instances() {
        let registry = HandlerRegistry::with_builtin();
        let a = registry.resolve(BUFFERED_HANDLER).unwrap();
        let b = registry.resolve(BUFFERED_HANDLER).unwrap();
        a.set_status(false);
        assert_eq!(b.status(), None);
        assert!(registry.resolve("websocket").is_none());
    }
}
