//! 可观测性：日志初始化与关联上下文
//!
//! 关联上下文不依赖线程局部状态：提交工作时显式构造 LogContext，
//! 由它生成 span 并通过 `Instrument` 挂到被调度的 future 上，future 结束即脱离。

use tracing::Span;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 安装全局订阅者：默认 info，可通过 RUST_LOG 覆盖。重复调用安全。
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}

/// 一次会话调用的关联标识
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogContext {
    pub application: String,
    /// 会话 id
    pub conversation_id: String,
    /// 单条入站消息的 id
    pub transaction_id: String,
}

impl LogContext {
    pub fn new(application: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            conversation_id: conversation_id.into(),
            transaction_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// 以会话 id 为 conversation_id，新生成 transaction_id
    pub fn for_session(application: impl Into<String>, session_id: &str) -> Self {
        Self::new(application, session_id)
    }

    pub fn with_transaction_id(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = transaction_id.into();
        self
    }

    /// 在提交时的当前 span 之下创建处理 span
    pub fn span(&self, parent: &Span) -> Span {
        tracing::info_span!(
            parent: parent,
            "session.process",
            application = %self.application,
            conversation_id = %self.conversation_id,
            transaction_id = %self.transaction_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_ids() {
        let a = LogContext::for_session("hive", "s-1");
        let b = LogContext::for_session("hive", "s-1");
        assert_eq!(a.conversation_id, "s-1");
        assert_ne!(a.transaction_id, b.transaction_id);

        let fixed = a.with_transaction_id("tx");
        assert_eq!(fixed.transaction_id, "tx");
    }

    #[test]
    fn test_init_is_repeatable() {
        init();
        init();
        let _span = LogContext::new("hive", "c").span(&Span::current());
    }
}
