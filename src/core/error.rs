//! 错误分类：配置错误 / 输入错误 / 内部错误
//!
//! 每个错误都带机器可读的错误码、内部诊断信息，以及可展示给用户的提示。
//! 编排循环捕获全部错误并只向调用方返回 bool。

use thiserror::Error;

/// 错误码
pub mod codes {
    /// Agent / Agent 池的输入问题（无法调用、池名无效）
    pub const AGENT_INPUT: &str = "1001";
    /// 配置缺失或无效
    pub const CONFIG_MISSING: &str = "6003";
    /// 缺少 Goal / Agent / 池 / I/O 处理器
    pub const NOT_FOUND: &str = "8002";
    /// Agent 执行中的意外错误
    pub const AGENT_FAILED: &str = "8009";
    /// 会话已关闭或执行被中断
    pub const INTERRUPTED: &str = "8010";
    /// Agent 超时或超过单条消息步数上限
    pub const STEP_LIMIT: &str = "8011";
}

const DEFAULT_USER_MESSAGE: &str = "Something went wrong while handling your request.";

/// 框架错误
#[derive(Error, Debug, Clone)]
pub enum HiveError {
    /// 创建会话时的配置缺失/无效；不会产出会话
    #[error("configuration error [{code}]: {detail}")]
    Configuration {
        code: &'static str,
        detail: String,
        user_message: String,
    },

    /// 请求格式错误或 Agent 无法调用
    #[error("input error [{code}]: {detail}")]
    Input {
        code: &'static str,
        detail: String,
        user_message: String,
    },

    /// 缺少 Goal/Agent/池，或其他意外错误
    #[error("internal error [{code}]: {detail}")]
    Internal {
        code: &'static str,
        detail: String,
        user_message: String,
    },
}

/// 错误类别（不含细节，便于匹配）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Input,
    Internal,
}

impl HiveError {
    pub fn configuration(code: &'static str, detail: impl Into<String>) -> Self {
        Self::Configuration {
            code,
            detail: detail.into(),
            user_message: DEFAULT_USER_MESSAGE.to_string(),
        }
    }

    pub fn input(code: &'static str, detail: impl Into<String>) -> Self {
        Self::Input {
            code,
            detail: detail.into(),
            user_message: DEFAULT_USER_MESSAGE.to_string(),
        }
    }

    pub fn internal(code: &'static str, detail: impl Into<String>) -> Self {
        Self::Internal {
            code,
            detail: detail.into(),
            user_message: DEFAULT_USER_MESSAGE.to_string(),
        }
    }

    /// 替换面向用户的提示
    pub fn with_user_message(mut self, message: impl Into<String>) -> Self {
        match &mut self {
            Self::Configuration { user_message, .. }
            | Self::Input { user_message, .. }
            | Self::Internal { user_message, .. } => *user_message = message.into(),
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Input { .. } => ErrorKind::Input,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration { code, .. } | Self::Input { code, .. } | Self::Internal { code, .. } => *code,
        }
    }

    /// 内部诊断信息（只写日志，不展示给用户）
    pub fn detail(&self) -> &str {
        match self {
            Self::Configuration { detail, .. } | Self::Input { detail, .. } | Self::Internal { detail, .. } => detail,
        }
    }

    pub fn user_message(&self) -> &str {
        match self {
            Self::Configuration { user_message, .. }
            | Self::Input { user_message, .. }
            | Self::Internal { user_message, .. } => user_message,
        }
    }
}
