//! 核心编排层：错误分类、会话状态与监管、编排循环、会话加载、组合根

pub mod builder;
pub mod error;
pub mod loader;
pub mod orchestrator;
pub mod session;
pub mod supervisor;

pub use builder::{Hive, HiveBuilder};
pub use error::{codes, ErrorKind, HiveError};
pub use loader::SessionLoader;
pub use orchestrator::{Orchestrator, StatelessOrchestrator, StepOutcome};
pub use session::{ProcessHandle, SessionParts, SessionState};
pub use supervisor::SessionSupervisor;
