//! 领域模型：Status / Task / Goal / Action / AgentHistory / ExecutionState

pub mod goal;
pub mod history;
pub mod state;
pub mod status;
pub mod task;

pub use goal::Goal;
pub use history::{Action, AgentHistory, HistoryEntry};
pub use state::ExecutionState;
pub use status::{Lifecycle, Status};
pub use task::Task;
