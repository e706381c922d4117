//! 核心层：回合状态机、检查点、会话管理与编排

pub mod checkpoint;
pub mod error;
pub mod orchestrator;
pub mod session;
pub mod state;

pub use checkpoint::{Checkpoint, CheckpointStore, MemoryCheckpointStore};
pub use error::AgentError;
pub use orchestrator::{create_orchestrator, load_config_or_default, Orchestrator, TurnRequest};
pub use session::{Session, SessionManager};
pub use state::{ToolOutcome, ToolRecord, TurnPhase, TurnReport, TurnState, TurnStatus};
