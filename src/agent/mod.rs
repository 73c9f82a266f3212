//! The autonomous database agent.
//!
//! [`orchestrator::Orchestrator`] runs one iteration per call. The other
//! modules are the pieces it composes: prompt and schema builders over the
//! [`manifest::ToolManifest`], model backends, the reply normalizer, the
//! planning journal and the session store seam.

pub mod blackboard;
pub mod llm;
pub mod manifest;
pub mod normalize;
pub mod orchestrator;
pub mod prompt;
pub mod schema;
pub mod session;
pub mod toolbox;

pub use blackboard::EntryType;
pub use llm::{ChatMessage, ConfiguredRouter, LlmBackend, ModelFamily, ModelRouter};
pub use normalize::{normalize, AgentResponse, AgentStatus, Operation};
pub use orchestrator::{IterationRequest, IterationResult, Orchestrator};
pub use session::{
    AgentMessage, AgentSession, AgentStore, BlackboardEntry, MessageRole, MigrationRecord, SessionStatus,
};
pub use toolbox::{PgToolRunners, SqlToolbox, ToolRunner, ToolRunnerFactory};
