pub mod agent;
pub mod delegate;
pub mod engine;
pub mod error;
pub mod events;
pub mod registry;
pub mod runner;

pub use agent::Agent;
pub use engine::{EngineRun, LlmEngine, OrchestrationEngine};
pub use error::EngineError;
pub use events::{EngineEvent, EngineEventKind};
pub use registry::ToolRegistry;
pub use runner::RunnerConfig;
