//! Shared types for the brain workspace: ids, the session wire protocol,
//! agent/tool declarations, the tool trait, and the model-facing
//! conversation types.

pub mod context;
pub mod declarations;
pub mod errors;
pub mod frames;
pub mod ids;
pub mod messages;
pub mod provider;
pub mod stream;
pub mod tools;
