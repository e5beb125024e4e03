//! External service clients consumed by the core

pub mod llm;

pub use llm::{LlmConfig, LlmService, ReasoningBackend};
