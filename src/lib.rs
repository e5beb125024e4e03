//! Pulse - Engineering Activity Radar
//!
//! A web backend that aggregates engineering-activity signals (GitHub
//! events, Linear issues) into an idempotent event log, computes rolling
//! metrics, and produces ranked "next best action" recommendations using
//! multi-factor scoring blended with optional LLM prose reasoning.
//!
//! # Architecture
//!
//! The system is organized into several layers:
//! - **Types**: Core data structures (Event, ContextSnapshot, etc.)
//! - **Storage**: libsql-backed event/cursor/journey/recommendation stores
//! - **Ingest**: GitHub and Linear normalization pipelines
//! - **Context**: multi-layer snapshot aggregation with per-layer degradation
//! - **Engine**: candidate enumeration, scoring, reasoning, assembly
//! - **Api**: axum HTTP surface
//!
//! # Example
//!
//! ```ignore
//! use pulse_core::{ApiServer, ApiServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = pulse_core::config::Settings::from_env()?;
//!     let storage = pulse_core::storage::libsql::LibsqlStorage::from_path(
//!         &settings.database_url,
//!     )
//!     .await?;
//!     // ... wire up the engine and serve
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod report;
pub mod services;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use api::{ApiServer, ApiServerConfig};
pub use config::Settings;
pub use context::ContextBuilder;
pub use engine::PriorityEngine;
pub use error::{PulseError, Result};
pub use services::{LlmConfig, LlmService, ReasoningBackend};
pub use storage::{libsql::LibsqlStorage, Storage};
pub use types::{
    ContextSnapshot, Event, EventSource, InsertOutcome, JourneyState, MetricsData,
    PriorityRecommendation,
};
