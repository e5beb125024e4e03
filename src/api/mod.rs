//! HTTP API layer

pub mod schemas;
pub mod server;

pub use server::{ApiServer, ApiServerConfig};
