//! Process-level plumbing shared by the Lambda binaries.

pub mod config;
pub mod responses;
pub mod state;
pub mod telemetry;

pub use config::{Config, ConfigError, StorageBackend};
pub use state::AppState;
