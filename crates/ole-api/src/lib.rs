pub mod auth;
pub mod config;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod middleware;
pub mod router;
pub mod session;
pub mod state;
pub mod tracing;

pub use config::ApiConfig;
pub use state::ApiState;
