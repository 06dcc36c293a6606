//! HTTP surface for the EventVista image generator.

pub mod config;
pub mod encode;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use config::Args;
pub use error::{ApiError, Result};
pub use routes::router;
pub use state::{AppState, PipelineState};
