pub mod config;
pub mod engine;
pub mod error;
pub mod evaluate;
pub mod mnist;
pub mod performance_log;
pub mod pipeline;
pub mod session;
pub mod train;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
