pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod schema;
pub mod table;

pub use error::{PipelineError, Result};
