pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod state;

pub use config::AnprServiceConfig;
pub use engine::Engines;
pub use error::AnprError;
pub use pipeline::{PipelineConfig, PlatePipeline, PlateResult};
pub use state::AnprState;
