pub mod config;
pub mod decompressor;
pub mod error;
pub mod fetcher;
pub mod harvest;
pub mod layout;
pub mod locator;
pub mod manifest;
pub mod model;
pub mod orchestrator;
pub mod parser_adapter;
pub mod pipeline;
pub mod progress;
pub mod telemetry;

pub use error::*;
pub use model::*;
pub use telemetry::init_tracing;
