// Live Watermark Library
// Watermarks every eligible image inside a managed container of a document

pub mod config;
pub mod document;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod watermark;
