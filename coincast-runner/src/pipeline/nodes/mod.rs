//! Concrete pipeline nodes, grouped by stage. Each stage module also exposes
//! its own pipeline.

pub mod inference;
pub mod ingestion;
pub mod processing;
pub mod training;
