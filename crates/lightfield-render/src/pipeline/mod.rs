//! Pipeline management system

mod cache;

pub use cache::{PipelineCache, PipelineKey};
