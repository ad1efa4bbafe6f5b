//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the tracked electrical systems (`System`)
//! - normalized demand observations (`DemandPoint`) and request batches (`Batch`)
//! - run configuration (`PipelineConfig`, `Endpoint`, `CachePolicy`)

pub mod types;

pub use types::*;
