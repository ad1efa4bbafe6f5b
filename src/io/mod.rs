//! Input/output helpers.
//!
//! - response payload normalization (`normalize`)
//! - on-disk Parquet batch cache (`cache`)
//! - series/report exports (CSV/JSON) (`export`)

pub mod cache;
pub mod export;
pub mod normalize;

pub use cache::{CacheKey, DiskCache};
pub use export::*;
pub use normalize::{Normalized, ParseStrategy, ParseSummary, normalize_response};
