//! Getting demand data: batching, transport, per-batch fetch and assembly.

pub mod assembler;
pub mod batcher;
pub mod cenace;
pub mod fetcher;

pub use assembler::{Assembly, SeriesAssembler};
pub use batcher::RangeBatcher;
pub use cenace::{CenaceClient, Transport};
pub use fetcher::{BatchReport, BatchSource, Fetcher};
