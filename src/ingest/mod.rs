//! Sample ingestion: timestamped samples and per-channel stream buffers.

pub mod buffer;
pub mod types;

pub use buffer::{SampleRange, StreamBuffer};
pub use types::{IngestError, IngestReport, PushOutcome, Sample};
