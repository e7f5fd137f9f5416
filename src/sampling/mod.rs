//! Training sample logging.
//!
//! Samples are handed to a background writer so a slow or failing log never
//! stalls ingestion or queries.

pub mod dispatcher;
pub mod writer;

// Re-export commonly used types
pub use dispatcher::{SampleDispatcher, SamplingStats};
pub use writer::{CsvSampleWriter, Sample, SampleLogError, SampleSink};
