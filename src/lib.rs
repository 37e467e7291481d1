//! Beacon - a client-side analytics telemetry pipeline.
//!
//! Accepts discrete analytics events, buffers them durably across process
//! restarts, and ships them in batches to a collection endpoint with
//! time-based retry. An adaptive-interval engagement scheduler synthesizes
//! engaged-time heartbeats while a user stays on an article or keeps a
//! video playing.

pub mod buffer;
pub mod clock;
pub mod engagement;
pub mod flush;
pub mod persistence;
pub mod pipeline;
pub mod types;

#[cfg(test)]
pub mod test_utils;

pub use pipeline::{Pipeline, PipelineConfig, PipelineError, VideoTracking};
