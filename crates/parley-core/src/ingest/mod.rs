//! Chat message ingestion: envelope decoding, sequence allocation, the
//! per-delivery pipeline, and the queue consumer loop that drives it.

pub mod allocator;
pub mod consumer;
pub mod envelope;
pub mod pipeline;
