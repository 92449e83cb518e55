//! Ingestion of externally captured observations.

pub mod gateway;

pub use gateway::{IngestRequest, IngestionGateway};
