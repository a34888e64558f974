mod connect;
mod error;
mod ingest;

pub use error::Error;
pub use ingest::{GraphStore, IngestBatch};
