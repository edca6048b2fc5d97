pub mod client;
pub mod decoder;
pub mod ingest;

pub use ingest::Ingestor;
