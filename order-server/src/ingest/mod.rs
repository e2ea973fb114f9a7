//! Stream ingest pipeline

pub mod consumer;
pub mod dlq;

pub use consumer::IngestConsumer;
pub use dlq::DlqStage;
