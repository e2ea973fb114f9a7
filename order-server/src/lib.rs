//! order-server — order ingest and lookup service
//!
//! Consumes order messages from Kafka, validates and persists each one to
//! PostgreSQL in a single transaction, keeps a bounded LRU cache warm as
//! the read fast path, and serves lookups over HTTP. Messages the pipeline
//! cannot process are routed to a dead-letter topic with diagnostic
//! headers.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod retry;
pub mod state;
pub mod telemetry;
