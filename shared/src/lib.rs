//! Shared types for the order service
//!
//! Domain model and validation rules used by the server crate for both
//! the ingest pipeline and the HTTP read path. Pure data, no I/O.

pub mod models;
pub mod validation;

// Re-exports
pub use models::{Delivery, Item, Order, Payment};
pub use validation::{FieldError, FieldErrors, Validator};
