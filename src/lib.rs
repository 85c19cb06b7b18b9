//! Lane-level traffic congestion inference.
//!
//! The workspace root only hosts the cross-crate integration tests; the engine and service
//! live in `congestion-service`, the shared data model in `common`.

pub use common;
pub use congestion_service;
