//! Storage adapters for Trellis.
//!
//! The engines in `trellis-graph` and `trellis-vector` only speak the
//! [`trellis_core::Storage`] and [`trellis_core::Repository`] traits. This
//! crate provides the in-memory implementation used for embedding and tests.

mod matcher;
mod memory;

pub use memory::MemoryStorage;
