//! Core types and abstractions for the Trellis graph database.
//!
//! This crate provides the entity model, filter and enumeration types, the
//! error taxonomy, configuration, and the storage traits the traversal and
//! vector engines are written against.

pub mod config;
pub mod error;
pub mod id;
pub mod traits;
pub mod types;

pub use config::TrellisConfig;
pub use error::{Result, TrellisError};
pub use id::TrellisId;
pub use traits::*;
pub use types::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::TrellisConfig;
    pub use crate::error::{Result, TrellisError};
    pub use crate::id::TrellisId;
    pub use crate::traits::*;
    pub use crate::types::*;
}
