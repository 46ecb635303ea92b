//! Core types used across the Trellis system.

pub mod entity;
pub mod enumeration;
pub mod filter;
pub mod query;
pub mod traversal;
pub mod vector;

pub use entity::*;
pub use enumeration::*;
pub use filter::*;
pub use query::*;
pub use traversal::*;
pub use vector::*;
