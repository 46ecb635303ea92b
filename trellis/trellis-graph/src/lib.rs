//! Enumeration and graph traversal engines for Trellis.
//!
//! Everything here is written against the [`trellis_core::Storage`] trait:
//!
//! - [`Enumerator`] - cursor pagination with total/remaining counts, plus
//!   lazy page-at-a-time streams
//! - [`TraversalEngine`] - bounded BFS subgraph extraction and statistics,
//!   DFS route discovery, neighbor and connectedness queries
//!
//! Engines assume tenant/graph existence was validated by the caller.
//! Cancellation is cooperative and checked between storage round-trips.

pub mod enumeration;
pub mod neighbors;
pub mod routes;
pub mod subgraph;

pub use enumeration::Enumerator;
pub use neighbors::Direction;
pub use subgraph::TraversalEngine;

use futures::Stream;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;
use trellis_core::{Result, TrellisError};

/// Boxed lazy sequence of fallible results.
pub type ResultStream<T> = Pin<Box<dyn Stream<Item = Result<T>> + Send>>;

/// Fail with `Cancelled` once the caller has cancelled.
pub(crate) fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(TrellisError::Cancelled)
    } else {
        Ok(())
    }
}
