//! Vector similarity search for Trellis.
//!
//! - [`distance`] - metric functions and the raw-distance conversion table
//! - [`HnswIndex`] - per-graph approximate index with bincode persistence
//! - [`VectorIndexManager`] - enable/disable/rebuild/statistics and write mirroring
//! - [`VectorSearchEngine`] - brute force with an index fast path
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use trellis_core::prelude::*;
//! use trellis_core::config::VectorConfig;
//! use trellis_vector::{VectorIndexManager, VectorSearchEngine};
//!
//! # async fn example(storage: Arc<dyn Storage>, tenant: TrellisId, graph: TrellisId) -> Result<()> {
//! let manager = Arc::new(VectorIndexManager::new(storage.clone(), VectorConfig::default()));
//! let engine = VectorSearchEngine::new(storage, manager);
//!
//! let request = VectorSearchRequest::new(
//!     tenant,
//!     VectorSearchDomain::Node,
//!     VectorSearchMetric::CosineSimilarity,
//!     vec![0.1, 0.2, 0.3],
//! )
//! .in_graph(graph)
//! .with_top_k(5);
//!
//! for result in engine.search(&request, &CancellationToken::new()).await? {
//!     println!("{:?}: {}", result.entity_id(), result.score);
//! }
//! # Ok(())
//! # }
//! ```

pub mod distance;
pub mod index;
pub mod manager;
pub mod search;

pub use index::{HnswIndex, IndexHit};
pub use manager::VectorIndexManager;
pub use search::VectorSearchEngine;
