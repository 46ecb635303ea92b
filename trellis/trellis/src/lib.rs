//! Trellis: an embedded multi-tenant property-graph database.
//!
//! Tenants own graphs; graphs own nodes and directed, weighted edges; any
//! graph, node or edge can carry labels, key/value tags and embedding
//! vectors. [`TrellisClient`] is the entry point and hands out one service
//! per entity type:
//!
//! - cursor-paginated enumeration with filters and ordering
//! - bounded breadth-first subgraph extraction and route discovery
//! - parent/child/neighbor and connectedness queries
//! - vector similarity search, optionally backed by a per-graph HNSW index
//!
//! Existence checks for tenants, graphs, nodes and edges go through small
//! per-client LRU caches that are kept in step with deletes.
//!
//! # Example
//!
//! ```no_run
//! use trellis::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let client = TrellisClient::in_memory()?;
//! let tenant = client.tenants().create(Tenant::new("acme")).await?;
//! let graph = client.graphs().create(Graph::new(tenant.id, "roads")).await?;
//!
//! let a = client.nodes().create(Node::new(tenant.id, graph.id, "a")).await?;
//! let b = client.nodes().create(Node::new(tenant.id, graph.id, "b")).await?;
//! client
//!     .edges()
//!     .create(Edge::new(tenant.id, graph.id, a.id, b.id).with_cost(3))
//!     .await?;
//!
//! let routes = client
//!     .graphs()
//!     .read_routes(RouteRequest::new(tenant.id, graph.id, a.id, b.id), CancellationToken::new())
//!     .await?;
//! assert_eq!(routes[0].total_cost, 3.0);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod logging;
pub mod services;

pub use cache::{CacheStats, ClientCacheStats};
pub use client::TrellisClient;
pub use logging::init_logging;
pub use services::{
    EdgeService, GraphService, LabelService, NodeService, Subordinate, SubordinateService, TagService,
    TenantService, VectorService,
};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cache::ClientCacheStats;
    pub use crate::client::TrellisClient;
    pub use crate::logging::init_logging;
    pub use crate::services::*;
    pub use tokio_util::sync::CancellationToken;
    pub use trellis_core::prelude::*;
    pub use trellis_graph::{Direction, ResultStream};
    pub use trellis_storage::MemoryStorage;
}
