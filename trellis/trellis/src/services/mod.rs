//! Per-entity service surfaces of [`crate::TrellisClient`].
//!
//! Services validate tenant, graph and parent existence before any mutating
//! storage call and keep the reference caches in step with writes.

mod edges;
mod graphs;
mod nodes;
mod subordinates;
mod tenants;
mod vectors;

pub use edges::EdgeService;
pub use graphs::GraphService;
pub use nodes::NodeService;
pub use subordinates::{LabelService, Subordinate, SubordinateService, TagService};
pub use tenants::TenantService;
pub use vectors::VectorService;

use trellis_core::prelude::*;

pub(crate) fn query_options(query: &EnumerationQuery) -> ReadOptions {
    ReadOptions {
        include_data: query.include_data,
        include_subordinates: query.include_subordinates,
    }
}

/// Graph-scoped enumeration of graph members needs both ids.
pub(crate) fn graph_scope(query: &EnumerationQuery) -> Result<(TrellisId, TrellisId)> {
    match (query.tenant_id, query.graph_id) {
        (Some(tenant_id), Some(graph_id)) => Ok((tenant_id, graph_id)),
        _ => Err(TrellisError::invalid_argument(
            "query must be scoped to a tenant and a graph",
        )),
    }
}

pub(crate) fn tenant_scope(query: &EnumerationQuery) -> Result<TrellisId> {
    query
        .tenant_id
        .ok_or_else(|| TrellisError::invalid_argument("query must be scoped to a tenant"))
}
