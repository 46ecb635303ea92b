//! Depth-first enumeration of simple directed paths between two nodes.
//!
//! Cycle safety is path-local: a node already on the current path is never
//! re-entered, but the same node may appear on other routes. Without a depth
//! cap the number of routes grows exponentially with parallel paths.

use crate::subgraph::TraversalEngine;
use crate::{ResultStream, ensure_active};
use async_stream::try_stream;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use trellis_core::prelude::*;

impl TraversalEngine {
    /// Lazily produce every route from `request.from` to `request.to`.
    ///
    /// Routes come out in discovery order; callers wanting cheapest-first
    /// should use [`Self::routes_by_cost`].
    pub fn routes(&self, request: RouteRequest, cancel: CancellationToken) -> ResultStream<RouteDetail> {
        let engine = self.clone();
        Box::pin(try_stream! {
            request.validate()?;
            let max_depth = request.max_depth.or(engine.config.default_route_depth);

            ensure_active(&cancel)?;
            engine.load_node(request.tenant_id, request.graph_id, request.from).await?;
            engine.load_node(request.tenant_id, request.graph_id, request.to).await?;

            if request.from != request.to {
                let mut on_path = HashSet::from([request.from]);
                let mut path: Vec<Edge> = Vec::new();
                let first = engine.outgoing(&request, request.from, &cancel).await?;
                let mut frames = vec![first];

                while let Some(frame) = frames.last_mut() {
                    let Some(edge) = frame.pop() else {
                        frames.pop();
                        if let Some(done) = path.pop() {
                            on_path.remove(&done.to);
                        }
                        continue;
                    };

                    let next = edge.to;
                    if on_path.contains(&next) {
                        continue;
                    }
                    if !engine.node_passes(&request, next, &cancel).await? {
                        continue;
                    }
                    if next == request.to {
                        let mut edges = path.clone();
                        edges.push(edge);
                        yield RouteDetail::new(edges);
                        continue;
                    }
                    if max_depth.is_some_and(|cap| path.len() + 1 >= cap) {
                        continue;
                    }

                    ensure_active(&cancel)?;
                    let children = engine.outgoing(&request, next, &cancel).await?;
                    on_path.insert(next);
                    path.push(edge);
                    frames.push(children);
                }
            }
        })
    }

    /// Collect every route and sort by total cost ascending.
    pub async fn routes_by_cost(
        &self,
        request: RouteRequest,
        cancel: CancellationToken,
    ) -> Result<Vec<RouteDetail>> {
        use futures::TryStreamExt;

        let mut routes: Vec<RouteDetail> = self.routes(request, cancel).try_collect().await?;
        routes.sort_by(|a, b| a.total_cost.total_cmp(&b.total_cost));
        debug!(routes = routes.len(), "Discovered routes");
        Ok(routes)
    }

    /// Outgoing edges passing the edge filter, reversed so that popping
    /// yields them oldest first.
    async fn outgoing(
        &self,
        request: &RouteRequest,
        node_id: TrellisId,
        cancel: &CancellationToken,
    ) -> Result<Vec<Edge>> {
        ensure_active(cancel)?;
        let mut filter = SearchFilter::new();
        if let Some(expr) = &request.edge_filter {
            filter = filter.with_expression(expr.clone());
        }
        let query = RecordQuery::graph(request.tenant_id, request.graph_id)
            .with_adjacency(Adjacency::From(node_id))
            .with_filter(filter);
        let mut edges = self.storage.edges().select_page(&query).await?;
        edges.reverse();
        Ok(edges)
    }

    async fn node_passes(
        &self,
        request: &RouteRequest,
        node_id: TrellisId,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let Some(expr) = &request.node_filter else {
            return Ok(true);
        };
        ensure_active(cancel)?;
        match self
            .storage
            .nodes()
            .select_by_key(request.tenant_id, node_id)
            .await?
        {
            Some(node) => Ok(expr.evaluate(node.data.as_ref())),
            None => {
                warn!(node_id = %node_id, "Skipping route through node missing from storage");
                Ok(false)
            }
        }
    }
}
