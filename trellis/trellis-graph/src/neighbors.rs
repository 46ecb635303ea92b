//! Adjacency-derived node queries: parents, children, neighbors and
//! connectedness ranking.

use crate::ensure_active;
use crate::subgraph::TraversalEngine;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use trellis_core::prelude::*;

/// Which incident edges of a node to follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Edges arriving at the node
    Incoming,
    /// Edges leaving the node
    Outgoing,
    Both,
}

impl Direction {
    fn adjacency(self, node_id: TrellisId) -> Adjacency {
        match self {
            Self::Incoming => Adjacency::To(node_id),
            Self::Outgoing => Adjacency::From(node_id),
            Self::Both => Adjacency::Touching(node_id),
        }
    }
}

impl TraversalEngine {
    /// Edges incident to a node, oldest first.
    pub async fn incident_edges(
        &self,
        tenant_id: TrellisId,
        graph_id: TrellisId,
        node_id: TrellisId,
        direction: Direction,
        cancel: &CancellationToken,
    ) -> Result<Vec<Edge>> {
        ensure_active(cancel)?;
        let query = RecordQuery::graph(tenant_id, graph_id).with_adjacency(direction.adjacency(node_id));
        self.storage.edges().select_page(&query).await
    }

    /// Edges running from `from` to `to`.
    pub async fn edges_between(
        &self,
        tenant_id: TrellisId,
        graph_id: TrellisId,
        from: TrellisId,
        to: TrellisId,
        cancel: &CancellationToken,
    ) -> Result<Vec<Edge>> {
        ensure_active(cancel)?;
        let query = RecordQuery::graph(tenant_id, graph_id).with_adjacency(Adjacency::Between { from, to });
        self.storage.edges().select_page(&query).await
    }

    /// Nodes with an edge into `node_id`.
    pub async fn parents(
        &self,
        tenant_id: TrellisId,
        graph_id: TrellisId,
        node_id: TrellisId,
        cancel: &CancellationToken,
    ) -> Result<Vec<Node>> {
        self.adjacent(tenant_id, graph_id, node_id, Direction::Incoming, cancel).await
    }

    /// Nodes reached by an edge out of `node_id`.
    pub async fn children(
        &self,
        tenant_id: TrellisId,
        graph_id: TrellisId,
        node_id: TrellisId,
        cancel: &CancellationToken,
    ) -> Result<Vec<Node>> {
        self.adjacent(tenant_id, graph_id, node_id, Direction::Outgoing, cancel).await
    }

    /// Parents and children, de-duplicated.
    pub async fn neighbors(
        &self,
        tenant_id: TrellisId,
        graph_id: TrellisId,
        node_id: TrellisId,
        cancel: &CancellationToken,
    ) -> Result<Vec<Node>> {
        self.adjacent(tenant_id, graph_id, node_id, Direction::Both, cancel).await
    }

    async fn adjacent(
        &self,
        tenant_id: TrellisId,
        graph_id: TrellisId,
        node_id: TrellisId,
        direction: Direction,
        cancel: &CancellationToken,
    ) -> Result<Vec<Node>> {
        let edges = self
            .incident_edges(tenant_id, graph_id, node_id, direction, cancel)
            .await?;

        let mut seen = HashSet::new();
        let ids: Vec<TrellisId> = edges
            .iter()
            .filter_map(|edge| match direction {
                Direction::Incoming => Some(edge.from),
                Direction::Outgoing => Some(edge.to),
                Direction::Both => edge.other_end(node_id),
            })
            .filter(|id| seen.insert(*id))
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        ensure_active(cancel)?;
        let nodes = self.storage.nodes().select_by_keys(tenant_id, &ids).await?;
        Ok(nodes.into_iter().filter(|n| n.graph_id == graph_id).collect())
    }

    /// Nodes of one graph ranked by total degree, highest first.
    pub async fn most_connected(
        &self,
        query: EnumerationQuery,
        cancel: &CancellationToken,
    ) -> Result<EnumerationResult<Node>> {
        let query = query.with_order(EnumerationOrder::MostConnected);
        self.enumerator.enumerate(&query, cancel).await
    }

    /// Nodes of one graph ranked by total degree, lowest first.
    pub async fn least_connected(
        &self,
        query: EnumerationQuery,
        cancel: &CancellationToken,
    ) -> Result<EnumerationResult<Node>> {
        let query = query.with_order(EnumerationOrder::LeastConnected);
        self.enumerator.enumerate(&query, cancel).await
    }
}
