//! Subgraph extraction and route discovery types.

use crate::error::{Result, TrellisError};
use crate::id::TrellisId;
use crate::types::entity::{Edge, Graph, Node, ReadOptions};
use crate::types::filter::Expr;
use serde::{Deserialize, Serialize};

/// Bounded subgraph extraction request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubgraphRequest {
    pub tenant_id: TrellisId,
    pub graph_id: TrellisId,
    pub start: TrellisId,
    pub max_depth: usize,
    /// 0 = unbounded
    #[serde(default)]
    pub max_nodes: usize,
    /// 0 = unbounded
    #[serde(default)]
    pub max_edges: usize,
    #[serde(default)]
    pub include_data: bool,
    #[serde(default)]
    pub include_subordinates: bool,
}

impl SubgraphRequest {
    pub fn new(tenant_id: TrellisId, graph_id: TrellisId, start: TrellisId, max_depth: usize) -> Self {
        Self {
            tenant_id,
            graph_id,
            start,
            max_depth,
            max_nodes: 0,
            max_edges: 0,
            include_data: false,
            include_subordinates: false,
        }
    }

    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    pub fn with_max_edges(mut self, max_edges: usize) -> Self {
        self.max_edges = max_edges;
        self
    }

    pub fn node_limit_reached(&self, count: usize) -> bool {
        self.max_nodes > 0 && count >= self.max_nodes
    }

    pub fn edge_limit_reached(&self, count: usize) -> bool {
        self.max_edges > 0 && count >= self.max_edges
    }
}

/// Subgraph extraction output: the graph record plus reachable nodes and edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubgraphResult {
    pub graph: Graph,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// Cardinalities of a subgraph, computed without materializing it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub nodes: u64,
    pub edges: u64,
    pub labels: u64,
    pub tags: u64,
    pub vectors: u64,
}

/// Route discovery request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub tenant_id: TrellisId,
    pub graph_id: TrellisId,
    pub from: TrellisId,
    pub to: TrellisId,
    /// Edges failing this predicate are never followed
    pub edge_filter: Option<Expr>,
    /// Nodes failing this predicate are never entered
    pub node_filter: Option<Expr>,
    /// Maximum route length in edges; `None` enumerates every simple path,
    /// which is exponential on graphs with many parallel paths
    pub max_depth: Option<usize>,
    /// How much of each route edge is returned
    #[serde(default)]
    pub options: ReadOptions,
}

impl RouteRequest {
    pub fn new(tenant_id: TrellisId, graph_id: TrellisId, from: TrellisId, to: TrellisId) -> Self {
        Self {
            tenant_id,
            graph_id,
            from,
            to,
            edge_filter: None,
            node_filter: None,
            max_depth: None,
            options: ReadOptions::default(),
        }
    }

    pub fn with_edge_filter(mut self, filter: Expr) -> Self {
        self.edge_filter = Some(filter);
        self
    }

    pub fn with_node_filter(mut self, filter: Expr) -> Self {
        self.node_filter = Some(filter);
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn with_options(mut self, options: ReadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_depth == Some(0) {
            return Err(TrellisError::invalid_argument("route max_depth must be at least 1"));
        }
        Ok(())
    }
}

/// One simple path between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDetail {
    pub edges: Vec<Edge>,
    pub total_cost: f64,
}

impl RouteDetail {
    pub fn new(edges: Vec<Edge>) -> Self {
        let total_cost = edges.iter().map(|e| f64::from(e.cost)).sum();
        Self { edges, total_cost }
    }

    /// Node ids visited in order, starting with the origin.
    pub fn nodes(&self) -> Vec<TrellisId> {
        let mut nodes = Vec::with_capacity(self.edges.len() + 1);
        if let Some(first) = self.edges.first() {
            nodes.push(first.from);
        }
        nodes.extend(self.edges.iter().map(|e| e.to));
        nodes
    }
}
