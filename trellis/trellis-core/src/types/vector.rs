//! Vector similarity search request/response types.

use crate::error::{Result, TrellisError};
use crate::id::TrellisId;
use crate::types::entity::{Edge, Graph, IndexDistance, Node, ReadOptions, VectorIndexType};
use crate::types::filter::SearchFilter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which entity's vectors are searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorSearchDomain {
    Graph,
    Node,
    Edge,
}

/// Scoring function for a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorSearchMetric {
    /// 0 = identical direction
    CosineDistance,
    /// 1 = identical direction
    CosineSimilarity,
    EuclideanDistance,
    /// `1 / (1 + distance)`, in (0, 1]
    EuclideanSimilarity,
    DotProduct,
}

impl VectorSearchMetric {
    /// Distances rank ascending; similarities and dot products descending.
    pub fn is_distance(&self) -> bool {
        matches!(self, Self::CosineDistance | Self::EuclideanDistance)
    }
}

/// Vector search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorSearchRequest {
    pub tenant_id: TrellisId,
    /// Required for node and edge domains; narrows graph-domain searches
    pub graph_id: Option<TrellisId>,
    pub domain: VectorSearchDomain,
    pub metric: VectorSearchMetric,
    pub embeddings: Vec<f32>,
    /// Restricts candidate entities
    #[serde(default)]
    pub filter: SearchFilter,
    pub top_k: Option<usize>,
    /// Lower bound for similarity and dot-product metrics
    pub min_score: Option<f32>,
    /// Upper bound for distance metrics
    pub max_distance: Option<f32>,
    /// How much of each matched entity is returned
    #[serde(default)]
    pub options: ReadOptions,
}

impl VectorSearchRequest {
    pub fn new(
        tenant_id: TrellisId,
        domain: VectorSearchDomain,
        metric: VectorSearchMetric,
        embeddings: Vec<f32>,
    ) -> Self {
        Self {
            tenant_id,
            graph_id: None,
            domain,
            metric,
            embeddings,
            filter: SearchFilter::default(),
            top_k: None,
            min_score: None,
            max_distance: None,
            options: ReadOptions::default(),
        }
    }

    pub fn in_graph(mut self, graph_id: TrellisId) -> Self {
        self.graph_id = Some(graph_id);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_filter(mut self, filter: SearchFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    pub fn with_max_distance(mut self, max_distance: f32) -> Self {
        self.max_distance = Some(max_distance);
        self
    }

    pub fn with_options(mut self, options: ReadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.embeddings.is_empty() {
            return Err(TrellisError::invalid_argument("query vector must not be empty"));
        }
        if self.top_k == Some(0) {
            return Err(TrellisError::invalid_argument("top_k must be greater than zero"));
        }
        if self.domain != VectorSearchDomain::Graph && self.graph_id.is_none() {
            return Err(TrellisError::invalid_argument(
                "node and edge vector searches require a graph id",
            ));
        }
        Ok(())
    }

    /// Whether `score` passes the request's threshold for its metric.
    pub fn accepts(&self, score: f32) -> bool {
        if self.metric.is_distance() {
            self.max_distance.is_none_or(|max| score <= max)
        } else {
            self.min_score.is_none_or(|min| score >= min)
        }
    }
}

/// One scored entity. Exactly one of `graph`, `node`, `edge` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorSearchResult {
    pub metric: VectorSearchMetric,
    pub score: f32,
    pub graph: Option<Graph>,
    pub node: Option<Node>,
    pub edge: Option<Edge>,
}

impl VectorSearchResult {
    pub fn entity_id(&self) -> Option<TrellisId> {
        self.graph
            .as_ref()
            .map(|g| g.id)
            .or_else(|| self.node.as_ref().map(|n| n.id))
            .or_else(|| self.edge.as_ref().map(|e| e.id))
    }
}

/// Approximate index status for one graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStatistics {
    pub graph_id: TrellisId,
    pub index_type: VectorIndexType,
    pub distance: IndexDistance,
    pub dimensionality: usize,
    pub vector_count: usize,
    pub m: usize,
    pub ef: usize,
    pub ef_construction: usize,
    pub threshold: usize,
    pub file: Option<PathBuf>,
    pub last_built_utc: Option<DateTime<Utc>>,
}
