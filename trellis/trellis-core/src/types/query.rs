//! Structured selection criteria handed to storage repositories.

use crate::id::TrellisId;
use crate::types::entity::Attachment;
use crate::types::enumeration::{EnumerationOrder, SortMarker};
use crate::types::filter::SearchFilter;
use serde::{Deserialize, Serialize};

/// Attachment scope for labels, tags and vectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ParentRef {
    /// Attached to the graph itself (no node, no edge)
    Graph,
    Node(TrellisId),
    Edge(TrellisId),
    /// Attached to any of the given nodes or edges
    AnyOf(Vec<TrellisId>),
}

impl From<Attachment> for ParentRef {
    fn from(attachment: Attachment) -> Self {
        match attachment {
            Attachment::Graph => Self::Graph,
            Attachment::Node(id) => Self::Node(id),
            Attachment::Edge(id) => Self::Edge(id),
        }
    }
}

/// Endpoint scope for edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Adjacency {
    /// `from` equals the node
    From(TrellisId),
    /// `to` equals the node
    To(TrellisId),
    /// Either endpoint equals the node
    Touching(TrellisId),
    Between { from: TrellisId, to: TrellisId },
}

impl Adjacency {
    pub fn matches(&self, from: TrellisId, to: TrellisId) -> bool {
        match *self {
            Self::From(n) => from == n,
            Self::To(n) => to == n,
            Self::Touching(n) => from == n || to == n,
            Self::Between { from: f, to: t } => from == f && to == t,
        }
    }
}

/// Query passed to [`crate::traits::Repository`] selects, counts and deletes.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordQuery {
    /// `None` spans every tenant (tenant listing only)
    pub tenant_id: Option<TrellisId>,
    pub graph_id: Option<TrellisId>,
    pub parent: Option<ParentRef>,
    pub adjacency: Option<Adjacency>,
    pub ids: Option<Vec<TrellisId>>,
    pub filter: SearchFilter,
    pub order: EnumerationOrder,
    /// Only records sorting strictly after this marker
    pub after: Option<SortMarker>,
    pub skip: u64,
    pub limit: Option<usize>,
}

impl RecordQuery {
    /// Everything in a tenant.
    pub fn tenant(tenant_id: TrellisId) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            ..Self::all()
        }
    }

    /// Every record regardless of tenant.
    pub fn all() -> Self {
        Self {
            tenant_id: None,
            graph_id: None,
            parent: None,
            adjacency: None,
            ids: None,
            filter: SearchFilter::default(),
            order: EnumerationOrder::default(),
            after: None,
            skip: 0,
            limit: None,
        }
    }

    /// Everything in one graph.
    pub fn graph(tenant_id: TrellisId, graph_id: TrellisId) -> Self {
        Self::tenant(tenant_id).in_graph(graph_id)
    }

    pub fn in_graph(mut self, graph_id: TrellisId) -> Self {
        self.graph_id = Some(graph_id);
        self
    }

    pub fn with_parent(mut self, parent: ParentRef) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_adjacency(mut self, adjacency: Adjacency) -> Self {
        self.adjacency = Some(adjacency);
        self
    }

    pub fn with_ids(mut self, ids: Vec<TrellisId>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn with_filter(mut self, filter: SearchFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_order(mut self, order: EnumerationOrder) -> Self {
        self.order = order;
        self
    }

    pub fn after(mut self, marker: Option<SortMarker>) -> Self {
        self.after = marker;
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
