//! Tenants, graphs, nodes, edges and their subordinates.

use crate::error::{Result, TrellisError};
use crate::id::TrellisId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Kind of stored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Tenant,
    Graph,
    Node,
    Edge,
    Label,
    Tag,
    Vector,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tenant => "tenant",
            Self::Graph => "graph",
            Self::Node => "node",
            Self::Edge => "edge",
            Self::Label => "label",
            Self::Tag => "tag",
            Self::Vector => "vector",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flags controlling how much of a record a read returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOptions {
    /// Populate the opaque `data` payload
    pub include_data: bool,
    /// Populate labels, tags and vectors
    pub include_subordinates: bool,
}

impl ReadOptions {
    pub fn full() -> Self {
        Self {
            include_data: true,
            include_subordinates: true,
        }
    }
}

/// Top-level isolation boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TrellisId,
    pub name: String,
    pub active: bool,
    pub created_utc: DateTime<Utc>,
    pub last_update_utc: DateTime<Utc>,
}

impl Tenant {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: TrellisId::new(),
            name: name.into(),
            active: true,
            created_utc: now,
            last_update_utc: now,
        }
    }
}

/// Approximate index implementation backing a graph's vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorIndexType {
    /// Indexing disabled
    #[default]
    None,
    /// HNSW held in memory, rebuilt from storage after restart
    HnswRam,
    /// HNSW persisted to `VectorIndexConfig::file`
    HnswFile,
}

/// Distance function the approximate index is built with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexDistance {
    #[default]
    Cosine,
    Euclidean,
    DotProduct,
}

/// Vector index configuration persisted on the graph record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndexConfig {
    pub index_type: VectorIndexType,
    pub file: Option<PathBuf>,
    pub dimensionality: usize,
    pub m: usize,
    pub ef: usize,
    pub ef_construction: usize,
    /// Minimum candidate count before the index is consulted
    pub threshold: usize,
    #[serde(default)]
    pub distance: IndexDistance,
}

impl VectorIndexConfig {
    pub fn hnsw_ram(dimensionality: usize) -> Self {
        Self {
            index_type: VectorIndexType::HnswRam,
            file: None,
            dimensionality,
            m: 16,
            ef: 50,
            ef_construction: 200,
            threshold: 100,
            distance: IndexDistance::Cosine,
        }
    }

    pub fn hnsw_file(dimensionality: usize, file: impl Into<PathBuf>) -> Self {
        Self {
            index_type: VectorIndexType::HnswFile,
            file: Some(file.into()),
            ..Self::hnsw_ram(dimensionality)
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.index_type != VectorIndexType::None
    }

    /// Reject configurations the index cannot be built from.
    pub fn validate(&self) -> Result<()> {
        if !self.is_enabled() {
            return Err(TrellisError::invalid_argument("vector index type must not be none"));
        }
        if self.dimensionality == 0 {
            return Err(TrellisError::invalid_argument(
                "vector index dimensionality must be greater than zero",
            ));
        }
        if self.m == 0 || self.ef == 0 || self.ef_construction == 0 {
            return Err(TrellisError::invalid_argument(
                "vector index M, ef and efConstruction must be greater than zero",
            ));
        }
        if self.index_type == VectorIndexType::HnswFile && self.file.is_none() {
            return Err(TrellisError::invalid_argument(
                "file-backed vector index requires a file path",
            ));
        }
        Ok(())
    }
}

/// A graph owned by a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub id: TrellisId,
    pub tenant_id: TrellisId,
    pub name: String,
    pub vector_index: Option<VectorIndexConfig>,
    pub data: Option<Value>,
    pub created_utc: DateTime<Utc>,
    pub last_update_utc: DateTime<Utc>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub vectors: Vec<VectorRecord>,
}

impl Graph {
    pub fn new(tenant_id: TrellisId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: TrellisId::new(),
            tenant_id,
            name: name.into(),
            vector_index: None,
            data: None,
            created_utc: now,
            last_update_utc: now,
            labels: Vec::new(),
            tags: BTreeMap::new(),
            vectors: Vec::new(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Index configuration, if indexing is enabled.
    pub fn active_index(&self) -> Option<&VectorIndexConfig> {
        self.vector_index.as_ref().filter(|c| c.is_enabled())
    }
}

/// A node within a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: TrellisId,
    pub tenant_id: TrellisId,
    pub graph_id: TrellisId,
    pub name: String,
    pub data: Option<Value>,
    /// Edges whose `to` is this node; derived on read
    #[serde(default)]
    pub in_degree: u64,
    /// Edges whose `from` is this node; derived on read
    #[serde(default)]
    pub out_degree: u64,
    #[serde(default)]
    pub total_degree: u64,
    pub created_utc: DateTime<Utc>,
    pub last_update_utc: DateTime<Utc>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub vectors: Vec<VectorRecord>,
}

impl Node {
    pub fn new(tenant_id: TrellisId, graph_id: TrellisId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: TrellisId::new(),
            tenant_id,
            graph_id,
            name: name.into(),
            data: None,
            in_degree: 0,
            out_degree: 0,
            total_degree: 0,
            created_utc: now,
            last_update_utc: now,
            labels: Vec::new(),
            tags: BTreeMap::new(),
            vectors: Vec::new(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_vector(mut self, vector: VectorRecord) -> Self {
        self.vectors.push(vector);
        self
    }
}

/// A directed edge between two nodes of the same graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: TrellisId,
    pub tenant_id: TrellisId,
    pub graph_id: TrellisId,
    pub name: String,
    pub from: TrellisId,
    pub to: TrellisId,
    #[serde(default)]
    pub cost: i32,
    pub data: Option<Value>,
    pub created_utc: DateTime<Utc>,
    pub last_update_utc: DateTime<Utc>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub vectors: Vec<VectorRecord>,
}

impl Edge {
    pub fn new(
        tenant_id: TrellisId,
        graph_id: TrellisId,
        from: TrellisId,
        to: TrellisId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TrellisId::new(),
            tenant_id,
            graph_id,
            name: String::new(),
            from,
            to,
            cost: 0,
            data: None,
            created_utc: now,
            last_update_utc: now,
            labels: Vec::new(),
            tags: BTreeMap::new(),
            vectors: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_cost(mut self, cost: i32) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_vector(mut self, vector: VectorRecord) -> Self {
        self.vectors.push(vector);
        self
    }

    /// The endpoint opposite `node`, if `node` is an endpoint of this edge.
    pub fn other_end(&self, node: TrellisId) -> Option<TrellisId> {
        if self.from == node {
            Some(self.to)
        } else if self.to == node {
            Some(self.from)
        } else {
            None
        }
    }
}

/// Which entity a label, tag or vector is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Attachment {
    Graph,
    Node(TrellisId),
    Edge(TrellisId),
}

impl Attachment {
    fn from_parts(node_id: Option<TrellisId>, edge_id: Option<TrellisId>) -> Self {
        match (node_id, edge_id) {
            (_, Some(edge)) => Self::Edge(edge),
            (Some(node), None) => Self::Node(node),
            (None, None) => Self::Graph,
        }
    }

    /// Owning node or edge id.
    pub fn owner(&self) -> Option<TrellisId> {
        match self {
            Self::Graph => None,
            Self::Node(id) | Self::Edge(id) => Some(*id),
        }
    }
}

/// A free-text label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub id: TrellisId,
    pub tenant_id: TrellisId,
    pub graph_id: TrellisId,
    pub node_id: Option<TrellisId>,
    pub edge_id: Option<TrellisId>,
    pub label: String,
    pub created_utc: DateTime<Utc>,
    pub last_update_utc: DateTime<Utc>,
}

impl Label {
    pub fn new(
        tenant_id: TrellisId,
        graph_id: TrellisId,
        attachment: Attachment,
        label: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let (node_id, edge_id) = split_attachment(attachment);
        Self {
            id: TrellisId::new(),
            tenant_id,
            graph_id,
            node_id,
            edge_id,
            label: label.into(),
            created_utc: now,
            last_update_utc: now,
        }
    }

    pub fn attachment(&self) -> Attachment {
        Attachment::from_parts(self.node_id, self.edge_id)
    }
}

/// A key/value tag. Keys compare case-insensitively and need not be unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TrellisId,
    pub tenant_id: TrellisId,
    pub graph_id: TrellisId,
    pub node_id: Option<TrellisId>,
    pub edge_id: Option<TrellisId>,
    pub key: String,
    pub value: String,
    pub created_utc: DateTime<Utc>,
    pub last_update_utc: DateTime<Utc>,
}

impl Tag {
    pub fn new(
        tenant_id: TrellisId,
        graph_id: TrellisId,
        attachment: Attachment,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let (node_id, edge_id) = split_attachment(attachment);
        Self {
            id: TrellisId::new(),
            tenant_id,
            graph_id,
            node_id,
            edge_id,
            key: key.into(),
            value: value.into(),
            created_utc: now,
            last_update_utc: now,
        }
    }

    pub fn attachment(&self) -> Attachment {
        Attachment::from_parts(self.node_id, self.edge_id)
    }
}

/// An embedding attached to a graph, node or edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: TrellisId,
    pub tenant_id: TrellisId,
    pub graph_id: TrellisId,
    pub node_id: Option<TrellisId>,
    pub edge_id: Option<TrellisId>,
    pub model: String,
    pub dimensionality: usize,
    pub vectors: Vec<f32>,
    pub content: String,
    pub created_utc: DateTime<Utc>,
    pub last_update_utc: DateTime<Utc>,
}

impl VectorRecord {
    pub fn new(
        tenant_id: TrellisId,
        graph_id: TrellisId,
        attachment: Attachment,
        model: impl Into<String>,
        vectors: Vec<f32>,
    ) -> Self {
        let now = Utc::now();
        let (node_id, edge_id) = split_attachment(attachment);
        Self {
            id: TrellisId::new(),
            tenant_id,
            graph_id,
            node_id,
            edge_id,
            model: model.into(),
            dimensionality: vectors.len(),
            vectors,
            content: String::new(),
            created_utc: now,
            last_update_utc: now,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn attachment(&self) -> Attachment {
        Attachment::from_parts(self.node_id, self.edge_id)
    }

    /// Dimensionality must be non-zero and match the float sequence.
    pub fn validate(&self) -> Result<()> {
        if self.vectors.is_empty() {
            return Err(TrellisError::invalid_argument("vector must contain at least one value"));
        }
        if self.dimensionality != self.vectors.len() {
            return Err(TrellisError::invalid_argument(format!(
                "vector dimensionality {} does not match {} values",
                self.dimensionality,
                self.vectors.len()
            )));
        }
        Ok(())
    }
}

fn split_attachment(attachment: Attachment) -> (Option<TrellisId>, Option<TrellisId>) {
    match attachment {
        Attachment::Graph => (None, None),
        Attachment::Node(id) => (Some(id), None),
        Attachment::Edge(id) => (None, Some(id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_validation() {
        let t = TrellisId::new();
        let g = TrellisId::new();
        let mut v = VectorRecord::new(t, g, Attachment::Graph, "m", vec![0.1, 0.2]);
        assert!(v.validate().is_ok());

        v.dimensionality = 3;
        assert!(v.validate().unwrap_err().is_invalid_argument());

        let empty = VectorRecord::new(t, g, Attachment::Graph, "m", vec![]);
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_attachment_roundtrip() {
        let t = TrellisId::new();
        let g = TrellisId::new();
        let n = TrellisId::new();
        let label = Label::new(t, g, Attachment::Node(n), "person");
        assert_eq!(label.attachment(), Attachment::Node(n));
        assert_eq!(label.attachment().owner(), Some(n));

        let tag = Tag::new(t, g, Attachment::Graph, "k", "v");
        assert_eq!(tag.attachment(), Attachment::Graph);
    }

    #[test]
    fn test_index_config_validation() {
        assert!(VectorIndexConfig::hnsw_ram(8).validate().is_ok());

        let mut cfg = VectorIndexConfig::hnsw_ram(0);
        assert!(cfg.validate().is_err());

        cfg = VectorIndexConfig::hnsw_ram(8);
        cfg.file = None;
        cfg.index_type = VectorIndexType::HnswFile;
        assert!(cfg.validate().is_err());

        cfg.index_type = VectorIndexType::None;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_other_end() {
        let t = TrellisId::new();
        let g = TrellisId::new();
        let a = TrellisId::new();
        let b = TrellisId::new();
        let e = Edge::new(t, g, a, b);
        assert_eq!(e.other_end(a), Some(b));
        assert_eq!(e.other_end(b), Some(a));
        assert_eq!(e.other_end(TrellisId::new()), None);
    }
}
