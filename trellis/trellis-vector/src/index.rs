//! Per-graph HNSW index over node and edge vectors.
//!
//! Entries are held in a concurrent map keyed by vector id and the HNSW
//! graph is rebuilt lazily on the first search after a mutation, since the
//! underlying builder does not support incremental updates.

use crate::distance::raw_distance;
use bincode::config;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use instant_distance::{Builder, HnswMap, Point, Search};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};
use trellis_core::prelude::*;

/// Point wrapper carrying the distance function the index was built with.
#[derive(Debug, Clone)]
struct IndexPoint {
    data: Vec<f32>,
    distance: IndexDistance,
}

impl Point for IndexPoint {
    fn distance(&self, other: &Self) -> f32 {
        raw_distance(self.distance, &self.data, &other.data)
    }
}

/// One indexed vector and the node or edge that owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub vector_id: TrellisId,
    pub attachment: Attachment,
    pub vector: Vec<f32>,
}

/// A nearest-neighbor hit with its raw index distance.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub vector_id: TrellisId,
    pub attachment: Attachment,
    pub distance: f32,
    pub vector: Vec<f32>,
}

pub struct HnswIndex {
    graph_id: TrellisId,
    config: VectorIndexConfig,
    entries: DashMap<TrellisId, IndexEntry>,
    hnsw: RwLock<Option<HnswMap<IndexPoint, TrellisId>>>,
    needs_rebuild: RwLock<bool>,
    last_built: RwLock<Option<DateTime<Utc>>>,
}

impl HnswIndex {
    pub fn new(graph_id: TrellisId, config: VectorIndexConfig) -> Result<Self> {
        config.validate()?;
        info!(
            "Creating HNSW index for graph {} with dimension={}, M={}, ef_construction={}, ef={}",
            graph_id, config.dimensionality, config.m, config.ef_construction, config.ef
        );
        Ok(Self {
            graph_id,
            config,
            entries: DashMap::new(),
            hnsw: RwLock::new(None),
            needs_rebuild: RwLock::new(false),
            last_built: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &VectorIndexConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn validate_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.config.dimensionality {
            return Err(TrellisError::invalid_argument(format!(
                "vector dimensionality {} does not match index dimensionality {}",
                vector.len(),
                self.config.dimensionality
            )));
        }
        Ok(())
    }

    /// Add or replace a node or edge vector.
    pub fn upsert(&self, record: &VectorRecord) -> Result<()> {
        let attachment = record.attachment();
        if attachment == Attachment::Graph {
            return Err(TrellisError::invalid_argument(
                "graph-level vectors are not indexed",
            ));
        }
        self.validate_dimension(&record.vectors)?;

        self.entries.insert(
            record.id,
            IndexEntry {
                vector_id: record.id,
                attachment,
                vector: record.vectors.clone(),
            },
        );
        *self.needs_rebuild.write() = true;
        debug!("Indexed vector {} for {:?}", record.id, attachment);
        Ok(())
    }

    /// Returns whether the vector was present.
    pub fn remove(&self, vector_id: TrellisId) -> bool {
        let removed = self.entries.remove(&vector_id).is_some();
        if removed {
            *self.needs_rebuild.write() = true;
            debug!("Removed vector {} from index", vector_id);
        }
        removed
    }

    /// Remove every vector owned by a node or edge.
    pub fn remove_owner(&self, owner: TrellisId) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = entry.attachment.owner() != Some(owner);
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            *self.needs_rebuild.write() = true;
        }
        removed
    }

    /// Replace the whole population and rebuild immediately. Graph-level
    /// vectors and vectors of another dimensionality are left out.
    pub fn rebuild_from<'a>(&self, records: impl IntoIterator<Item = &'a VectorRecord>) -> usize {
        self.entries.clear();
        let mut skipped = 0;
        for record in records {
            if record.attachment() == Attachment::Graph {
                continue;
            }
            if self.upsert(record).is_err() {
                skipped += 1;
            }
        }
        if skipped > 0 {
            warn!(
                "Skipped {} vectors not matching index dimensionality {} in graph {}",
                skipped, self.config.dimensionality, self.graph_id
            );
        }
        self.rebuild_index();
        self.entries.len()
    }

    fn rebuild_index(&self) {
        info!(
            "Rebuilding HNSW index for graph {} with {} vectors",
            self.graph_id,
            self.entries.len()
        );

        let mut points = Vec::with_capacity(self.entries.len());
        let mut values = Vec::with_capacity(self.entries.len());
        for entry in self.entries.iter() {
            points.push(IndexPoint {
                data: entry.vector.clone(),
                distance: self.config.distance,
            });
            values.push(*entry.key());
        }

        let built = if points.is_empty() {
            None
        } else {
            Some(
                Builder::default()
                    .ef_construction(self.config.ef_construction)
                    .ef_search(self.config.ef)
                    .seed(42)
                    .build(points, values),
            )
        };

        *self.hnsw.write() = built;
        *self.needs_rebuild.write() = false;
        *self.last_built.write() = Some(Utc::now());
    }

    /// Up to `k` nearest entries to `query`, closest first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        self.validate_dimension(query)?;
        if *self.needs_rebuild.read() {
            self.rebuild_index();
        }

        let hnsw = self.hnsw.read();
        let Some(map) = hnsw.as_ref() else {
            return Ok(Vec::new());
        };

        let query_point = IndexPoint {
            data: query.to_vec(),
            distance: self.config.distance,
        };
        let mut search = Search::default();
        let hits: Vec<IndexHit> = map
            .search(&query_point, &mut search)
            .take(k)
            .filter_map(|item| {
                let entry = self.entries.get(item.value)?;
                Some(IndexHit {
                    vector_id: entry.vector_id,
                    attachment: entry.attachment,
                    distance: item.distance,
                    vector: entry.vector.clone(),
                })
            })
            .collect();

        debug!("HNSW search found {} results", hits.len());
        Ok(hits)
    }

    pub fn statistics(&self) -> IndexStatistics {
        IndexStatistics {
            graph_id: self.graph_id,
            index_type: self.config.index_type,
            distance: self.config.distance,
            dimensionality: self.config.dimensionality,
            vector_count: self.entries.len(),
            m: self.config.m,
            ef: self.config.ef,
            ef_construction: self.config.ef_construction,
            threshold: self.config.threshold,
            file: self.config.file.clone(),
            last_built_utc: *self.last_built.read(),
        }
    }

    /// Persist entries; the HNSW graph itself is rebuilt on load.
    pub async fn save(&self, path: &Path) -> Result<()> {
        info!("Saving index to: {}", path.display());

        let data = IndexData {
            graph_id: self.graph_id,
            dimensionality: self.config.dimensionality,
            distance: self.config.distance,
            entries: self.entries.iter().map(|e| StoredEntry::from(e.value())).collect(),
        };
        let serialized = bincode::serde::encode_to_vec(&data, config::standard())
            .map_err(|e| TrellisError::index(format!("Serialization failed: {}", e)))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, serialized).await?;

        info!("Index saved successfully");
        Ok(())
    }

    pub async fn load(graph_id: TrellisId, config: VectorIndexConfig, path: &Path) -> Result<Self> {
        info!("Loading index from: {}", path.display());

        let raw = fs::read(path).await?;
        let data: IndexData = bincode::serde::decode_from_slice(&raw, config::standard())
            .map_err(|e| TrellisError::index(format!("Deserialization failed: {}", e)))?
            .0;

        if data.graph_id != graph_id {
            return Err(TrellisError::index(format!(
                "index file belongs to graph {}, not {}",
                data.graph_id, graph_id
            )));
        }
        if data.dimensionality != config.dimensionality || data.distance != config.distance {
            return Err(TrellisError::index(
                "index file does not match the graph's index configuration",
            ));
        }

        let index = Self::new(graph_id, config)?;
        for stored in data.entries {
            let entry = stored.into_entry();
            index.entries.insert(entry.vector_id, entry);
        }
        index.rebuild_index();

        info!("Index loaded successfully: {} vectors", index.len());
        Ok(index)
    }
}

#[derive(Serialize, Deserialize)]
struct IndexData {
    graph_id: TrellisId,
    dimensionality: usize,
    distance: IndexDistance,
    entries: Vec<StoredEntry>,
}

#[derive(Serialize, Deserialize)]
struct StoredEntry {
    vector_id: TrellisId,
    owner: TrellisId,
    on_edge: bool,
    vector: Vec<f32>,
}

impl From<&IndexEntry> for StoredEntry {
    fn from(entry: &IndexEntry) -> Self {
        let (owner, on_edge) = match entry.attachment {
            Attachment::Edge(id) => (id, true),
            Attachment::Node(id) => (id, false),
            Attachment::Graph => (TrellisId::nil(), false),
        };
        Self {
            vector_id: entry.vector_id,
            owner,
            on_edge,
            vector: entry.vector.clone(),
        }
    }
}

impl StoredEntry {
    fn into_entry(self) -> IndexEntry {
        IndexEntry {
            vector_id: self.vector_id,
            attachment: if self.on_edge {
                Attachment::Edge(self.owner)
            } else {
                Attachment::Node(self.owner)
            },
            vector: self.vector,
        }
    }
}
