//! Index lifecycle: enable, disable, rebuild, statistics, and the write
//! mirroring that keeps an enabled index in step with stored vectors.

use crate::index::HnswIndex;
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use trellis_core::config::VectorConfig;
use trellis_core::prelude::*;

/// Owns the live HNSW index of every index-enabled graph.
///
/// Indexes are materialized on first use: file-backed ones are loaded from
/// their artifact, RAM ones are rebuilt from the stored vectors.
pub struct VectorIndexManager {
    storage: Arc<dyn Storage>,
    config: VectorConfig,
    indexes: DashMap<TrellisId, Arc<HnswIndex>>,
}

impl VectorIndexManager {
    pub fn new(storage: Arc<dyn Storage>, config: VectorConfig) -> Self {
        Self {
            storage,
            config,
            indexes: DashMap::new(),
        }
    }

    /// Fill in the artifact path of a file-backed configuration that lacks
    /// one, using the configured index directory.
    pub fn resolve_config(&self, graph_id: TrellisId, mut config: VectorIndexConfig) -> VectorIndexConfig {
        if config.index_type == VectorIndexType::HnswFile && config.file.is_none() {
            config.file = self
                .config
                .index_dir
                .as_ref()
                .map(|dir| dir.join(format!("{}.hnsw", graph_id)));
        }
        config
    }

    /// Index configuration populated with the configured build defaults.
    pub fn default_config(&self, index_type: VectorIndexType, dimensionality: usize) -> VectorIndexConfig {
        VectorIndexConfig {
            index_type,
            file: None,
            dimensionality,
            m: self.config.default_m,
            ef: self.config.default_ef,
            ef_construction: self.config.default_ef_construction,
            threshold: self.config.default_threshold,
            distance: IndexDistance::default(),
        }
    }

    /// Build a fresh index for `graph` from every stored node and edge
    /// vector. The caller persists `config` on the graph record.
    pub async fn enable(
        &self,
        graph: &Graph,
        config: &VectorIndexConfig,
        cancel: &CancellationToken,
    ) -> Result<IndexStatistics> {
        config.validate()?;
        info!(
            "Enabling {:?} vector index on graph {} (dimensionality {})",
            config.index_type, graph.id, config.dimensionality
        );

        let index = self.build(graph, config.clone(), cancel).await?;
        self.persist(&index).await?;
        let stats = index.statistics();
        self.indexes.insert(graph.id, index);
        Ok(stats)
    }

    /// Drop the live index, optionally deleting its artifact.
    pub async fn disable(&self, graph: &Graph, delete_file: bool) -> Result<()> {
        self.indexes.remove(&graph.id);
        info!("Disabled vector index on graph {}", graph.id);

        if !delete_file {
            return Ok(());
        }
        let Some(path) = graph.vector_index.as_ref().and_then(|c| c.file.clone()) else {
            return Ok(());
        };
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted index file {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Re-populate the graph's index from the current stored vectors.
    pub async fn rebuild(&self, graph: &Graph, cancel: &CancellationToken) -> Result<IndexStatistics> {
        let config = Self::enabled_config(graph)?;
        let index = self.build(graph, config.clone(), cancel).await?;
        self.persist(&index).await?;
        let stats = index.statistics();
        self.indexes.insert(graph.id, index);
        Ok(stats)
    }

    pub async fn statistics(&self, graph: &Graph) -> Result<IndexStatistics> {
        Self::enabled_config(graph)?;
        let index = self.require(graph).await?;
        Ok(index.statistics())
    }

    /// The graph's live index, materializing it if needed. `None` when the
    /// graph has indexing disabled.
    pub async fn index_for(&self, graph: &Graph) -> Result<Option<Arc<HnswIndex>>> {
        let Some(config) = graph.active_index() else {
            self.indexes.remove(&graph.id);
            return Ok(None);
        };

        if let Some(index) = self.indexes.get(&graph.id) {
            if index.config() == config {
                return Ok(Some(index.clone()));
            }
        }

        let index = self.materialize(graph, config.clone()).await?;
        self.indexes.insert(graph.id, index.clone());
        Ok(Some(index))
    }

    /// Mirror a created or updated vector into the graph's index.
    pub async fn on_vector_upsert(&self, graph: &Graph, record: &VectorRecord) -> Result<()> {
        if record.attachment() == Attachment::Graph {
            return Ok(());
        }
        let Some(index) = self.index_for(graph).await? else {
            return Ok(());
        };

        index.remove(record.id);
        if record.vectors.len() == index.config().dimensionality {
            index.upsert(record)?;
        } else {
            debug!(
                "Vector {} has dimensionality {}, not indexed in graph {}",
                record.id,
                record.vectors.len(),
                graph.id
            );
        }
        self.persist(&index).await
    }

    pub async fn on_vector_delete(&self, graph: &Graph, vector_id: TrellisId) -> Result<()> {
        let Some(index) = self.index_for(graph).await? else {
            return Ok(());
        };
        if index.remove(vector_id) {
            self.persist(&index).await?;
        }
        Ok(())
    }

    /// Drop every vector owned by a deleted node or edge.
    pub async fn on_owner_delete(&self, graph: &Graph, owner: TrellisId) -> Result<()> {
        let Some(index) = self.index_for(graph).await? else {
            return Ok(());
        };
        if index.remove_owner(owner) > 0 {
            self.persist(&index).await?;
        }
        Ok(())
    }

    /// Forget a deleted graph's index and its artifact.
    pub async fn forget(&self, graph: &Graph) -> Result<()> {
        if graph.active_index().is_some() {
            self.disable(graph, true).await
        } else {
            self.indexes.remove(&graph.id);
            Ok(())
        }
    }

    fn enabled_config(graph: &Graph) -> Result<&VectorIndexConfig> {
        graph.active_index().ok_or_else(|| {
            TrellisError::invalid_argument(format!("vector index is not enabled on graph {}", graph.id))
        })
    }

    async fn require(&self, graph: &Graph) -> Result<Arc<HnswIndex>> {
        self.index_for(graph)
            .await?
            .ok_or_else(|| TrellisError::internal("enabled index could not be materialized"))
    }

    async fn materialize(&self, graph: &Graph, config: VectorIndexConfig) -> Result<Arc<HnswIndex>> {
        if config.index_type == VectorIndexType::HnswFile {
            if let Some(path) = config.file.as_ref().filter(|p| p.exists()) {
                match HnswIndex::load(graph.id, config.clone(), path).await {
                    Ok(index) => return Ok(Arc::new(index)),
                    Err(e) => warn!(
                        "Could not load index file {} for graph {}, rebuilding: {}",
                        path.display(),
                        graph.id,
                        e
                    ),
                }
            }
        }

        let index = self.build(graph, config, &CancellationToken::new()).await?;
        self.persist(&index).await?;
        Ok(index)
    }

    async fn build(
        &self,
        graph: &Graph,
        config: VectorIndexConfig,
        cancel: &CancellationToken,
    ) -> Result<Arc<HnswIndex>> {
        if cancel.is_cancelled() {
            return Err(TrellisError::Cancelled);
        }
        let index = HnswIndex::new(graph.id, config)?;
        let vectors = self
            .storage
            .vectors()
            .select_page(&RecordQuery::graph(graph.tenant_id, graph.id))
            .await?;
        if cancel.is_cancelled() {
            return Err(TrellisError::Cancelled);
        }

        let indexed = index.rebuild_from(&vectors);
        debug!("Built index for graph {} from {} stored vectors", graph.id, indexed);
        Ok(Arc::new(index))
    }

    async fn persist(&self, index: &HnswIndex) -> Result<()> {
        let config = index.config();
        if config.index_type != VectorIndexType::HnswFile {
            return Ok(());
        }
        let path: PathBuf = config
            .file
            .clone()
            .ok_or_else(|| TrellisError::config("file-backed vector index has no file path"))?;
        index.save(&path).await
    }
}
