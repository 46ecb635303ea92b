//! Similarity search over graph, node and edge vectors.

use crate::distance::{convert, rank, score};
use crate::index::HnswIndex;
use crate::manager::VectorIndexManager;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use trellis_core::prelude::*;

/// Scores candidate entities by brute force, or through the graph's HNSW
/// index once the candidate population reaches the index threshold.
#[derive(Clone)]
pub struct VectorSearchEngine {
    storage: Arc<dyn Storage>,
    indexes: Arc<VectorIndexManager>,
}

/// Best score seen per entity.
struct Scores {
    metric: VectorSearchMetric,
    best: HashMap<TrellisId, f32>,
}

impl Scores {
    fn new(metric: VectorSearchMetric) -> Self {
        Self {
            metric,
            best: HashMap::new(),
        }
    }

    fn offer(&mut self, entity: TrellisId, value: f32) {
        let metric = self.metric;
        self.best
            .entry(entity)
            .and_modify(|current| {
                if rank(metric, value, *current).is_lt() {
                    *current = value;
                }
            })
            .or_insert(value);
    }

    /// Accepted entity ids in rank order, ties broken by id.
    fn ranked(self, request: &VectorSearchRequest) -> Vec<(TrellisId, f32)> {
        let mut ranked: Vec<(TrellisId, f32)> = self
            .best
            .into_iter()
            .filter(|(_, value)| request.accepts(*value))
            .collect();
        ranked.sort_by(|a, b| rank(self.metric, a.1, b.1).then_with(|| a.0.cmp(&b.0)));
        if let Some(k) = request.top_k {
            ranked.truncate(k);
        }
        ranked
    }
}

impl VectorSearchEngine {
    pub fn new(storage: Arc<dyn Storage>, indexes: Arc<VectorIndexManager>) -> Self {
        Self { storage, indexes }
    }

    pub async fn search(
        &self,
        request: &VectorSearchRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<VectorSearchResult>> {
        request.validate()?;
        check(cancel)?;

        let results = match request.domain {
            VectorSearchDomain::Graph => self.search_graphs(request, cancel).await?,
            VectorSearchDomain::Node => {
                self.search_entities::<Node>(request, cancel, |node, score| VectorSearchResult {
                    metric: request.metric,
                    score,
                    graph: None,
                    node: Some(node),
                    edge: None,
                })
                .await?
            }
            VectorSearchDomain::Edge => {
                self.search_entities::<Edge>(request, cancel, |edge, score| VectorSearchResult {
                    metric: request.metric,
                    score,
                    graph: None,
                    node: None,
                    edge: Some(edge),
                })
                .await?
            }
        };

        debug!(
            "Vector search over {:?} returned {} results",
            request.domain,
            results.len()
        );
        Ok(results)
    }

    /// Graph-level vectors are few per tenant and never indexed.
    async fn search_graphs(
        &self,
        request: &VectorSearchRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<VectorSearchResult>> {
        let mut scope = RecordQuery::tenant(request.tenant_id).with_filter(request.filter.clone());
        if let Some(graph_id) = request.graph_id {
            scope = scope.with_ids(vec![graph_id]);
        }
        let graphs: HashMap<TrellisId, Graph> = self
            .storage
            .graphs()
            .select_page(&scope)
            .await?
            .into_iter()
            .map(|g| (g.id, g))
            .collect();
        if graphs.is_empty() {
            return Ok(Vec::new());
        }

        check(cancel)?;
        let vectors = self
            .storage
            .vectors()
            .select_page(&RecordQuery::tenant(request.tenant_id).with_parent(ParentRef::Graph))
            .await?;

        let mut scores = Scores::new(request.metric);
        for vector in vectors.iter().filter(|v| graphs.contains_key(&v.graph_id)) {
            if let Some(value) = score(request.metric, &request.embeddings, &vector.vectors) {
                scores.offer(vector.graph_id, value);
            }
        }

        let mut graphs = graphs;
        Ok(scores
            .ranked(request)
            .into_iter()
            .filter_map(|(id, score)| {
                graphs.remove(&id).map(|graph| VectorSearchResult {
                    metric: request.metric,
                    score,
                    graph: Some(graph),
                    node: None,
                    edge: None,
                })
            })
            .collect())
    }

    async fn search_entities<T: Record>(
        &self,
        request: &VectorSearchRequest,
        cancel: &CancellationToken,
        into_result: impl Fn(T, f32) -> VectorSearchResult,
    ) -> Result<Vec<VectorSearchResult>> {
        let graph_id = request
            .graph_id
            .ok_or_else(|| TrellisError::invalid_argument("graph id is required"))?;
        let graph = self
            .storage
            .graphs()
            .select_by_key(request.tenant_id, graph_id)
            .await?
            .ok_or_else(|| TrellisError::not_found("graph", graph_id))?;

        check(cancel)?;
        let scope = RecordQuery::graph(request.tenant_id, graph_id).with_filter(request.filter.clone());
        let mut candidates: HashMap<TrellisId, T> = T::repository(self.storage.as_ref())
            .select_page(&scope)
            .await?
            .into_iter()
            .map(|record| (record.id(), record))
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        check(cancel)?;
        let mut scores = None;
        if let Some(index) = self.indexes.index_for(&graph).await? {
            if self.should_use_index(&index, request, candidates.len()) {
                scores = self.score_with_index(&index, request, &candidates)?;
            }
        }
        let scores = match scores {
            Some(scores) => scores,
            None => {
                check(cancel)?;
                self.score_brute_force(request, graph_id, &candidates).await?
            }
        };

        Ok(scores
            .ranked(request)
            .into_iter()
            .filter_map(|(id, score)| candidates.remove(&id).map(|record| into_result(record, score)))
            .collect())
    }

    fn should_use_index(&self, index: &HnswIndex, request: &VectorSearchRequest, candidates: usize) -> bool {
        let config = index.config();
        request.top_k.is_some()
            && candidates >= config.threshold
            && request.embeddings.len() == config.dimensionality
    }

    /// Index path. Returns `None` when the index could not supply `top_k`
    /// accepted entities from the candidate set, in which case brute force
    /// takes over.
    fn score_with_index<T: Record>(
        &self,
        index: &HnswIndex,
        request: &VectorSearchRequest,
        candidates: &HashMap<TrellisId, T>,
    ) -> Result<Option<Scores>> {
        let top_k = request.top_k.unwrap_or(candidates.len());
        let wanted = top_k.min(candidates.len());
        let oversample = (top_k * 4).max(top_k + 16).min(index.len());

        let config = index.config();
        let mut scores = Scores::new(request.metric);
        for hit in index.search(&request.embeddings, oversample)? {
            let Some(owner) = hit.attachment.owner() else {
                continue;
            };
            if !candidates.contains_key(&owner) {
                continue;
            }
            let value = match convert(config.distance, request.metric, hit.distance) {
                Some(value) => value,
                None => match score(request.metric, &request.embeddings, &hit.vector) {
                    Some(value) => value,
                    None => continue,
                },
            };
            scores.offer(owner, value);
        }

        let accepted = scores.best.values().filter(|v| request.accepts(**v)).count();
        if accepted < wanted {
            debug!(
                "Index returned {} of {} wanted results, falling back to brute force",
                accepted, wanted
            );
            return Ok(None);
        }
        Ok(Some(scores))
    }

    async fn score_brute_force<T: Record>(
        &self,
        request: &VectorSearchRequest,
        graph_id: TrellisId,
        candidates: &HashMap<TrellisId, T>,
    ) -> Result<Scores> {
        let owners: Vec<TrellisId> = candidates.keys().copied().collect();
        let owner_set: HashSet<TrellisId> = owners.iter().copied().collect();
        let vectors = self
            .storage
            .vectors()
            .select_page(
                &RecordQuery::graph(request.tenant_id, graph_id).with_parent(ParentRef::AnyOf(owners)),
            )
            .await?;

        let mut scores = Scores::new(request.metric);
        for vector in &vectors {
            let Some(owner) = vector.attachment().owner().filter(|o| owner_set.contains(o)) else {
                continue;
            };
            if let Some(value) = score(request.metric, &request.embeddings, &vector.vectors) {
                scores.offer(owner, value);
            }
        }
        Ok(scores)
    }
}

fn check(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(TrellisError::Cancelled)
    } else {
        Ok(())
    }
}
