//! Bounded breadth-first subgraph extraction and statistics.
//!
//! Neighbor ids discovered while draining the frontier are buffered and
//! hydrated in one batched read, either when the queue runs dry or when the
//! buffer reaches the configured batch size. Nodes that fail to resolve are
//! logged and dropped together with the edges that referenced them.

use crate::enumeration::Enumerator;
use crate::ensure_active;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use trellis_core::config::TraversalConfig;
use trellis_core::prelude::*;

/// Subgraph, route and neighbor queries over a [`Storage`].
#[derive(Clone)]
pub struct TraversalEngine {
    pub(crate) storage: Arc<dyn Storage>,
    pub(crate) enumerator: Enumerator,
    pub(crate) config: TraversalConfig,
}

impl TraversalEngine {
    pub fn new(storage: Arc<dyn Storage>, config: TraversalConfig) -> Self {
        Self::with_enumerator(storage.clone(), config, Enumerator::new(storage))
    }

    pub fn with_enumerator(storage: Arc<dyn Storage>, config: TraversalConfig, enumerator: Enumerator) -> Self {
        Self {
            storage,
            enumerator,
            config,
        }
    }

    /// Nodes and edges reachable from `request.start` within the request's
    /// depth, node and edge bounds. Edges are followed in both directions.
    pub async fn subgraph(
        &self,
        request: &SubgraphRequest,
        cancel: &CancellationToken,
    ) -> Result<SubgraphResult> {
        let graph = self.load_graph(request.tenant_id, request.graph_id).await?;
        let walk = self.walk(request, true, cancel).await?;
        debug!(
            graph_id = %request.graph_id,
            start = %request.start,
            nodes = walk.nodes.len(),
            edges = walk.edges.len(),
            "Extracted subgraph"
        );
        Ok(SubgraphResult {
            graph,
            nodes: walk.nodes,
            edges: walk.edges,
        })
    }

    /// Same walk as [`Self::subgraph`] but only counts what it reaches,
    /// including labels, tags and vectors on the reached nodes and edges.
    pub async fn statistics(
        &self,
        request: &SubgraphRequest,
        cancel: &CancellationToken,
    ) -> Result<GraphStatistics> {
        self.load_graph(request.tenant_id, request.graph_id).await?;
        let walk = self.walk(request, false, cancel).await?;

        let owners: Vec<TrellisId> = walk
            .node_ids
            .iter()
            .copied()
            .chain(walk.edges.iter().map(|e| e.id))
            .collect();
        let scope = RecordQuery::graph(request.tenant_id, request.graph_id)
            .with_parent(ParentRef::AnyOf(owners));

        ensure_active(cancel)?;
        let labels = self.storage.labels().count(&scope).await?;
        ensure_active(cancel)?;
        let tags = self.storage.tags().count(&scope).await?;
        ensure_active(cancel)?;
        let vectors = self.storage.vectors().count(&scope).await?;

        Ok(GraphStatistics {
            nodes: walk.node_ids.len() as u64,
            edges: walk.edges.len() as u64,
            labels,
            tags,
            vectors,
        })
    }

    pub(crate) async fn load_graph(&self, tenant_id: TrellisId, graph_id: TrellisId) -> Result<Graph> {
        self.storage
            .graphs()
            .select_by_key(tenant_id, graph_id)
            .await?
            .ok_or_else(|| TrellisError::not_found("graph", graph_id))
    }

    pub(crate) async fn load_node(
        &self,
        tenant_id: TrellisId,
        graph_id: TrellisId,
        node_id: TrellisId,
    ) -> Result<Node> {
        self.storage
            .nodes()
            .select_by_key(tenant_id, node_id)
            .await?
            .filter(|n| n.graph_id == graph_id)
            .ok_or_else(|| TrellisError::not_found("node", node_id))
    }

    async fn walk(
        &self,
        request: &SubgraphRequest,
        materialize: bool,
        cancel: &CancellationToken,
    ) -> Result<Walk> {
        ensure_active(cancel)?;
        let start = self
            .load_node(request.tenant_id, request.graph_id, request.start)
            .await?;

        let mut walk = Walk::new(materialize);
        walk.admit(start, 0);
        let batch = self.config.hydration_batch.max(1);

        loop {
            while let Some((node_id, depth)) = walk.queue.pop_front() {
                if depth >= request.max_depth || request.edge_limit_reached(walk.edges.len()) {
                    continue;
                }

                ensure_active(cancel)?;
                let touching = RecordQuery::graph(request.tenant_id, request.graph_id)
                    .with_adjacency(Adjacency::Touching(node_id));
                let edges = self.storage.edges().select_page(&touching).await?;

                for edge in edges {
                    if walk.edge_ids.contains(&edge.id) {
                        continue;
                    }
                    if request.edge_limit_reached(walk.edges.len()) {
                        break;
                    }
                    let Some(other) = edge.other_end(node_id) else {
                        continue;
                    };
                    if !walk.known.contains(&other) {
                        if request.node_limit_reached(walk.known.len()) {
                            continue;
                        }
                        walk.known.insert(other);
                        walk.pending.push((other, depth + 1));
                    }
                    walk.edge_ids.insert(edge.id);
                    walk.edges.push(edge);
                }

                if walk.pending.len() >= batch {
                    self.hydrate(request, &mut walk, cancel).await?;
                }
            }

            if walk.pending.is_empty() {
                break;
            }
            self.hydrate(request, &mut walk, cancel).await?;
        }

        if !walk.missing.is_empty() {
            let missing = &walk.missing;
            walk.edges
                .retain(|e| !missing.contains(&e.from) && !missing.contains(&e.to));
        }
        Ok(walk)
    }

    async fn hydrate(
        &self,
        request: &SubgraphRequest,
        walk: &mut Walk,
        cancel: &CancellationToken,
    ) -> Result<()> {
        ensure_active(cancel)?;
        let pending = std::mem::take(&mut walk.pending);
        let ids: Vec<TrellisId> = pending.iter().map(|(id, _)| *id).collect();
        let found = self
            .storage
            .nodes()
            .select_by_keys(request.tenant_id, &ids)
            .await?;
        let mut found: std::collections::HashMap<TrellisId, Node> = found
            .into_iter()
            .filter(|n| n.graph_id == request.graph_id)
            .map(|n| (n.id, n))
            .collect();

        for (id, depth) in pending {
            match found.remove(&id) {
                Some(node) => walk.admit(node, depth),
                None => {
                    warn!(
                        node_id = %id,
                        graph_id = %request.graph_id,
                        "Skipping node referenced by an edge but missing from storage"
                    );
                    walk.missing.insert(id);
                }
            }
        }
        Ok(())
    }
}

/// Traversal bookkeeping.
struct Walk {
    materialize: bool,
    nodes: Vec<Node>,
    node_ids: Vec<TrellisId>,
    /// Hydrated or pending hydration
    known: HashSet<TrellisId>,
    pending: Vec<(TrellisId, usize)>,
    queue: VecDeque<(TrellisId, usize)>,
    edges: Vec<Edge>,
    edge_ids: HashSet<TrellisId>,
    missing: HashSet<TrellisId>,
}

impl Walk {
    fn new(materialize: bool) -> Self {
        Self {
            materialize,
            nodes: Vec::new(),
            node_ids: Vec::new(),
            known: HashSet::new(),
            pending: Vec::new(),
            queue: VecDeque::new(),
            edges: Vec::new(),
            edge_ids: HashSet::new(),
            missing: HashSet::new(),
        }
    }

    fn admit(&mut self, node: Node, depth: usize) {
        self.known.insert(node.id);
        self.node_ids.push(node.id);
        self.queue.push_back((node.id, depth));
        if self.materialize {
            self.nodes.push(node);
        }
    }
}
