//! Integration tests for vector similarity search

use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use trellis_core::config::VectorConfig;
use trellis_core::prelude::*;
use trellis_storage::MemoryStorage;
use trellis_vector::distance::score;
use trellis_vector::{VectorIndexManager, VectorSearchEngine};

struct Fixture {
    storage: Arc<MemoryStorage>,
    manager: Arc<VectorIndexManager>,
    engine: VectorSearchEngine,
    tenant: TrellisId,
    graph: Graph,
}

async fn fixture() -> Fixture {
    let storage = Arc::new(MemoryStorage::new());
    let tenant = storage.tenants().insert(Tenant::new("t")).await.unwrap().id;
    let graph = storage.graphs().insert(Graph::new(tenant, "g")).await.unwrap();
    let manager = Arc::new(VectorIndexManager::new(storage.clone(), VectorConfig::default()));
    Fixture {
        engine: VectorSearchEngine::new(storage.clone(), manager.clone()),
        storage,
        manager,
        tenant,
        graph,
    }
}

impl Fixture {
    async fn node(&self, name: &str, vectors: &[Vec<f32>]) -> Node {
        let node = self
            .storage
            .nodes()
            .insert(Node::new(self.tenant, self.graph.id, name))
            .await
            .unwrap();
        for v in vectors {
            let record = VectorRecord::new(self.tenant, self.graph.id, Attachment::Node(node.id), "m", v.clone());
            self.storage.vectors().insert(record).await.unwrap();
        }
        node
    }

    async fn enable(&mut self, config: VectorIndexConfig) {
        self.graph.vector_index = Some(config.clone());
        self.storage.graphs().update(self.graph.clone()).await.unwrap();
        self.manager
            .enable(&self.graph, &config, &CancellationToken::new())
            .await
            .unwrap();
    }

    fn request(&self, metric: VectorSearchMetric, query: Vec<f32>) -> VectorSearchRequest {
        VectorSearchRequest::new(self.tenant, VectorSearchDomain::Node, metric, query).in_graph(self.graph.id)
    }

    async fn search(&self, request: &VectorSearchRequest) -> Vec<VectorSearchResult> {
        self.engine.search(request, &CancellationToken::new()).await.unwrap()
    }
}

fn pseudo_vector(seed: u64, dim: usize) -> Vec<f32> {
    let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(1);
    (0..dim)
        .map(|_| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            ((state >> 33) as f32 / (1u64 << 31) as f32) * 2.0 - 1.0
        })
        .collect()
}

#[tokio::test]
async fn test_cosine_similarity_ranking() {
    let f = fixture().await;
    let exact = f.node("exact", &[vec![1.0, 0.0]]).await;
    let close = f.node("close", &[vec![0.8, 0.6]]).await;
    let opposite = f.node("opposite", &[vec![-1.0, 0.0]]).await;

    let results = f.search(&f.request(VectorSearchMetric::CosineSimilarity, vec![1.0, 0.0])).await;
    let ids: Vec<_> = results.iter().filter_map(|r| r.entity_id()).collect();
    assert_eq!(ids, vec![exact.id, close.id, opposite.id]);
    assert!((results[0].score - 1.0).abs() < 1e-6);
    assert!(results.iter().all(|r| r.node.is_some() && r.edge.is_none()));

    let results = f.search(&f.request(VectorSearchMetric::CosineDistance, vec![1.0, 0.0])).await;
    let ids: Vec<_> = results.iter().filter_map(|r| r.entity_id()).collect();
    assert_eq!(ids, vec![exact.id, close.id, opposite.id]);
    assert!(results[0].score.abs() < 1e-6);
}

#[tokio::test]
async fn test_one_result_per_entity_with_best_vector() {
    let f = fixture().await;
    let node = f.node("two vectors", &[vec![0.0, 1.0], vec![1.0, 0.0]]).await;
    f.node("other", &[vec![0.5, 0.5]]).await;

    let results = f.search(&f.request(VectorSearchMetric::EuclideanDistance, vec![1.0, 0.0])).await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].entity_id(), Some(node.id));
    assert!(results[0].score.abs() < 1e-6);
}

#[tokio::test]
async fn test_length_mismatch_is_skipped() {
    let f = fixture().await;
    f.node("short", &[vec![1.0]]).await;
    let matching = f.node("matching", &[vec![1.0, 0.0]]).await;

    let results = f.search(&f.request(VectorSearchMetric::DotProduct, vec![2.0, 0.0])).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].entity_id(), Some(matching.id));
    assert!((results[0].score - 2.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_top_k_and_thresholds() {
    let f = fixture().await;
    for i in 0..5 {
        let angle = i as f32 * 0.3;
        f.node(&format!("n{}", i), &[vec![angle.cos(), angle.sin()]]).await;
    }

    let top = f
        .search(&f.request(VectorSearchMetric::CosineSimilarity, vec![1.0, 0.0]).with_top_k(2))
        .await;
    assert_eq!(top.len(), 2);
    assert!(top[0].score >= top[1].score);

    let strict = f
        .search(&f.request(VectorSearchMetric::CosineSimilarity, vec![1.0, 0.0]).with_min_score(0.9))
        .await;
    assert!(strict.iter().all(|r| r.score >= 0.9));
    assert_eq!(strict.len(), 2);

    let near = f
        .search(&f.request(VectorSearchMetric::EuclideanDistance, vec![1.0, 0.0]).with_max_distance(0.5))
        .await;
    assert!(near.iter().all(|r| r.score <= 0.5));
    assert_eq!(near.len(), 2);
}

#[tokio::test]
async fn test_filter_restricts_candidates() {
    let f = fixture().await;
    let plain = f.node("plain", &[vec![1.0, 0.0]]).await;
    let labelled = f.node("labelled", &[vec![0.0, 1.0]]).await;
    f.storage
        .labels()
        .insert(Label::new(f.tenant, f.graph.id, Attachment::Node(labelled.id), "keep"))
        .await
        .unwrap();

    let request = f
        .request(VectorSearchMetric::CosineSimilarity, vec![1.0, 0.0])
        .with_filter(SearchFilter::new().with_label("keep"));
    let results = f.search(&request).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].entity_id(), Some(labelled.id));
    assert_ne!(results[0].entity_id(), Some(plain.id));
}

#[tokio::test]
async fn test_edge_and_graph_domains() {
    let f = fixture().await;
    let a = f.node("a", &[]).await;
    let b = f.node("b", &[]).await;
    let edge = f
        .storage
        .edges()
        .insert(Edge::new(f.tenant, f.graph.id, a.id, b.id))
        .await
        .unwrap();
    f.storage
        .vectors()
        .insert(VectorRecord::new(f.tenant, f.graph.id, Attachment::Edge(edge.id), "m", vec![0.0, 1.0]))
        .await
        .unwrap();

    let request = VectorSearchRequest::new(
        f.tenant,
        VectorSearchDomain::Edge,
        VectorSearchMetric::CosineSimilarity,
        vec![0.0, 1.0],
    )
    .in_graph(f.graph.id);
    let results = f.search(&request).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].edge.as_ref().map(|e| e.id), Some(edge.id));

    let other = f.storage.graphs().insert(Graph::new(f.tenant, "other")).await.unwrap();
    for (graph, v) in [(f.graph.id, vec![1.0, 0.0]), (other.id, vec![0.0, 1.0])] {
        f.storage
            .vectors()
            .insert(VectorRecord::new(f.tenant, graph, Attachment::Graph, "m", v))
            .await
            .unwrap();
    }
    let request = VectorSearchRequest::new(
        f.tenant,
        VectorSearchDomain::Graph,
        VectorSearchMetric::CosineSimilarity,
        vec![0.0, 1.0],
    );
    let results = f.search(&request).await;
    let ids: Vec<_> = results.iter().filter_map(|r| r.entity_id()).collect();
    assert_eq!(ids, vec![other.id, f.graph.id]);

    let narrowed = f.search(&request.clone().in_graph(f.graph.id)).await;
    assert_eq!(narrowed.len(), 1);
    assert!(narrowed[0].graph.is_some());
}

#[tokio::test]
async fn test_index_agrees_with_brute_force() {
    let mut f = fixture().await;
    let dim = 8;
    let mut stored = Vec::new();
    for i in 0..150u64 {
        let v = pseudo_vector(i, dim);
        let node = f.node(&format!("n{}", i), std::slice::from_ref(&v)).await;
        stored.push((node.id, v));
    }
    f.enable(VectorIndexConfig::hnsw_ram(dim)).await;

    let query = pseudo_vector(10_000, dim);
    let mut expected: Vec<(TrellisId, f32)> = stored
        .iter()
        .map(|(id, v)| (*id, score(VectorSearchMetric::CosineSimilarity, &query, v).unwrap()))
        .collect();
    expected.sort_by(|a, b| b.1.total_cmp(&a.1));
    let expected: HashSet<TrellisId> = expected.iter().take(10).map(|(id, _)| *id).collect();

    let results = f
        .search(&f.request(VectorSearchMetric::CosineSimilarity, query.clone()).with_top_k(10))
        .await;
    assert_eq!(results.len(), 10);
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));

    let found: HashSet<TrellisId> = results.iter().filter_map(|r| r.entity_id()).collect();
    let overlap = found.intersection(&expected).count();
    assert!(overlap >= 8, "index recall too low: {} of 10", overlap);

    let distances = f
        .search(&f.request(VectorSearchMetric::CosineDistance, query).with_top_k(10))
        .await;
    assert!(distances.windows(2).all(|w| w[0].score <= w[1].score));
}

#[tokio::test]
async fn test_small_population_uses_brute_force() {
    let mut f = fixture().await;
    f.enable(VectorIndexConfig::hnsw_ram(2)).await;

    // Written straight to storage, so only brute force can see it.
    let unindexed = f.node("unindexed", &[vec![1.0, 0.0]]).await;
    let results = f
        .search(&f.request(VectorSearchMetric::CosineSimilarity, vec![1.0, 0.0]).with_top_k(1))
        .await;
    assert_eq!(results[0].entity_id(), Some(unindexed.id));
}

#[tokio::test]
async fn test_invalid_and_cancelled_requests() {
    let f = fixture().await;
    let missing_graph = VectorSearchRequest::new(
        f.tenant,
        VectorSearchDomain::Node,
        VectorSearchMetric::DotProduct,
        vec![1.0],
    );
    let err = f
        .engine
        .search(&missing_graph, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_invalid_argument());

    let unknown = missing_graph.clone().in_graph(TrellisId::new());
    let err = f.engine.search(&unknown, &CancellationToken::new()).await.unwrap_err();
    assert!(err.is_not_found());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = f
        .engine
        .search(&f.request(VectorSearchMetric::DotProduct, vec![1.0]), &cancel)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
}
