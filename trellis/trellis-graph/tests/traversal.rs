//! Integration tests for subgraph extraction, statistics, routes and
//! neighbor queries against the in-memory storage.

use futures::StreamExt;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use trellis_core::config::TraversalConfig;
use trellis_core::prelude::*;
use trellis_graph::{Direction, TraversalEngine};
use trellis_storage::MemoryStorage;

struct TestGraph {
    storage: Arc<MemoryStorage>,
    engine: TraversalEngine,
    tenant: TrellisId,
    graph: TrellisId,
}

impl TestGraph {
    async fn new() -> Self {
        let storage = Arc::new(MemoryStorage::new());
        let tenant = storage.tenants().insert(Tenant::new("t")).await.unwrap().id;
        let graph = storage.graphs().insert(Graph::new(tenant, "g")).await.unwrap().id;
        let engine = TraversalEngine::new(storage.clone(), TraversalConfig::default());
        Self {
            storage,
            engine,
            tenant,
            graph,
        }
    }

    async fn node(&self, name: &str) -> TrellisId {
        let node = Node::new(self.tenant, self.graph, name);
        self.storage.nodes().insert(node).await.unwrap().id
    }

    async fn edge(&self, from: TrellisId, to: TrellisId, cost: i32) -> TrellisId {
        let edge = Edge::new(self.tenant, self.graph, from, to).with_cost(cost);
        self.storage.edges().insert(edge).await.unwrap().id
    }

    fn subgraph(&self, start: TrellisId, depth: usize) -> SubgraphRequest {
        SubgraphRequest::new(self.tenant, self.graph, start, depth)
    }
}

fn node_set(result: &SubgraphResult) -> HashSet<TrellisId> {
    result.nodes.iter().map(|n| n.id).collect()
}

fn edge_set(result: &SubgraphResult) -> HashSet<TrellisId> {
    result.edges.iter().map(|e| e.id).collect()
}

/// A -> B, B -> C, A -> D
async fn abcd() -> (TestGraph, [TrellisId; 4], [TrellisId; 3]) {
    let g = TestGraph::new().await;
    let a = g.node("A").await;
    let b = g.node("B").await;
    let c = g.node("C").await;
    let d = g.node("D").await;
    let ab = g.edge(a, b, 1).await;
    let bc = g.edge(b, c, 1).await;
    let ad = g.edge(a, d, 1).await;
    (g, [a, b, c, d], [ab, bc, ad])
}

#[tokio::test]
async fn test_subgraph_depth_one_and_two() {
    let (g, [a, b, c, d], [ab, bc, ad]) = abcd().await;
    let cancel = CancellationToken::new();

    let one = g.engine.subgraph(&g.subgraph(a, 1), &cancel).await.unwrap();
    assert_eq!(node_set(&one), HashSet::from([a, b, d]));
    assert_eq!(edge_set(&one), HashSet::from([ab, ad]));
    assert_eq!(one.graph.id, g.graph);

    let two = g.engine.subgraph(&g.subgraph(a, 2), &cancel).await.unwrap();
    assert_eq!(node_set(&two), HashSet::from([a, b, c, d]));
    assert_eq!(edge_set(&two), HashSet::from([ab, bc, ad]));
}

#[tokio::test]
async fn test_subgraph_depth_zero_is_start_only() {
    let (g, [a, ..], _) = abcd().await;
    let result = g
        .engine
        .subgraph(&g.subgraph(a, 0), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(node_set(&result), HashSet::from([a]));
    assert!(result.edges.is_empty());
}

#[tokio::test]
async fn test_subgraph_follows_incoming_edges() {
    let (g, [a, b, c, _], _) = abcd().await;
    let result = g
        .engine
        .subgraph(&g.subgraph(c, 2), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(node_set(&result), HashSet::from([a, b, c]));
}

#[tokio::test]
async fn test_subgraph_respects_node_and_edge_limits() {
    let g = TestGraph::new().await;
    let hub = g.node("hub").await;
    for i in 0..25 {
        let leaf = g.node(&format!("leaf{i}")).await;
        g.edge(hub, leaf, 0).await;
    }
    let cancel = CancellationToken::new();

    let capped = g
        .engine
        .subgraph(&g.subgraph(hub, 3).with_max_nodes(5), &cancel)
        .await
        .unwrap();
    assert_eq!(capped.nodes.len(), 5);
    let ids = node_set(&capped);
    assert!(capped.edges.iter().all(|e| ids.contains(&e.from) && ids.contains(&e.to)));

    let edge_capped = g
        .engine
        .subgraph(&g.subgraph(hub, 3).with_max_edges(7), &cancel)
        .await
        .unwrap();
    assert_eq!(edge_capped.edges.len(), 7);
    assert_eq!(edge_capped.nodes.len(), 8);
}

#[tokio::test]
async fn test_subgraph_never_exceeds_depth() {
    // chain n0 -> n1 -> ... -> n9
    let g = TestGraph::new().await;
    let mut chain = Vec::new();
    for i in 0..10 {
        chain.push(g.node(&format!("n{i}")).await);
    }
    for pair in chain.windows(2) {
        g.edge(pair[0], pair[1], 0).await;
    }

    let result = g
        .engine
        .subgraph(&g.subgraph(chain[0], 4), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(node_set(&result), chain[..5].iter().copied().collect());
    assert_eq!(result.edges.len(), 4);
}

#[tokio::test]
async fn test_subgraph_small_hydration_batches_match_default() {
    // root -> 4 children -> 3 grandchildren each -> 1 great-grandchild each,
    // plus one cross edge between levels
    let g = TestGraph::new().await;
    let root = g.node("root").await;
    let mut within_two = vec![root];
    let mut deepest = Vec::new();
    for i in 0..4 {
        let child = g.node(&format!("c{i}")).await;
        g.edge(root, child, 1).await;
        within_two.push(child);
        for j in 0..3 {
            let grandchild = g.node(&format!("g{i}{j}")).await;
            g.edge(child, grandchild, 1).await;
            within_two.push(grandchild);
            let leaf = g.node(&format!("l{i}{j}")).await;
            g.edge(grandchild, leaf, 1).await;
            deepest.push(leaf);
        }
    }
    g.edge(within_two[1], within_two[6], 1).await;

    let cancel = CancellationToken::new();
    let request = g.subgraph(root, 2);
    let expected = g.engine.subgraph(&request, &cancel).await.unwrap();
    assert_eq!(node_set(&expected), within_two.iter().copied().collect());

    for batch in [1, 2] {
        let config = TraversalConfig {
            hydration_batch: batch,
            ..TraversalConfig::default()
        };
        let engine = TraversalEngine::new(g.storage.clone(), config);

        let result = engine.subgraph(&request, &cancel).await.unwrap();
        assert_eq!(node_set(&result), node_set(&expected));
        assert_eq!(edge_set(&result), edge_set(&expected));
        assert!(deepest.iter().all(|leaf| !node_set(&result).contains(leaf)));

        let capped = engine
            .subgraph(&request.clone().with_max_nodes(6), &cancel)
            .await
            .unwrap();
        assert_eq!(capped.nodes.len(), 6);
        let ids = node_set(&capped);
        assert!(capped.edges.iter().all(|e| ids.contains(&e.from) && ids.contains(&e.to)));

        let edge_capped = engine
            .subgraph(&request.clone().with_max_edges(5), &cancel)
            .await
            .unwrap();
        assert_eq!(edge_capped.edges.len(), 5);
        let ids = node_set(&edge_capped);
        assert!(edge_capped.edges.iter().all(|e| ids.contains(&e.from) && ids.contains(&e.to)));
    }
}

#[tokio::test]
async fn test_subgraph_skips_dangling_nodes() {
    let (g, [a, b, _, d], [ab, _, ad]) = abcd().await;
    g.storage.nodes().delete(g.tenant, d).await.unwrap();

    let result = g
        .engine
        .subgraph(&g.subgraph(a, 1), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(node_set(&result), HashSet::from([a, b]));
    assert_eq!(edge_set(&result), HashSet::from([ab]));
    assert!(!edge_set(&result).contains(&ad));
}

#[tokio::test]
async fn test_subgraph_unknown_start_is_not_found() {
    let g = TestGraph::new().await;
    let err = g
        .engine
        .subgraph(&g.subgraph(TrellisId::new(), 2), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_statistics_count_subordinates() {
    let (g, [a, b, _, _], [ab, ..]) = abcd().await;
    let labels = g.storage.labels();
    labels
        .insert(Label::new(g.tenant, g.graph, Attachment::Node(a), "root"))
        .await
        .unwrap();
    labels
        .insert(Label::new(g.tenant, g.graph, Attachment::Edge(ab), "link"))
        .await
        .unwrap();
    g.storage
        .tags()
        .insert(Tag::new(g.tenant, g.graph, Attachment::Node(b), "k", "v"))
        .await
        .unwrap();
    g.storage
        .vectors()
        .insert(VectorRecord::new(g.tenant, g.graph, Attachment::Graph, "m", vec![1.0]))
        .await
        .unwrap();

    let stats = g
        .engine
        .statistics(&g.subgraph(a, 1), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(stats.nodes, 3);
    assert_eq!(stats.edges, 2);
    assert_eq!(stats.labels, 2);
    assert_eq!(stats.tags, 1);
    assert_eq!(stats.vectors, 0);
}

#[tokio::test]
async fn test_single_route_in_scenario() {
    let (g, [a, _, c, _], [ab, bc, _]) = abcd().await;
    let routes = g
        .engine
        .routes_by_cost(RouteRequest::new(g.tenant, g.graph, a, c), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(routes.len(), 1);
    let ids: Vec<TrellisId> = routes[0].edges.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![ab, bc]);
}

#[tokio::test]
async fn test_routes_are_simple_and_sorted_by_cost() {
    // a -> b -> d, a -> c -> d, b -> c, c -> a (cycle back to start)
    let g = TestGraph::new().await;
    let a = g.node("a").await;
    let b = g.node("b").await;
    let c = g.node("c").await;
    let d = g.node("d").await;
    g.edge(a, b, 5).await;
    g.edge(b, d, 5).await;
    g.edge(a, c, 1).await;
    g.edge(c, d, 1).await;
    g.edge(b, c, 1).await;
    g.edge(c, a, 1).await;

    let routes = g
        .engine
        .routes_by_cost(RouteRequest::new(g.tenant, g.graph, a, d), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(routes.len(), 3);
    let costs: Vec<f64> = routes.iter().map(|r| r.total_cost).collect();
    assert_eq!(costs, vec![2.0, 7.0, 10.0]);
    for route in &routes {
        let visited = route.nodes();
        let unique: HashSet<_> = visited.iter().collect();
        assert_eq!(unique.len(), visited.len());
        assert_eq!(visited.first(), Some(&a));
        assert_eq!(visited.last(), Some(&d));
    }

    let capped = g
        .engine
        .routes_by_cost(
            RouteRequest::new(g.tenant, g.graph, a, d).with_max_depth(2),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(capped.len(), 2);
}

#[tokio::test]
async fn test_route_filters() {
    let g = TestGraph::new().await;
    let a = g.node("a").await;
    let blocked = {
        let node = Node::new(g.tenant, g.graph, "b").with_data(json!({"open": false}));
        g.storage.nodes().insert(node).await.unwrap().id
    };
    let c = g.node("c").await;
    let d = g.node("d").await;
    g.edge(a, blocked, 0).await;
    g.edge(blocked, d, 0).await;
    g.storage
        .edges()
        .insert(Edge::new(g.tenant, g.graph, a, c).with_data(json!({"kind": "road"})))
        .await
        .unwrap();
    g.storage
        .edges()
        .insert(Edge::new(g.tenant, g.graph, c, d).with_data(json!({"kind": "road"})))
        .await
        .unwrap();

    let avoid_closed = RouteRequest::new(g.tenant, g.graph, a, d)
        .with_node_filter(Expr::eq("open", false).negate());
    let routes = g
        .engine
        .routes_by_cost(avoid_closed, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].nodes(), vec![a, c, d]);

    let roads_only = RouteRequest::new(g.tenant, g.graph, a, d).with_edge_filter(Expr::eq("kind", "road"));
    let routes = g
        .engine
        .routes_by_cost(roads_only, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(routes.len(), 1);
}

#[tokio::test]
async fn test_route_stream_stops_on_cancel() {
    let (g, [a, _, c, _], _) = abcd().await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut stream = g.engine.routes(RouteRequest::new(g.tenant, g.graph, a, c), cancel);
    let first = stream.next().await.unwrap();
    assert!(first.unwrap_err().is_cancelled());
}

#[tokio::test]
async fn test_neighbor_queries() {
    let (g, [a, b, c, d], _) = abcd().await;
    let cancel = CancellationToken::new();

    let children: HashSet<TrellisId> = g
        .engine
        .children(g.tenant, g.graph, a, &cancel)
        .await
        .unwrap()
        .iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(children, HashSet::from([b, d]));

    let parents = g.engine.parents(g.tenant, g.graph, b, &cancel).await.unwrap();
    assert_eq!(parents.len(), 1);
    assert_eq!(parents[0].id, a);

    // a parallel edge must not duplicate the neighbor
    g.edge(c, b, 0).await;
    g.edge(b, c, 0).await;
    let neighbors: Vec<TrellisId> = g
        .engine
        .neighbors(g.tenant, g.graph, b, &cancel)
        .await
        .unwrap()
        .iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(neighbors.len(), 2);
    assert_eq!(neighbors.iter().copied().collect::<HashSet<_>>(), HashSet::from([a, c]));

    let incoming = g
        .engine
        .incident_edges(g.tenant, g.graph, b, Direction::Incoming, &cancel)
        .await
        .unwrap();
    assert_eq!(incoming.len(), 2);
    let between = g.engine.edges_between(g.tenant, g.graph, b, c, &cancel).await.unwrap();
    assert_eq!(between.len(), 2);
}

#[tokio::test]
async fn test_most_and_least_connected() {
    let (g, [a, _, c, _], _) = abcd().await;
    g.edge(c, a, 0).await;
    let cancel = CancellationToken::new();
    let query = EnumerationQuery::new(g.tenant).in_graph(g.graph).with_max_results(1);

    // a: out 2 + in 1, b: 2, c: 2, d: 1
    let most = g.engine.most_connected(query.clone(), &cancel).await.unwrap();
    assert_eq!(most.objects[0].id, a);
    assert_eq!(most.objects[0].total_degree, 3);
    assert_eq!(most.records_remaining, 3);

    let least = g.engine.least_connected(query, &cancel).await.unwrap();
    assert_eq!(least.objects[0].total_degree, 1);

    let unscoped = EnumerationQuery::new(g.tenant);
    assert!(g.engine.most_connected(unscoped, &cancel).await.unwrap_err().is_invalid_argument());
}
