//! Integration tests for the in-memory repositories

use chrono::{Duration, Utc};
use serde_json::json;
use trellis_core::prelude::*;
use trellis_storage::MemoryStorage;

struct Fixture {
    storage: MemoryStorage,
    tenant: TrellisId,
    graph: TrellisId,
}

async fn fixture() -> Fixture {
    let storage = MemoryStorage::new();
    let tenant = storage.tenants().insert(Tenant::new("acme")).await.unwrap();
    let graph = storage
        .graphs()
        .insert(Graph::new(tenant.id, "people"))
        .await
        .unwrap();
    Fixture {
        storage,
        tenant: tenant.id,
        graph: graph.id,
    }
}

/// Nodes created one second apart so creation order is unambiguous.
async fn seed_nodes(f: &Fixture, names: &[&str]) -> Vec<Node> {
    let base = Utc::now();
    let mut out = Vec::new();
    for (i, name) in names.iter().enumerate() {
        let mut node = Node::new(f.tenant, f.graph, *name);
        node.created_utc = base + Duration::seconds(i as i64);
        out.push(f.storage.nodes().insert(node).await.unwrap());
    }
    out
}

#[tokio::test]
async fn test_select_page_orders_and_limits() {
    let f = fixture().await;
    let nodes = seed_nodes(&f, &["delta", "alpha", "charlie", "bravo"]).await;

    let query = RecordQuery::graph(f.tenant, f.graph).with_order(EnumerationOrder::NameAscending);
    let names: Vec<String> = f
        .storage
        .nodes()
        .select_page(&query)
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.name)
        .collect();
    assert_eq!(names, ["alpha", "bravo", "charlie", "delta"]);

    let query = RecordQuery::graph(f.tenant, f.graph)
        .with_order(EnumerationOrder::CreatedDescending)
        .with_skip(1)
        .with_limit(2);
    let page = f.storage.nodes().select_page(&query).await.unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].id, nodes[2].id);
    assert_eq!(page[1].id, nodes[1].id);
}

#[tokio::test]
async fn test_seek_after_marker() {
    let f = fixture().await;
    let nodes = seed_nodes(&f, &["a", "b", "c", "d", "e"]).await;

    let marker = nodes[1].sort_marker(EnumerationOrder::CreatedAscending).unwrap();
    let query = RecordQuery::graph(f.tenant, f.graph).after(Some(marker));

    let page = f.storage.nodes().select_page(&query).await.unwrap();
    let ids: Vec<TrellisId> = page.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![nodes[2].id, nodes[3].id, nodes[4].id]);
    assert_eq!(f.storage.nodes().count(&query).await.unwrap(), 3);
}

#[tokio::test]
async fn test_filter_by_labels_tags_and_expression() {
    let f = fixture().await;
    let nodes = seed_nodes(&f, &["ada", "grace", "linus"]).await;

    for (node, label) in nodes.iter().zip(["Person", "person", "robot"]) {
        let label = Label::new(f.tenant, f.graph, Attachment::Node(node.id), label);
        f.storage.labels().insert(label).await.unwrap();
    }
    let tag = Tag::new(f.tenant, f.graph, Attachment::Node(nodes[1].id), "Team", "navy");
    f.storage.tags().insert(tag).await.unwrap();

    let mut with_data = nodes[0].clone();
    with_data.data = Some(json!({"born": 1815}));
    f.storage.nodes().update(with_data).await.unwrap();

    let people = RecordQuery::graph(f.tenant, f.graph)
        .with_filter(SearchFilter::new().with_label("PERSON"));
    assert_eq!(f.storage.nodes().count(&people).await.unwrap(), 2);

    let navy = RecordQuery::graph(f.tenant, f.graph)
        .with_filter(SearchFilter::new().with_tag("team", "navy"));
    let found = f.storage.nodes().select_page(&navy).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, nodes[1].id);

    let wrong_case_value = RecordQuery::graph(f.tenant, f.graph)
        .with_filter(SearchFilter::new().with_tag("team", "NAVY"));
    assert_eq!(f.storage.nodes().count(&wrong_case_value).await.unwrap(), 0);

    let old = RecordQuery::graph(f.tenant, f.graph)
        .with_filter(SearchFilter::new().with_expression(Expr::lt("born", 1900)));
    let found = f.storage.nodes().select_page(&old).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "ada");
}

#[tokio::test]
async fn test_edge_adjacency_and_cost_order() {
    let f = fixture().await;
    let nodes = seed_nodes(&f, &["a", "b", "c"]).await;
    let (a, b, c) = (nodes[0].id, nodes[1].id, nodes[2].id);

    let edges = f.storage.edges();
    edges.insert(Edge::new(f.tenant, f.graph, a, b).with_cost(5)).await.unwrap();
    edges.insert(Edge::new(f.tenant, f.graph, a, c).with_cost(1)).await.unwrap();
    edges.insert(Edge::new(f.tenant, f.graph, c, a).with_cost(3)).await.unwrap();

    let from_a = RecordQuery::graph(f.tenant, f.graph)
        .with_adjacency(Adjacency::From(a))
        .with_order(EnumerationOrder::CostAscending);
    let costs: Vec<i32> = edges
        .select_page(&from_a)
        .await
        .unwrap()
        .iter()
        .map(|e| e.cost)
        .collect();
    assert_eq!(costs, vec![1, 5]);

    let touching = RecordQuery::graph(f.tenant, f.graph).with_adjacency(Adjacency::Touching(a));
    assert_eq!(edges.count(&touching).await.unwrap(), 3);

    let between = RecordQuery::graph(f.tenant, f.graph)
        .with_adjacency(Adjacency::Between { from: c, to: a });
    assert_eq!(edges.count(&between).await.unwrap(), 1);

    let node_order = RecordQuery::graph(f.tenant, f.graph)
        .with_order(EnumerationOrder::CostAscending);
    assert!(f.storage.nodes().select_page(&node_order).await.unwrap_err().is_invalid_argument());
}

#[tokio::test]
async fn test_most_connected_uses_derived_degree() {
    let f = fixture().await;
    let nodes = seed_nodes(&f, &["hub", "leaf1", "leaf2"]).await;
    let edges = f.storage.edges();
    edges.insert(Edge::new(f.tenant, f.graph, nodes[0].id, nodes[1].id)).await.unwrap();
    edges.insert(Edge::new(f.tenant, f.graph, nodes[2].id, nodes[0].id)).await.unwrap();

    let query = RecordQuery::graph(f.tenant, f.graph)
        .with_order(EnumerationOrder::MostConnected)
        .with_limit(1);
    let top = f.storage.nodes().select_page(&query).await.unwrap();
    assert_eq!(top[0].id, nodes[0].id);
    assert_eq!(top[0].total_degree, 2);
}

#[tokio::test]
async fn test_subordinates_by_parent_and_delete_where() {
    let f = fixture().await;
    let nodes = seed_nodes(&f, &["a", "b"]).await;

    let vectors = f.storage.vectors();
    for node in &nodes {
        let v = VectorRecord::new(f.tenant, f.graph, Attachment::Node(node.id), "m", vec![1.0, 0.0]);
        vectors.insert(v).await.unwrap();
    }
    let on_graph = VectorRecord::new(f.tenant, f.graph, Attachment::Graph, "m", vec![0.0, 1.0]);
    vectors.insert(on_graph).await.unwrap();

    let of_a = RecordQuery::graph(f.tenant, f.graph).with_parent(ParentRef::Node(nodes[0].id));
    assert_eq!(vectors.count(&of_a).await.unwrap(), 1);

    let any = RecordQuery::graph(f.tenant, f.graph)
        .with_parent(ParentRef::AnyOf(nodes.iter().map(|n| n.id).collect()));
    assert_eq!(vectors.count(&any).await.unwrap(), 2);

    let graph_level = RecordQuery::graph(f.tenant, f.graph).with_parent(ParentRef::Graph);
    assert_eq!(vectors.count(&graph_level).await.unwrap(), 1);

    assert_eq!(vectors.delete_where(&any).await.unwrap(), 2);
    assert_eq!(vectors.count(&RecordQuery::graph(f.tenant, f.graph)).await.unwrap(), 1);
}

#[tokio::test]
async fn test_select_by_keys_keeps_order_and_skips_missing() {
    let f = fixture().await;
    let nodes = seed_nodes(&f, &["a", "b", "c"]).await;
    let keys = vec![nodes[2].id, TrellisId::new(), nodes[0].id];

    let found = f.storage.nodes().select_by_keys(f.tenant, &keys).await.unwrap();
    let ids: Vec<TrellisId> = found.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![nodes[2].id, nodes[0].id]);
}

#[tokio::test]
async fn test_tenant_listing_spans_tenants() {
    let f = fixture().await;
    f.storage.tenants().insert(Tenant::new("globex")).await.unwrap();

    assert_eq!(f.storage.tenants().count(&RecordQuery::all()).await.unwrap(), 2);
    assert_eq!(f.storage.tenants().count(&RecordQuery::tenant(f.tenant)).await.unwrap(), 1);
}
