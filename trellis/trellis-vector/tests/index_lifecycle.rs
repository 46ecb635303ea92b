//! Integration tests for index enable/disable/rebuild and persistence

use std::sync::Arc;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;
use trellis_core::config::VectorConfig;
use trellis_core::prelude::*;
use trellis_storage::MemoryStorage;
use trellis_vector::VectorIndexManager;

async fn seeded() -> (Arc<MemoryStorage>, Graph, Vec<VectorRecord>) {
    let storage = Arc::new(MemoryStorage::new());
    let tenant = storage.tenants().insert(Tenant::new("t")).await.unwrap().id;
    let graph = storage.graphs().insert(Graph::new(tenant, "g")).await.unwrap();

    let mut vectors = Vec::new();
    for (i, v) in [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]].iter().enumerate() {
        let node = storage
            .nodes()
            .insert(Node::new(tenant, graph.id, format!("n{}", i)))
            .await
            .unwrap();
        let record = VectorRecord::new(tenant, graph.id, Attachment::Node(node.id), "m", v.to_vec());
        vectors.push(storage.vectors().insert(record).await.unwrap());
    }
    storage
        .vectors()
        .insert(VectorRecord::new(tenant, graph.id, Attachment::Graph, "m", vec![1.0, 1.0, 1.0]))
        .await
        .unwrap();
    (storage, graph, vectors)
}

async fn persist_config(storage: &MemoryStorage, graph: &mut Graph, config: Option<VectorIndexConfig>) {
    graph.vector_index = config;
    storage.graphs().update(graph.clone()).await.unwrap();
}

#[tokio::test]
async fn test_enable_builds_from_existing_vectors() {
    let (storage, mut graph, _) = seeded().await;
    let manager = VectorIndexManager::new(storage.clone(), VectorConfig::default());
    let config = VectorIndexConfig::hnsw_ram(3);
    persist_config(&storage, &mut graph, Some(config.clone())).await;

    let stats = manager
        .enable(&graph, &config, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(stats.vector_count, 3);
    assert_eq!(stats.dimensionality, 3);
    assert_eq!(stats.m, 16);
    assert!(stats.last_built_utc.is_some());
}

#[tokio::test]
async fn test_enable_rejects_invalid_config() {
    let (storage, graph, _) = seeded().await;
    let manager = VectorIndexManager::new(storage, VectorConfig::default());

    let mut config = VectorIndexConfig::hnsw_ram(0);
    let err = manager
        .enable(&graph, &config, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_invalid_argument());

    config.dimensionality = 3;
    config.index_type = VectorIndexType::HnswFile;
    assert!(manager.enable(&graph, &config, &CancellationToken::new()).await.is_err());
}

#[tokio::test]
async fn test_file_index_survives_restart() {
    let dir = tempdir().unwrap();
    let (storage, mut graph, vectors) = seeded().await;
    let vector_config = VectorConfig {
        index_dir: Some(dir.path().to_path_buf()),
        ..VectorConfig::default()
    };

    let manager = VectorIndexManager::new(storage.clone(), vector_config.clone());
    let config = manager.resolve_config(
        graph.id,
        manager.default_config(VectorIndexType::HnswFile, 3),
    );
    let path = config.file.clone().unwrap();
    assert!(path.starts_with(dir.path()));

    persist_config(&storage, &mut graph, Some(config.clone())).await;
    manager.enable(&graph, &config, &CancellationToken::new()).await.unwrap();
    assert!(path.exists());

    // Removed from storage behind the index's back: a restart must load
    // the artifact rather than rebuild from storage.
    storage.vectors().delete(graph.tenant_id, vectors[0].id).await.unwrap();

    let restarted = VectorIndexManager::new(storage.clone(), vector_config);
    let stats = restarted.statistics(&graph).await.unwrap();
    assert_eq!(stats.vector_count, 3);
    assert_eq!(stats.file.as_deref(), Some(path.as_path()));

    restarted.disable(&graph, true).await.unwrap();
    assert!(!path.exists());
}

#[tokio::test]
async fn test_write_mirroring_and_rebuild() {
    let (storage, mut graph, vectors) = seeded().await;
    let manager = VectorIndexManager::new(storage.clone(), VectorConfig::default());
    let config = VectorIndexConfig::hnsw_ram(3);
    persist_config(&storage, &mut graph, Some(config.clone())).await;
    manager.enable(&graph, &config, &CancellationToken::new()).await.unwrap();

    let owner = vectors[0].node_id.unwrap();
    let extra = VectorRecord::new(graph.tenant_id, graph.id, Attachment::Node(owner), "m", vec![0.5, 0.5, 0.0]);
    manager.on_vector_upsert(&graph, &extra).await.unwrap();
    assert_eq!(manager.statistics(&graph).await.unwrap().vector_count, 4);

    let wrong_size = VectorRecord::new(graph.tenant_id, graph.id, Attachment::Node(owner), "m", vec![1.0]);
    manager.on_vector_upsert(&graph, &wrong_size).await.unwrap();
    assert_eq!(manager.statistics(&graph).await.unwrap().vector_count, 4);

    manager.on_vector_delete(&graph, vectors[1].id).await.unwrap();
    assert_eq!(manager.statistics(&graph).await.unwrap().vector_count, 3);

    manager.on_owner_delete(&graph, owner).await.unwrap();
    assert_eq!(manager.statistics(&graph).await.unwrap().vector_count, 1);

    // Storage still holds the three node vectors.
    let stats = manager.rebuild(&graph, &CancellationToken::new()).await.unwrap();
    assert_eq!(stats.vector_count, 3);
}

#[tokio::test]
async fn test_disabled_graph_has_no_index() {
    let (storage, mut graph, _) = seeded().await;
    let manager = VectorIndexManager::new(storage.clone(), VectorConfig::default());

    assert!(manager.index_for(&graph).await.unwrap().is_none());
    let err = manager
        .rebuild(&graph, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_invalid_argument());
    assert!(manager.statistics(&graph).await.unwrap_err().is_invalid_argument());

    let config = VectorIndexConfig::hnsw_ram(3);
    persist_config(&storage, &mut graph, Some(config)).await;
    let index = manager.index_for(&graph).await.unwrap().unwrap();
    assert_eq!(index.len(), 3);

    manager.disable(&graph, false).await.unwrap();
    persist_config(&storage, &mut graph, None).await;
    assert!(manager.index_for(&graph).await.unwrap().is_none());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = manager
        .enable(&graph, &VectorIndexConfig::hnsw_ram(3), &cancel)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
}
