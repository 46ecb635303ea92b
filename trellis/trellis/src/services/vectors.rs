use crate::client::ClientContext;
use crate::services::SubordinateService;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use trellis_core::prelude::*;
use trellis_graph::ResultStream;

/// Vector records and similarity search. Every write is mirrored into the
/// owning graph's vector index when one is enabled.
#[derive(Clone)]
pub struct VectorService {
    records: SubordinateService<VectorRecord>,
}

impl VectorService {
    pub(crate) fn new(context: Arc<ClientContext>) -> Self {
        Self {
            records: SubordinateService::new(context),
        }
    }

    fn context(&self) -> &ClientContext {
        self.records.context()
    }

    pub async fn create(&self, vector: VectorRecord) -> Result<VectorRecord> {
        let graph = self
            .context()
            .load_graph(vector.tenant_id, vector.graph_id)
            .await?;
        let vector = self.records.create(vector).await?;
        self.context().indexes.on_vector_upsert(&graph, &vector).await?;
        Ok(vector)
    }

    pub async fn create_many(&self, vectors: Vec<VectorRecord>) -> Result<Vec<VectorRecord>> {
        let mut created = Vec::with_capacity(vectors.len());
        for vector in vectors {
            created.push(self.create(vector).await?);
        }
        Ok(created)
    }

    pub async fn read_by_guid(&self, tenant_id: TrellisId, vector_id: TrellisId) -> Result<Option<VectorRecord>> {
        self.records.read_by_guid(tenant_id, vector_id).await
    }

    pub async fn read_by_guids(&self, tenant_id: TrellisId, vector_ids: &[TrellisId]) -> Result<Vec<VectorRecord>> {
        self.records.read_by_guids(tenant_id, vector_ids).await
    }

    pub fn read_many(&self, query: EnumerationQuery, cancel: CancellationToken) -> ResultStream<VectorRecord> {
        self.records.read_many(query, cancel)
    }

    pub async fn read_first(
        &self,
        query: EnumerationQuery,
        cancel: &CancellationToken,
    ) -> Result<Option<VectorRecord>> {
        self.records.read_first(query, cancel).await
    }

    pub async fn enumerate(
        &self,
        query: EnumerationQuery,
        cancel: &CancellationToken,
    ) -> Result<EnumerationResult<VectorRecord>> {
        self.records.enumerate(query, cancel).await
    }

    pub async fn read_attached(
        &self,
        tenant_id: TrellisId,
        graph_id: TrellisId,
        attachment: Attachment,
    ) -> Result<Vec<VectorRecord>> {
        self.records.read_attached(tenant_id, graph_id, attachment).await
    }

    pub async fn update(&self, vector: VectorRecord) -> Result<VectorRecord> {
        let graph = self
            .context()
            .load_graph(vector.tenant_id, vector.graph_id)
            .await?;
        let vector = self.records.update(vector).await?;
        self.context().indexes.on_vector_upsert(&graph, &vector).await?;
        Ok(vector)
    }

    pub async fn delete_by_guid(&self, tenant_id: TrellisId, vector_id: TrellisId) -> Result<()> {
        let removed = self.records.remove(tenant_id, vector_id).await?;
        let graph = self.context().load_graph(tenant_id, removed.graph_id).await?;
        self.context().indexes.on_vector_delete(&graph, removed.id).await
    }

    pub async fn delete_many(&self, tenant_id: TrellisId, vector_ids: &[TrellisId]) -> Result<()> {
        for id in vector_ids {
            match self.delete_by_guid(tenant_id, *id).await {
                Err(e) if e.is_not_found() => continue,
                other => other?,
            }
        }
        Ok(())
    }

    /// Delete every vector in a graph; an enabled index ends up empty.
    pub async fn delete_all_in_graph(&self, tenant_id: TrellisId, graph_id: TrellisId) -> Result<u64> {
        let removed = self.records.delete_all_in_graph(tenant_id, graph_id).await?;
        let graph = self.context().load_graph(tenant_id, graph_id).await?;
        self.context().refresh_index(&graph).await?;
        Ok(removed)
    }

    pub async fn delete_attached(
        &self,
        tenant_id: TrellisId,
        graph_id: TrellisId,
        attachment: Attachment,
    ) -> Result<u64> {
        let graph = self.context().load_graph(tenant_id, graph_id).await?;
        let removed = self.records.delete_attached(tenant_id, graph_id, attachment).await?;
        if let Some(owner) = attachment.owner() {
            self.context().indexes.on_owner_delete(&graph, owner).await?;
        }
        Ok(removed)
    }

    pub async fn exists_by_guid(&self, tenant_id: TrellisId, vector_id: TrellisId) -> Result<bool> {
        self.records.exists_by_guid(tenant_id, vector_id).await
    }

    /// Rank graphs, nodes or edges by similarity to `request.embeddings`.
    pub async fn search(
        &self,
        request: &VectorSearchRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<VectorSearchResult>> {
        let ctx = self.context();
        ctx.require_tenant(request.tenant_id).await?;
        if let Some(graph_id) = request.graph_id {
            ctx.require_graph(request.tenant_id, graph_id).await?;
        }
        let mut results = ctx.search.search(request, cancel).await?;
        let options = request.options;
        for result in results.iter_mut() {
            if let Some(graph) = result.graph.take() {
                result.graph = Some(ctx.decorate_one(graph, options).await?);
            }
            if let Some(node) = result.node.take() {
                result.node = Some(ctx.decorate_one(node, options).await?);
            }
            if let Some(edge) = result.edge.take() {
                result.edge = Some(ctx.decorate_one(edge, options).await?);
            }
        }
        debug!(
            "Vector search over {:?} returned {} results",
            request.domain,
            results.len()
        );
        Ok(results)
    }
}
