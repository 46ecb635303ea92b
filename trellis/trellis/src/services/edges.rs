use crate::client::{ClientContext, Decorated};
use crate::services::{graph_scope, query_options};
use async_stream::try_stream;
use chrono::Utc;
use futures::TryStreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use trellis_core::prelude::*;
use trellis_graph::{Direction, ResultStream};

/// Edge management and endpoint queries.
#[derive(Clone)]
pub struct EdgeService {
    context: Arc<ClientContext>,
}

impl EdgeService {
    pub(crate) fn new(context: Arc<ClientContext>) -> Self {
        Self { context }
    }

    /// Both endpoints must be nodes of the edge's graph.
    async fn require_endpoints(&self, edge: &Edge) -> Result<()> {
        let ctx = &self.context;
        ctx.require_node(edge.tenant_id, edge.graph_id, edge.from).await?;
        ctx.require_node(edge.tenant_id, edge.graph_id, edge.to).await
    }

    pub async fn create(&self, mut edge: Edge) -> Result<Edge> {
        let ctx = &self.context;
        let graph = ctx.load_graph(edge.tenant_id, edge.graph_id).await?;
        self.require_endpoints(&edge).await?;
        let subordinates = edge
            .take_subordinates()
            .into_records(edge.tenant_id, edge.graph_id, edge.owner_attachment())?;

        let edge = ctx.storage.edges().insert(edge).await?;
        ctx.caches.edges.insert((edge.tenant_id, edge.graph_id, edge.id));
        ctx.attach_subordinates(&graph, subordinates).await?;

        debug!("Created edge {} ({} -> {})", edge.id, edge.from, edge.to);
        Ok(edge)
    }

    pub async fn create_many(&self, edges: Vec<Edge>) -> Result<Vec<Edge>> {
        let mut created = Vec::with_capacity(edges.len());
        for edge in edges {
            created.push(self.create(edge).await?);
        }
        Ok(created)
    }

    pub async fn read_by_guid(
        &self,
        tenant_id: TrellisId,
        graph_id: TrellisId,
        edge_id: TrellisId,
        options: ReadOptions,
    ) -> Result<Option<Edge>> {
        let edge = self
            .context
            .storage
            .edges()
            .select_by_key(tenant_id, edge_id)
            .await?
            .filter(|e| e.graph_id == graph_id);
        match edge {
            Some(edge) => self.context.decorate_one(edge, options).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn read_by_guids(
        &self,
        tenant_id: TrellisId,
        graph_id: TrellisId,
        edge_ids: &[TrellisId],
        options: ReadOptions,
    ) -> Result<Vec<Edge>> {
        let edges: Vec<Edge> = self
            .context
            .storage
            .edges()
            .select_by_keys(tenant_id, edge_ids)
            .await?
            .into_iter()
            .filter(|e| e.graph_id == graph_id)
            .collect();
        self.context.decorate(edges, options).await
    }

    pub fn read_many(&self, query: EnumerationQuery, cancel: CancellationToken) -> ResultStream<Edge> {
        let context = self.context.clone();
        Box::pin(try_stream! {
            let (tenant_id, graph_id) = graph_scope(&query)?;
            context.require_graph(tenant_id, graph_id).await?;
            let options = query_options(&query);
            let mut edges = context.enumerator.stream::<Edge>(query, cancel);
            while let Some(edge) = edges.try_next().await? {
                yield context.decorate_one(edge, options).await?;
            }
        })
    }

    pub async fn read_first(&self, query: EnumerationQuery, cancel: &CancellationToken) -> Result<Option<Edge>> {
        let page = self.enumerate(query.with_max_results(1), cancel).await?;
        Ok(page.objects.into_iter().next())
    }

    pub async fn enumerate(&self, query: EnumerationQuery, cancel: &CancellationToken) -> Result<EnumerationResult<Edge>> {
        let ctx = &self.context;
        let (tenant_id, graph_id) = graph_scope(&query)?;
        ctx.require_graph(tenant_id, graph_id).await?;
        let mut page = ctx.enumerator.enumerate::<Edge>(&query, cancel).await?;
        page.objects = ctx.decorate(page.objects, query_options(&query)).await?;
        Ok(page)
    }

    /// Update name, cost, payload or endpoints. New endpoints must exist in
    /// the same graph.
    pub async fn update(&self, mut edge: Edge) -> Result<Edge> {
        let ctx = &self.context;
        let existing = ctx
            .storage
            .edges()
            .select_by_key(edge.tenant_id, edge.id)
            .await?
            .ok_or_else(|| TrellisError::not_found("edge", edge.id))?;
        if existing.graph_id != edge.graph_id {
            return Err(TrellisError::invalid_argument("edges cannot move between graphs"));
        }
        self.require_endpoints(&edge).await?;

        edge.take_subordinates();
        edge.created_utc = existing.created_utc;
        edge.last_update_utc = Utc::now();
        ctx.caches.edges.invalidate(&(edge.tenant_id, edge.graph_id, edge.id));
        ctx.storage.edges().update(edge).await
    }

    /// Delete an edge and its labels, tags and vectors.
    pub async fn delete_by_guid(&self, tenant_id: TrellisId, graph_id: TrellisId, edge_id: TrellisId) -> Result<()> {
        let ctx = &self.context;
        ctx.require_edge(tenant_id, graph_id, edge_id).await?;
        let graph = ctx.load_graph(tenant_id, graph_id).await?;

        ctx.purge_subordinates(&graph, Attachment::Edge(edge_id)).await?;
        ctx.storage.edges().delete(tenant_id, edge_id).await?;
        ctx.caches.edges.invalidate(&(tenant_id, graph_id, edge_id));
        debug!("Deleted edge {}", edge_id);
        Ok(())
    }

    pub async fn delete_many(&self, tenant_id: TrellisId, graph_id: TrellisId, edge_ids: &[TrellisId]) -> Result<()> {
        for id in edge_ids {
            match self.delete_by_guid(tenant_id, graph_id, *id).await {
                Err(e) if e.is_not_found() => continue,
                other => other?,
            }
        }
        self.context.caches.edges.clear();
        Ok(())
    }

    /// Delete every edge of a graph with its subordinates. Nodes remain.
    pub async fn delete_all_in_graph(&self, tenant_id: TrellisId, graph_id: TrellisId) -> Result<()> {
        let ctx = &self.context;
        let graph = ctx.load_graph(tenant_id, graph_id).await?;
        let scope = RecordQuery::graph(tenant_id, graph_id);

        let owners: Vec<TrellisId> = ctx
            .storage
            .edges()
            .select_page(&scope)
            .await?
            .into_iter()
            .map(|e| e.id)
            .collect();
        if !owners.is_empty() {
            let attached = scope.clone().with_parent(ParentRef::AnyOf(owners));
            ctx.storage.labels().delete_where(&attached).await?;
            ctx.storage.tags().delete_where(&attached).await?;
            ctx.storage.vectors().delete_where(&attached).await?;
        }
        let removed = ctx.storage.edges().delete_where(&scope).await?;
        ctx.refresh_index(&graph).await?;

        ctx.caches.edges.clear();
        info!("Deleted {} edges from graph {}", removed, graph_id);
        Ok(())
    }

    pub async fn exists_by_guid(&self, tenant_id: TrellisId, graph_id: TrellisId, edge_id: TrellisId) -> Result<bool> {
        match self.context.require_edge(tenant_id, graph_id, edge_id).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Edges leaving `node_id`.
    pub async fn read_edges_from(
        &self,
        tenant_id: TrellisId,
        graph_id: TrellisId,
        node_id: TrellisId,
        options: ReadOptions,
    ) -> Result<Vec<Edge>> {
        self.incident(tenant_id, graph_id, node_id, Direction::Outgoing, options)
            .await
    }

    /// Edges arriving at `node_id`.
    pub async fn read_edges_to(
        &self,
        tenant_id: TrellisId,
        graph_id: TrellisId,
        node_id: TrellisId,
        options: ReadOptions,
    ) -> Result<Vec<Edge>> {
        self.incident(tenant_id, graph_id, node_id, Direction::Incoming, options)
            .await
    }

    /// Every edge touching `node_id`, in either direction.
    pub async fn read_node_edges(
        &self,
        tenant_id: TrellisId,
        graph_id: TrellisId,
        node_id: TrellisId,
        options: ReadOptions,
    ) -> Result<Vec<Edge>> {
        self.incident(tenant_id, graph_id, node_id, Direction::Both, options)
            .await
    }

    /// Edges running from `from` to `to`. The reverse direction is not
    /// included.
    pub async fn read_edges_between(
        &self,
        tenant_id: TrellisId,
        graph_id: TrellisId,
        from: TrellisId,
        to: TrellisId,
        options: ReadOptions,
    ) -> Result<Vec<Edge>> {
        let ctx = &self.context;
        ctx.require_node(tenant_id, graph_id, from).await?;
        ctx.require_node(tenant_id, graph_id, to).await?;
        let edges = ctx
            .traversal
            .edges_between(tenant_id, graph_id, from, to, &CancellationToken::new())
            .await?;
        ctx.decorate(edges, options).await
    }

    async fn incident(
        &self,
        tenant_id: TrellisId,
        graph_id: TrellisId,
        node_id: TrellisId,
        direction: Direction,
        options: ReadOptions,
    ) -> Result<Vec<Edge>> {
        let ctx = &self.context;
        ctx.require_node(tenant_id, graph_id, node_id).await?;
        let edges = ctx
            .traversal
            .incident_edges(tenant_id, graph_id, node_id, direction, &CancellationToken::new())
            .await?;
        ctx.decorate(edges, options).await
    }
}
