use crate::client::{ClientContext, Decorated};
use crate::services::{graph_scope, query_options};
use async_stream::try_stream;
use chrono::Utc;
use futures::TryStreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use trellis_core::prelude::*;
use trellis_graph::ResultStream;

/// Node management and adjacency queries.
#[derive(Clone)]
pub struct NodeService {
    context: Arc<ClientContext>,
}

impl NodeService {
    pub(crate) fn new(context: Arc<ClientContext>) -> Self {
        Self { context }
    }

    /// Create a node. Inline labels, tags and vectors are stored as the
    /// node's subordinates and vectors are mirrored into the graph's index.
    pub async fn create(&self, mut node: Node) -> Result<Node> {
        let ctx = &self.context;
        let graph = ctx.load_graph(node.tenant_id, node.graph_id).await?;
        let subordinates = node
            .take_subordinates()
            .into_records(node.tenant_id, node.graph_id, node.owner_attachment())?;

        node.in_degree = 0;
        node.out_degree = 0;
        node.total_degree = 0;
        let node = ctx.storage.nodes().insert(node).await?;
        ctx.caches.nodes.insert((node.tenant_id, node.graph_id, node.id));
        ctx.attach_subordinates(&graph, subordinates).await?;

        debug!("Created node {} in graph {}", node.id, node.graph_id);
        Ok(node)
    }

    pub async fn create_many(&self, nodes: Vec<Node>) -> Result<Vec<Node>> {
        let mut created = Vec::with_capacity(nodes.len());
        for node in nodes {
            created.push(self.create(node).await?);
        }
        Ok(created)
    }

    pub async fn read_by_guid(
        &self,
        tenant_id: TrellisId,
        graph_id: TrellisId,
        node_id: TrellisId,
        options: ReadOptions,
    ) -> Result<Option<Node>> {
        let node = self
            .context
            .storage
            .nodes()
            .select_by_key(tenant_id, node_id)
            .await?
            .filter(|n| n.graph_id == graph_id);
        match node {
            Some(node) => self.context.decorate_one(node, options).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn read_by_guids(
        &self,
        tenant_id: TrellisId,
        graph_id: TrellisId,
        node_ids: &[TrellisId],
        options: ReadOptions,
    ) -> Result<Vec<Node>> {
        let nodes: Vec<Node> = self
            .context
            .storage
            .nodes()
            .select_by_keys(tenant_id, node_ids)
            .await?
            .into_iter()
            .filter(|n| n.graph_id == graph_id)
            .collect();
        self.context.decorate(nodes, options).await
    }

    /// Every node matching `query`, fetched a page at a time.
    pub fn read_many(&self, query: EnumerationQuery, cancel: CancellationToken) -> ResultStream<Node> {
        let context = self.context.clone();
        Box::pin(try_stream! {
            let (tenant_id, graph_id) = graph_scope(&query)?;
            context.require_graph(tenant_id, graph_id).await?;
            let options = query_options(&query);
            let mut nodes = context.enumerator.stream::<Node>(query, cancel);
            while let Some(node) = nodes.try_next().await? {
                yield context.decorate_one(node, options).await?;
            }
        })
    }

    pub async fn read_first(&self, query: EnumerationQuery, cancel: &CancellationToken) -> Result<Option<Node>> {
        let page = self.enumerate(query.with_max_results(1), cancel).await?;
        Ok(page.objects.into_iter().next())
    }

    pub async fn enumerate(&self, query: EnumerationQuery, cancel: &CancellationToken) -> Result<EnumerationResult<Node>> {
        let ctx = &self.context;
        let (tenant_id, graph_id) = graph_scope(&query)?;
        ctx.require_graph(tenant_id, graph_id).await?;
        let mut page = ctx.enumerator.enumerate::<Node>(&query, cancel).await?;
        page.objects = ctx.decorate(page.objects, query_options(&query)).await?;
        Ok(page)
    }

    /// Update name and payload. Degrees are derived and subordinates have
    /// their own operations.
    pub async fn update(&self, mut node: Node) -> Result<Node> {
        let ctx = &self.context;
        let existing = ctx
            .storage
            .nodes()
            .select_by_key(node.tenant_id, node.id)
            .await?
            .ok_or_else(|| TrellisError::not_found("node", node.id))?;
        if existing.graph_id != node.graph_id {
            return Err(TrellisError::invalid_argument("nodes cannot move between graphs"));
        }

        node.take_subordinates();
        node.created_utc = existing.created_utc;
        node.last_update_utc = Utc::now();
        ctx.caches.nodes.invalidate(&(node.tenant_id, node.graph_id, node.id));
        ctx.storage.nodes().update(node).await
    }

    /// Delete a node together with its incident edges and every label, tag
    /// and vector attached to either.
    pub async fn delete_by_guid(&self, tenant_id: TrellisId, graph_id: TrellisId, node_id: TrellisId) -> Result<()> {
        let ctx = &self.context;
        ctx.require_node(tenant_id, graph_id, node_id).await?;
        let graph = ctx.load_graph(tenant_id, graph_id).await?;

        let incident = RecordQuery::graph(tenant_id, graph_id).with_adjacency(Adjacency::Touching(node_id));
        let edges = ctx.storage.edges().select_page(&incident).await?;
        for edge in &edges {
            ctx.purge_subordinates(&graph, Attachment::Edge(edge.id)).await?;
            ctx.storage.edges().delete(tenant_id, edge.id).await?;
            ctx.caches.edges.invalidate(&(tenant_id, graph_id, edge.id));
        }

        ctx.purge_subordinates(&graph, Attachment::Node(node_id)).await?;
        ctx.storage.nodes().delete(tenant_id, node_id).await?;
        ctx.caches.nodes.invalidate(&(tenant_id, graph_id, node_id));

        debug!("Deleted node {} and {} incident edges", node_id, edges.len());
        Ok(())
    }

    pub async fn delete_many(&self, tenant_id: TrellisId, graph_id: TrellisId, node_ids: &[TrellisId]) -> Result<()> {
        for id in node_ids {
            match self.delete_by_guid(tenant_id, graph_id, *id).await {
                Err(e) if e.is_not_found() => continue,
                other => other?,
            }
        }
        self.context.caches.nodes.clear();
        self.context.caches.edges.clear();
        Ok(())
    }

    /// Delete every node and edge of a graph, with their subordinates.
    /// Graph-level subordinates remain.
    pub async fn delete_all_in_graph(&self, tenant_id: TrellisId, graph_id: TrellisId) -> Result<()> {
        let ctx = &self.context;
        let graph = ctx.load_graph(tenant_id, graph_id).await?;
        let scope = RecordQuery::graph(tenant_id, graph_id);

        let nodes = ctx.storage.nodes().select_page(&scope).await?;
        let edges = ctx.storage.edges().select_page(&scope).await?;
        let owners: Vec<TrellisId> = nodes.iter().map(|n| n.id).chain(edges.iter().map(|e| e.id)).collect();
        if !owners.is_empty() {
            let attached = scope.clone().with_parent(ParentRef::AnyOf(owners));
            ctx.storage.labels().delete_where(&attached).await?;
            ctx.storage.tags().delete_where(&attached).await?;
            ctx.storage.vectors().delete_where(&attached).await?;
        }
        ctx.storage.edges().delete_where(&scope).await?;
        ctx.storage.nodes().delete_where(&scope).await?;
        ctx.refresh_index(&graph).await?;

        ctx.caches.nodes.clear();
        ctx.caches.edges.clear();
        info!("Deleted {} nodes and {} edges from graph {}", nodes.len(), edges.len(), graph_id);
        Ok(())
    }

    pub async fn exists_by_guid(&self, tenant_id: TrellisId, graph_id: TrellisId, node_id: TrellisId) -> Result<bool> {
        match self.context.require_node(tenant_id, graph_id, node_id).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Nodes with an edge into `node_id`.
    pub async fn read_parents(
        &self,
        tenant_id: TrellisId,
        graph_id: TrellisId,
        node_id: TrellisId,
        options: ReadOptions,
    ) -> Result<Vec<Node>> {
        let ctx = &self.context;
        ctx.require_node(tenant_id, graph_id, node_id).await?;
        let nodes = ctx
            .traversal
            .parents(tenant_id, graph_id, node_id, &CancellationToken::new())
            .await?;
        ctx.decorate(nodes, options).await
    }

    /// Nodes reached by an edge out of `node_id`.
    pub async fn read_children(
        &self,
        tenant_id: TrellisId,
        graph_id: TrellisId,
        node_id: TrellisId,
        options: ReadOptions,
    ) -> Result<Vec<Node>> {
        let ctx = &self.context;
        ctx.require_node(tenant_id, graph_id, node_id).await?;
        let nodes = ctx
            .traversal
            .children(tenant_id, graph_id, node_id, &CancellationToken::new())
            .await?;
        ctx.decorate(nodes, options).await
    }

    /// Parents and children, each listed once.
    pub async fn read_neighbors(
        &self,
        tenant_id: TrellisId,
        graph_id: TrellisId,
        node_id: TrellisId,
        options: ReadOptions,
    ) -> Result<Vec<Node>> {
        let ctx = &self.context;
        ctx.require_node(tenant_id, graph_id, node_id).await?;
        let nodes = ctx
            .traversal
            .neighbors(tenant_id, graph_id, node_id, &CancellationToken::new())
            .await?;
        ctx.decorate(nodes, options).await
    }

    pub async fn read_most_connected(
        &self,
        query: EnumerationQuery,
        cancel: &CancellationToken,
    ) -> Result<EnumerationResult<Node>> {
        let ctx = &self.context;
        let (tenant_id, graph_id) = graph_scope(&query)?;
        ctx.require_graph(tenant_id, graph_id).await?;
        let options = query_options(&query);
        let mut page = ctx.traversal.most_connected(query, cancel).await?;
        page.objects = ctx.decorate(page.objects, options).await?;
        Ok(page)
    }

    pub async fn read_least_connected(
        &self,
        query: EnumerationQuery,
        cancel: &CancellationToken,
    ) -> Result<EnumerationResult<Node>> {
        let ctx = &self.context;
        let (tenant_id, graph_id) = graph_scope(&query)?;
        ctx.require_graph(tenant_id, graph_id).await?;
        let options = query_options(&query);
        let mut page = ctx.traversal.least_connected(query, cancel).await?;
        page.objects = ctx.decorate(page.objects, options).await?;
        Ok(page)
    }
}
