use crate::client::{ClientContext, Decorated};
use crate::services::{query_options, tenant_scope};
use async_stream::try_stream;
use chrono::Utc;
use futures::TryStreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use trellis_core::prelude::*;
use trellis_graph::ResultStream;

/// Graph management, traversal over a graph, and its vector index lifecycle.
#[derive(Clone)]
pub struct GraphService {
    context: Arc<ClientContext>,
}

impl GraphService {
    pub(crate) fn new(context: Arc<ClientContext>) -> Self {
        Self { context }
    }

    /// Create a graph. Inline labels, tags and vectors are stored as
    /// graph-level subordinates; an enabled index configuration is
    /// validated and built.
    pub async fn create(&self, mut graph: Graph) -> Result<Graph> {
        let ctx = &self.context;
        if graph.name.trim().is_empty() {
            return Err(TrellisError::invalid_argument("graph name must not be empty"));
        }
        ctx.require_tenant(graph.tenant_id).await?;

        if let Some(config) = graph.vector_index.take() {
            let config = ctx.indexes.resolve_config(graph.id, config);
            if config.is_enabled() {
                config.validate()?;
            }
            graph.vector_index = Some(config);
        }
        let subordinates = graph
            .take_subordinates()
            .into_records(graph.tenant_id, graph.id, graph.owner_attachment())?;

        let graph = ctx.storage.graphs().insert(graph).await?;
        ctx.caches.graphs.insert((graph.tenant_id, graph.id));
        if let Some(config) = graph.active_index() {
            ctx.indexes
                .enable(&graph, config, &CancellationToken::new())
                .await?;
        }
        ctx.attach_subordinates(&graph, subordinates).await?;

        info!("Created graph: {} ({})", graph.name, graph.id);
        Ok(graph)
    }

    pub async fn create_many(&self, graphs: Vec<Graph>) -> Result<Vec<Graph>> {
        let mut created = Vec::with_capacity(graphs.len());
        for graph in graphs {
            created.push(self.create(graph).await?);
        }
        Ok(created)
    }

    pub async fn read_by_guid(
        &self,
        tenant_id: TrellisId,
        graph_id: TrellisId,
        options: ReadOptions,
    ) -> Result<Option<Graph>> {
        let Some(graph) = self.context.storage.graphs().select_by_key(tenant_id, graph_id).await? else {
            return Ok(None);
        };
        self.context.decorate_one(graph, options).await.map(Some)
    }

    pub async fn read_by_guids(
        &self,
        tenant_id: TrellisId,
        graph_ids: &[TrellisId],
        options: ReadOptions,
    ) -> Result<Vec<Graph>> {
        let graphs = self
            .context
            .storage
            .graphs()
            .select_by_keys(tenant_id, graph_ids)
            .await?;
        self.context.decorate(graphs, options).await
    }

    /// Every graph of the query's tenant matching its filter, fetched a page
    /// at a time.
    pub fn read_many(&self, query: EnumerationQuery, cancel: CancellationToken) -> ResultStream<Graph> {
        let context = self.context.clone();
        Box::pin(try_stream! {
            let tenant_id = tenant_scope(&query)?;
            context.require_tenant(tenant_id).await?;
            let options = query_options(&query);
            let mut graphs = context.enumerator.stream::<Graph>(query, cancel);
            while let Some(graph) = graphs.try_next().await? {
                yield context.decorate_one(graph, options).await?;
            }
        })
    }

    pub async fn read_first(&self, query: EnumerationQuery, cancel: &CancellationToken) -> Result<Option<Graph>> {
        let page = self.enumerate(query.with_max_results(1), cancel).await?;
        Ok(page.objects.into_iter().next())
    }

    pub async fn enumerate(
        &self,
        query: EnumerationQuery,
        cancel: &CancellationToken,
    ) -> Result<EnumerationResult<Graph>> {
        let ctx = &self.context;
        ctx.require_tenant(tenant_scope(&query)?).await?;
        // Graphs are their own graph scope.
        let query = EnumerationQuery { graph_id: None, ..query };
        let mut page = ctx.enumerator.enumerate::<Graph>(&query, cancel).await?;
        page.objects = ctx.decorate(page.objects, query_options(&query)).await?;
        Ok(page)
    }

    /// Update name and payload. Subordinates and the index configuration
    /// have their own operations and are left untouched.
    pub async fn update(&self, mut graph: Graph) -> Result<Graph> {
        let ctx = &self.context;
        if graph.name.trim().is_empty() {
            return Err(TrellisError::invalid_argument("graph name must not be empty"));
        }
        let existing = ctx.load_graph(graph.tenant_id, graph.id).await?;

        graph.take_subordinates();
        graph.vector_index = existing.vector_index;
        graph.created_utc = existing.created_utc;
        graph.last_update_utc = Utc::now();
        ctx.caches.graphs.invalidate(&(graph.tenant_id, graph.id));
        ctx.storage.graphs().update(graph).await
    }

    /// Delete a graph. Without `force` this fails with `Conflict` while
    /// nodes or edges remain; with `force` they are deleted along with all
    /// subordinates and the vector index.
    pub async fn delete_by_guid(&self, tenant_id: TrellisId, graph_id: TrellisId, force: bool) -> Result<()> {
        let ctx = &self.context;
        let graph = ctx.load_graph(tenant_id, graph_id).await?;

        if !force {
            let scope = RecordQuery::graph(tenant_id, graph_id);
            let nodes = ctx.storage.nodes().count(&scope).await?;
            let edges = ctx.storage.edges().count(&scope).await?;
            if nodes + edges > 0 {
                return Err(TrellisError::conflict(format!(
                    "graph {} still has {} nodes and {} edges",
                    graph_id, nodes, edges
                )));
            }
        }

        delete_graph(ctx, &graph).await?;
        ctx.caches.graphs.invalidate(&(tenant_id, graph_id));
        ctx.caches.nodes.clear();
        ctx.caches.edges.clear();
        Ok(())
    }

    pub async fn delete_many(&self, tenant_id: TrellisId, graph_ids: &[TrellisId], force: bool) -> Result<()> {
        for id in graph_ids {
            match self.delete_by_guid(tenant_id, *id, force).await {
                Err(e) if e.is_not_found() => continue,
                other => other?,
            }
        }
        self.context.caches.graphs.clear();
        Ok(())
    }

    /// Delete every graph of a tenant, with the same `force` semantics as
    /// [`Self::delete_by_guid`].
    pub async fn delete_all_in_tenant(&self, tenant_id: TrellisId, force: bool) -> Result<()> {
        let ctx = &self.context;
        ctx.require_tenant(tenant_id).await?;
        let ids: Vec<TrellisId> = ctx
            .storage
            .graphs()
            .select_page(&RecordQuery::tenant(tenant_id))
            .await?
            .into_iter()
            .map(|g| g.id)
            .collect();
        self.delete_many(tenant_id, &ids, force).await
    }

    pub async fn exists_by_guid(&self, tenant_id: TrellisId, graph_id: TrellisId) -> Result<bool> {
        match self.context.require_graph(tenant_id, graph_id).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Bounded breadth-first extraction around `request.start`.
    pub async fn get_subgraph(&self, request: &SubgraphRequest, cancel: &CancellationToken) -> Result<SubgraphResult> {
        let ctx = &self.context;
        ctx.require_tenant(request.tenant_id).await?;
        ctx.require_graph(request.tenant_id, request.graph_id).await?;

        let options = ReadOptions {
            include_data: request.include_data,
            include_subordinates: request.include_subordinates,
        };
        let result = ctx.traversal.subgraph(request, cancel).await?;
        Ok(SubgraphResult {
            graph: ctx.decorate_one(result.graph, options).await?,
            nodes: ctx.decorate(result.nodes, options).await?,
            edges: ctx.decorate(result.edges, options).await?,
        })
    }

    pub async fn get_subgraph_statistics(
        &self,
        request: &SubgraphRequest,
        cancel: &CancellationToken,
    ) -> Result<GraphStatistics> {
        let ctx = &self.context;
        ctx.require_tenant(request.tenant_id).await?;
        ctx.require_graph(request.tenant_id, request.graph_id).await?;
        ctx.traversal.statistics(request, cancel).await
    }

    /// Every simple route between two nodes, cheapest first.
    pub async fn read_routes(&self, request: RouteRequest, cancel: CancellationToken) -> Result<Vec<RouteDetail>> {
        let ctx = &self.context;
        ctx.require_tenant(request.tenant_id).await?;
        ctx.require_graph(request.tenant_id, request.graph_id).await?;
        let options = request.options;
        let mut routes = ctx.traversal.routes_by_cost(request, cancel).await?;
        for route in routes.iter_mut() {
            route.edges = ctx.decorate(std::mem::take(&mut route.edges), options).await?;
        }
        Ok(routes)
    }

    /// Routes in discovery order, produced lazily.
    pub fn stream_routes(&self, request: RouteRequest, cancel: CancellationToken) -> ResultStream<RouteDetail> {
        let context = self.context.clone();
        Box::pin(try_stream! {
            context.require_tenant(request.tenant_id).await?;
            context.require_graph(request.tenant_id, request.graph_id).await?;
            let options = request.options;
            let mut routes = context.traversal.routes(request, cancel);
            while let Some(mut route) = routes.try_next().await? {
                route.edges = context.decorate(std::mem::take(&mut route.edges), options).await?;
                yield route;
            }
        })
    }

    /// Validate `config`, persist it on the graph and build the index from
    /// the graph's existing vectors.
    pub async fn enable_vector_index(
        &self,
        tenant_id: TrellisId,
        graph_id: TrellisId,
        config: VectorIndexConfig,
        cancel: &CancellationToken,
    ) -> Result<IndexStatistics> {
        let ctx = &self.context;
        let mut graph = ctx.load_graph(tenant_id, graph_id).await?;
        let config = ctx.indexes.resolve_config(graph_id, config);
        config.validate()?;

        if let Some(previous) = graph.active_index() {
            if previous.file != config.file {
                ctx.indexes.disable(&graph, true).await?;
            }
        }
        let previous = graph.vector_index.replace(config.clone());
        graph.last_update_utc = Utc::now();
        let graph = ctx.storage.graphs().update(graph).await?;

        let stats = match ctx.indexes.enable(&graph, &config, cancel).await {
            Ok(stats) => stats,
            Err(e) => {
                let mut restored = graph;
                restored.vector_index = previous;
                restored.last_update_utc = Utc::now();
                ctx.storage.graphs().update(restored).await?;
                return Err(e);
            }
        };

        info!("Enabled vector index on graph {}: {} vectors", graph_id, stats.vector_count);
        Ok(stats)
    }

    /// Turn indexing off. Stored vectors are untouched; the artifact is
    /// removed only when `delete_file` is set.
    pub async fn disable_vector_index(&self, tenant_id: TrellisId, graph_id: TrellisId, delete_file: bool) -> Result<()> {
        let ctx = &self.context;
        let mut graph = ctx.load_graph(tenant_id, graph_id).await?;
        ctx.indexes.disable(&graph, delete_file).await?;
        graph.vector_index = None;
        graph.last_update_utc = Utc::now();
        ctx.storage.graphs().update(graph).await?;
        Ok(())
    }

    pub async fn rebuild_vector_index(
        &self,
        tenant_id: TrellisId,
        graph_id: TrellisId,
        cancel: &CancellationToken,
    ) -> Result<IndexStatistics> {
        let graph = self.context.load_graph(tenant_id, graph_id).await?;
        self.context.indexes.rebuild(&graph, cancel).await
    }

    pub async fn vector_index_statistics(&self, tenant_id: TrellisId, graph_id: TrellisId) -> Result<IndexStatistics> {
        let graph = self.context.load_graph(tenant_id, graph_id).await?;
        self.context.indexes.statistics(&graph).await
    }
}

/// Remove a graph and everything it owns. Caches are the caller's concern.
pub(crate) async fn delete_graph(ctx: &ClientContext, graph: &Graph) -> Result<()> {
    let scope = RecordQuery::graph(graph.tenant_id, graph.id);
    let storage = &ctx.storage;
    let labels = storage.labels().delete_where(&scope).await?;
    let tags = storage.tags().delete_where(&scope).await?;
    let vectors = storage.vectors().delete_where(&scope).await?;
    let edges = storage.edges().delete_where(&scope).await?;
    let nodes = storage.nodes().delete_where(&scope).await?;
    ctx.indexes.forget(graph).await?;
    storage.graphs().delete(graph.tenant_id, graph.id).await?;

    debug!(
        graph_id = %graph.id,
        nodes,
        edges,
        labels,
        tags,
        vectors,
        "Deleted graph contents"
    );
    info!("Deleted graph {}", graph.id);
    Ok(())
}
