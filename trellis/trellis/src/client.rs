//! The client facade: owns the caches and engines and hands out one service
//! per entity type.

use crate::cache::{ClientCacheStats, ReferenceCaches};
use crate::services::{
    EdgeService, GraphService, LabelService, NodeService, TagService, TenantService, VectorService,
};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use trellis_core::prelude::*;
use trellis_graph::{Enumerator, TraversalEngine};
use trellis_storage::MemoryStorage;
use trellis_vector::{VectorIndexManager, VectorSearchEngine};

/// Entry point for embedding applications.
///
/// Every instance owns its own caches and index manager; two clients over
/// the same storage share data but not cache state.
///
/// # Example
///
/// ```no_run
/// use trellis::prelude::*;
///
/// # async fn example() -> Result<()> {
/// let client = TrellisClient::in_memory()?;
/// let tenant = client.tenants().create(Tenant::new("acme")).await?;
/// let graph = client.graphs().create(Graph::new(tenant.id, "org chart")).await?;
/// let ceo = client.nodes().create(Node::new(tenant.id, graph.id, "ceo")).await?;
/// let cto = client.nodes().create(Node::new(tenant.id, graph.id, "cto")).await?;
/// client.edges().create(Edge::new(tenant.id, graph.id, ceo.id, cto.id)).await?;
///
/// let children = client
///     .nodes()
///     .read_children(tenant.id, graph.id, ceo.id, ReadOptions::default())
///     .await?;
/// assert_eq!(children.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct TrellisClient {
    context: Arc<ClientContext>,
    tenants: TenantService,
    graphs: GraphService,
    nodes: NodeService,
    edges: EdgeService,
    labels: LabelService,
    tags: TagService,
    vectors: VectorService,
}

impl TrellisClient {
    pub fn new(storage: Arc<dyn Storage>, config: TrellisConfig) -> Result<Self> {
        config.validate()?;
        info!(
            "Initializing Trellis client (cache capacity {}, hydration batch {})",
            config.cache.capacity, config.traversal.hydration_batch
        );

        let indexes = Arc::new(VectorIndexManager::new(storage.clone(), config.vector.clone()));
        let enumerator = Enumerator::with_config(storage.clone(), config.enumeration.clone());
        let context = Arc::new(ClientContext {
            caches: ReferenceCaches::new(&config.cache),
            traversal: TraversalEngine::with_enumerator(
                storage.clone(),
                config.traversal.clone(),
                enumerator.clone(),
            ),
            enumerator,
            search: VectorSearchEngine::new(storage.clone(), indexes.clone()),
            indexes,
            storage,
            config,
        });

        Ok(Self {
            tenants: TenantService::new(context.clone()),
            graphs: GraphService::new(context.clone()),
            nodes: NodeService::new(context.clone()),
            edges: EdgeService::new(context.clone()),
            labels: LabelService::new(context.clone()),
            tags: TagService::new(context.clone()),
            vectors: VectorService::new(context.clone()),
            context,
        })
    }

    /// Client over a fresh non-persistent store with default configuration.
    pub fn in_memory() -> Result<Self> {
        Self::new(Arc::new(MemoryStorage::new()), TrellisConfig::default())
    }

    pub fn tenants(&self) -> &TenantService {
        &self.tenants
    }

    pub fn graphs(&self) -> &GraphService {
        &self.graphs
    }

    pub fn nodes(&self) -> &NodeService {
        &self.nodes
    }

    pub fn edges(&self) -> &EdgeService {
        &self.edges
    }

    pub fn labels(&self) -> &LabelService {
        &self.labels
    }

    pub fn tags(&self) -> &TagService {
        &self.tags
    }

    pub fn vectors(&self) -> &VectorService {
        &self.vectors
    }

    pub fn config(&self) -> &TrellisConfig {
        &self.context.config
    }

    /// Enumeration over a tenant's graphs, sized by the configured default
    /// page size.
    pub fn query(&self, tenant_id: TrellisId) -> EnumerationQuery {
        self.context.enumerator.query(tenant_id)
    }

    /// Enumeration over one graph's members, sized by the configured
    /// default page size.
    pub fn graph_query(&self, tenant_id: TrellisId, graph_id: TrellisId) -> EnumerationQuery {
        self.query(tenant_id).in_graph(graph_id)
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.context.storage
    }

    pub fn cache_stats(&self) -> ClientCacheStats {
        self.context.caches.stats()
    }

    /// Backups are handled outside the library.
    pub async fn enumerate_backups(&self) -> Result<Vec<PathBuf>> {
        Err(TrellisError::not_implemented("backup enumeration"))
    }
}

/// State shared by every service of one client.
pub(crate) struct ClientContext {
    pub(crate) storage: Arc<dyn Storage>,
    pub(crate) config: TrellisConfig,
    pub(crate) caches: ReferenceCaches,
    pub(crate) enumerator: Enumerator,
    pub(crate) traversal: TraversalEngine,
    pub(crate) indexes: Arc<VectorIndexManager>,
    pub(crate) search: VectorSearchEngine,
}

impl ClientContext {
    pub(crate) async fn require_tenant(&self, tenant_id: TrellisId) -> Result<()> {
        if self.caches.tenants.contains(&tenant_id) {
            return Ok(());
        }
        if self.storage.tenants().exists(tenant_id, tenant_id).await? {
            self.caches.tenants.insert(tenant_id);
            Ok(())
        } else {
            Err(TrellisError::not_found("tenant", tenant_id))
        }
    }

    pub(crate) async fn require_graph(&self, tenant_id: TrellisId, graph_id: TrellisId) -> Result<()> {
        let key = (tenant_id, graph_id);
        if self.caches.graphs.contains(&key) {
            return Ok(());
        }
        self.load_graph(tenant_id, graph_id).await.map(|_| ())
    }

    /// Graph record, bypassing the cache. Needed wherever the index
    /// configuration matters.
    pub(crate) async fn load_graph(&self, tenant_id: TrellisId, graph_id: TrellisId) -> Result<Graph> {
        let graph = self
            .storage
            .graphs()
            .select_by_key(tenant_id, graph_id)
            .await?
            .ok_or_else(|| TrellisError::not_found("graph", graph_id))?;
        self.caches.graphs.insert((tenant_id, graph_id));
        Ok(graph)
    }

    pub(crate) async fn require_node(
        &self,
        tenant_id: TrellisId,
        graph_id: TrellisId,
        node_id: TrellisId,
    ) -> Result<()> {
        let key = (tenant_id, graph_id, node_id);
        if self.caches.nodes.contains(&key) {
            return Ok(());
        }
        let found = self
            .storage
            .nodes()
            .select_by_key(tenant_id, node_id)
            .await?
            .is_some_and(|n| n.graph_id == graph_id);
        if !found {
            return Err(TrellisError::not_found("node", node_id));
        }
        self.caches.nodes.insert(key);
        Ok(())
    }

    pub(crate) async fn require_edge(
        &self,
        tenant_id: TrellisId,
        graph_id: TrellisId,
        edge_id: TrellisId,
    ) -> Result<()> {
        let key = (tenant_id, graph_id, edge_id);
        if self.caches.edges.contains(&key) {
            return Ok(());
        }
        let found = self
            .storage
            .edges()
            .select_by_key(tenant_id, edge_id)
            .await?
            .is_some_and(|e| e.graph_id == graph_id);
        if !found {
            return Err(TrellisError::not_found("edge", edge_id));
        }
        self.caches.edges.insert(key);
        Ok(())
    }

    /// The node or edge a subordinate is attached to must exist in its graph.
    pub(crate) async fn require_attachment(
        &self,
        tenant_id: TrellisId,
        graph_id: TrellisId,
        attachment: Attachment,
    ) -> Result<()> {
        self.require_graph(tenant_id, graph_id).await?;
        match attachment {
            Attachment::Graph => Ok(()),
            Attachment::Node(id) => self.require_node(tenant_id, graph_id, id).await,
            Attachment::Edge(id) => self.require_edge(tenant_id, graph_id, id).await,
        }
    }

    /// Insert split-off subordinates and mirror their vectors into the
    /// graph's index.
    pub(crate) async fn attach_subordinates(&self, graph: &Graph, records: SubordinateRecords) -> Result<()> {
        let SubordinateRecords { labels, tags, vectors } = records;
        if !labels.is_empty() {
            self.storage.labels().insert_many(labels).await?;
        }
        if !tags.is_empty() {
            self.storage.tags().insert_many(tags).await?;
        }
        if !vectors.is_empty() {
            let vectors = self.storage.vectors().insert_many(vectors).await?;
            for vector in &vectors {
                self.indexes.on_vector_upsert(graph, vector).await?;
            }
        }
        Ok(())
    }

    /// Delete the labels, tags and vectors attached to one owner.
    pub(crate) async fn purge_subordinates(&self, graph: &Graph, attachment: Attachment) -> Result<()> {
        let scope = RecordQuery::graph(graph.tenant_id, graph.id).with_parent(attachment.into());
        self.storage.labels().delete_where(&scope).await?;
        self.storage.tags().delete_where(&scope).await?;
        let removed = self.storage.vectors().delete_where(&scope).await?;
        if removed > 0 {
            if let Some(owner) = attachment.owner() {
                self.indexes.on_owner_delete(graph, owner).await?;
            }
        }
        Ok(())
    }

    /// Rebuild the graph's index after a bulk change, if indexing is on.
    pub(crate) async fn refresh_index(&self, graph: &Graph) -> Result<()> {
        if graph.active_index().is_some() {
            self.indexes
                .rebuild(graph, &tokio_util::sync::CancellationToken::new())
                .await?;
        }
        Ok(())
    }

    /// Apply read options: drop payloads unless requested and populate
    /// subordinates when asked to.
    pub(crate) async fn decorate<T: Decorated>(&self, mut records: Vec<T>, options: ReadOptions) -> Result<Vec<T>> {
        if !options.include_data {
            records.iter_mut().for_each(T::strip_data);
        }
        if !options.include_subordinates || records.is_empty() {
            return Ok(records);
        }

        let mut grouped: HashMap<TrellisId, Subordinates> = HashMap::new();
        if T::KIND == EntityKind::Graph {
            for record in &records {
                let graph_id = record.id();
                let scope = RecordQuery::graph(record.tenant_id(), graph_id).with_parent(ParentRef::Graph);
                self.collect_subordinates(&scope, |_| Some(graph_id), &mut grouped)
                    .await?;
            }
        } else {
            let tenant_id = records[0].tenant_id();
            let owners = records.iter().map(T::id).collect();
            let scope = RecordQuery::tenant(tenant_id).with_parent(ParentRef::AnyOf(owners));
            self.collect_subordinates(&scope, |a| a.owner(), &mut grouped)
                .await?;
        }

        for record in records.iter_mut() {
            record.set_subordinates(grouped.remove(&record.id()).unwrap_or_default());
        }
        debug!("Populated subordinates for {} {} records", records.len(), T::KIND);
        Ok(records)
    }

    pub(crate) async fn decorate_one<T: Decorated>(&self, record: T, options: ReadOptions) -> Result<T> {
        let mut decorated = self.decorate(vec![record], options).await?;
        decorated
            .pop()
            .ok_or_else(|| TrellisError::internal("decorated record went missing"))
    }

    async fn collect_subordinates(
        &self,
        scope: &RecordQuery,
        owner_of: impl Fn(Attachment) -> Option<TrellisId>,
        grouped: &mut HashMap<TrellisId, Subordinates>,
    ) -> Result<()> {
        for label in self.storage.labels().select_page(scope).await? {
            if let Some(owner) = owner_of(label.attachment()) {
                grouped.entry(owner).or_default().labels.push(label.label);
            }
        }
        for tag in self.storage.tags().select_page(scope).await? {
            if let Some(owner) = owner_of(tag.attachment()) {
                grouped.entry(owner).or_default().tags.insert(tag.key, tag.value);
            }
        }
        for vector in self.storage.vectors().select_page(scope).await? {
            if let Some(owner) = owner_of(vector.attachment()) {
                grouped.entry(owner).or_default().vectors.push(vector);
            }
        }
        Ok(())
    }
}

/// Inline subordinate collections carried on graphs, nodes and edges.
#[derive(Debug, Default)]
pub(crate) struct Subordinates {
    pub(crate) labels: Vec<String>,
    pub(crate) tags: BTreeMap<String, String>,
    pub(crate) vectors: Vec<VectorRecord>,
}

/// Subordinates turned into storable records.
#[derive(Debug, Default)]
pub(crate) struct SubordinateRecords {
    pub(crate) labels: Vec<Label>,
    pub(crate) tags: Vec<Tag>,
    pub(crate) vectors: Vec<VectorRecord>,
}

impl Subordinates {
    /// Validate and convert into records attached to `attachment`.
    pub(crate) fn into_records(
        self,
        tenant_id: TrellisId,
        graph_id: TrellisId,
        attachment: Attachment,
    ) -> Result<SubordinateRecords> {
        let labels = self
            .labels
            .into_iter()
            .map(|label| {
                if label.trim().is_empty() {
                    return Err(TrellisError::invalid_argument("label must not be empty"));
                }
                Ok(Label::new(tenant_id, graph_id, attachment, label))
            })
            .collect::<Result<Vec<_>>>()?;

        let tags = self
            .tags
            .into_iter()
            .map(|(key, value)| {
                if key.trim().is_empty() {
                    return Err(TrellisError::invalid_argument("tag key must not be empty"));
                }
                Ok(Tag::new(tenant_id, graph_id, attachment, key, value))
            })
            .collect::<Result<Vec<_>>>()?;

        let vectors = self
            .vectors
            .into_iter()
            .map(|mut vector| {
                attach_vector(&mut vector, tenant_id, graph_id, attachment);
                vector.validate()?;
                Ok(vector)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SubordinateRecords { labels, tags, vectors })
    }
}

/// Point a vector at its owner, overriding whatever the caller set.
pub(crate) fn attach_vector(
    vector: &mut VectorRecord,
    tenant_id: TrellisId,
    graph_id: TrellisId,
    attachment: Attachment,
) {
    vector.tenant_id = tenant_id;
    vector.graph_id = graph_id;
    (vector.node_id, vector.edge_id) = match attachment {
        Attachment::Graph => (None, None),
        Attachment::Node(id) => (Some(id), None),
        Attachment::Edge(id) => (None, Some(id)),
    };
}

/// Graphs, nodes and edges: records that carry inline subordinates.
pub(crate) trait Decorated: Record {
    fn owner_attachment(&self) -> Attachment;

    fn take_subordinates(&mut self) -> Subordinates;

    fn set_subordinates(&mut self, subordinates: Subordinates);
}

macro_rules! decorated {
    ($ty:ty, |$record:ident| $attachment:expr) => {
        impl Decorated for $ty {
            fn owner_attachment(&self) -> Attachment {
                let $record = self;
                $attachment
            }

            fn take_subordinates(&mut self) -> Subordinates {
                Subordinates {
                    labels: std::mem::take(&mut self.labels),
                    tags: std::mem::take(&mut self.tags),
                    vectors: std::mem::take(&mut self.vectors),
                }
            }

            fn set_subordinates(&mut self, subordinates: Subordinates) {
                self.labels = subordinates.labels;
                self.tags = subordinates.tags;
                self.vectors = subordinates.vectors;
            }
        }
    };
}

decorated!(Graph, |_graph| Attachment::Graph);
decorated!(Node, |node| Attachment::Node(node.id));
decorated!(Edge, |edge| Attachment::Edge(edge.id));
