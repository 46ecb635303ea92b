use crate::matcher;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info};
use trellis_core::prelude::*;

/// Graph plus attachment point of a label, tag or vector.
pub(crate) type OwnerKey = (TrellisId, Attachment);

type OwnerIndex = HashMap<OwnerKey, HashSet<TrellisId>>;

/// All tables plus the secondary indexes kept alongside them.
#[derive(Default)]
pub(crate) struct MemoryState {
    tenants: HashMap<TrellisId, Tenant>,
    graphs: HashMap<TrellisId, Graph>,
    nodes: HashMap<TrellisId, Node>,
    edges: HashMap<TrellisId, Edge>,
    labels: HashMap<TrellisId, Label>,
    tags: HashMap<TrellisId, Tag>,
    vectors: HashMap<TrellisId, VectorRecord>,

    /// node id -> ids of edges leaving it
    outgoing: HashMap<TrellisId, HashSet<TrellisId>>,
    /// node id -> ids of edges arriving at it
    incoming: HashMap<TrellisId, HashSet<TrellisId>>,

    label_owners: OwnerIndex,
    tag_owners: OwnerIndex,
    vector_owners: OwnerIndex,
}

impl MemoryState {
    pub(crate) fn labels_of(&self, owner: &OwnerKey) -> Vec<&Label> {
        lookup(&self.label_owners, &self.labels, owner)
    }

    pub(crate) fn tags_of(&self, owner: &OwnerKey) -> Vec<&Tag> {
        lookup(&self.tag_owners, &self.tags, owner)
    }

    fn degrees(&self, node: TrellisId) -> (u64, u64) {
        let count = |m: &HashMap<TrellisId, HashSet<TrellisId>>| {
            m.get(&node).map_or(0, |s| s.len() as u64)
        };
        (count(&self.incoming), count(&self.outgoing))
    }

    fn record_count(&self) -> usize {
        self.tenants.len()
            + self.graphs.len()
            + self.nodes.len()
            + self.edges.len()
            + self.labels.len()
            + self.tags.len()
            + self.vectors.len()
    }
}

fn lookup<'a, T>(
    index: &OwnerIndex,
    table: &'a HashMap<TrellisId, T>,
    owner: &OwnerKey,
) -> Vec<&'a T> {
    index
        .get(owner)
        .into_iter()
        .flatten()
        .filter_map(|id| table.get(id))
        .collect()
}

fn index_add<K: std::hash::Hash + Eq>(index: &mut HashMap<K, HashSet<TrellisId>>, key: K, id: TrellisId) {
    index.entry(key).or_default().insert(id);
}

fn index_remove<K: std::hash::Hash + Eq>(index: &mut HashMap<K, HashSet<TrellisId>>, key: &K, id: TrellisId) {
    if let Some(set) = index.get_mut(key) {
        set.remove(&id);
        if set.is_empty() {
            index.remove(key);
        }
    }
}

/// Candidate ids for subordinate lookups scoped to a graph and parent.
fn owned_candidates(index: &OwnerIndex, query: &RecordQuery) -> Option<HashSet<TrellisId>> {
    let graph = query.graph_id?;
    let points: Vec<Attachment> = match query.parent.as_ref()? {
        ParentRef::Graph => vec![Attachment::Graph],
        ParentRef::Node(id) => vec![Attachment::Node(*id)],
        ParentRef::Edge(id) => vec![Attachment::Edge(*id)],
        ParentRef::AnyOf(ids) => ids
            .iter()
            .flat_map(|id| [Attachment::Node(*id), Attachment::Edge(*id)])
            .collect(),
    };
    Some(
        points
            .into_iter()
            .filter_map(|point| index.get(&(graph, point)))
            .flatten()
            .copied()
            .collect(),
    )
}

/// Per-entity hooks the generic table uses to keep indexes and derived
/// fields consistent.
pub(crate) trait MemoryRecord: Record {
    fn table(state: &MemoryState) -> &HashMap<TrellisId, Self>;

    fn table_mut(state: &mut MemoryState) -> &mut HashMap<TrellisId, Self>;

    fn on_insert(&self, _state: &mut MemoryState) {}

    fn on_remove(&self, _state: &mut MemoryState) {}

    /// Fill in fields derived from other tables.
    fn decorate(&mut self, _state: &MemoryState) {}

    /// Narrow the scan using secondary indexes.
    fn candidates(_state: &MemoryState, _query: &RecordQuery) -> Option<HashSet<TrellisId>> {
        None
    }

    /// Attachment point of a label, tag or vector.
    fn attached_to(&self) -> Option<Attachment> {
        None
    }

    fn endpoints(&self) -> Option<(TrellisId, TrellisId)> {
        None
    }

    /// Key under which this record's labels and tags are indexed.
    fn owner_key(&self) -> Option<OwnerKey> {
        None
    }

    fn payload(&self) -> Option<&Value> {
        None
    }
}

impl MemoryRecord for Tenant {
    fn table(state: &MemoryState) -> &HashMap<TrellisId, Self> {
        &state.tenants
    }

    fn table_mut(state: &mut MemoryState) -> &mut HashMap<TrellisId, Self> {
        &mut state.tenants
    }
}

impl MemoryRecord for Graph {
    fn table(state: &MemoryState) -> &HashMap<TrellisId, Self> {
        &state.graphs
    }

    fn table_mut(state: &mut MemoryState) -> &mut HashMap<TrellisId, Self> {
        &mut state.graphs
    }

    fn owner_key(&self) -> Option<OwnerKey> {
        Some((self.id, Attachment::Graph))
    }

    fn payload(&self) -> Option<&Value> {
        self.data.as_ref()
    }
}

impl MemoryRecord for Node {
    fn table(state: &MemoryState) -> &HashMap<TrellisId, Self> {
        &state.nodes
    }

    fn table_mut(state: &mut MemoryState) -> &mut HashMap<TrellisId, Self> {
        &mut state.nodes
    }

    fn decorate(&mut self, state: &MemoryState) {
        let (incoming, outgoing) = state.degrees(self.id);
        self.in_degree = incoming;
        self.out_degree = outgoing;
        self.total_degree = incoming + outgoing;
    }

    fn owner_key(&self) -> Option<OwnerKey> {
        Some((self.graph_id, Attachment::Node(self.id)))
    }

    fn payload(&self) -> Option<&Value> {
        self.data.as_ref()
    }
}

impl MemoryRecord for Edge {
    fn table(state: &MemoryState) -> &HashMap<TrellisId, Self> {
        &state.edges
    }

    fn table_mut(state: &mut MemoryState) -> &mut HashMap<TrellisId, Self> {
        &mut state.edges
    }

    fn on_insert(&self, state: &mut MemoryState) {
        index_add(&mut state.outgoing, self.from, self.id);
        index_add(&mut state.incoming, self.to, self.id);
    }

    fn on_remove(&self, state: &mut MemoryState) {
        index_remove(&mut state.outgoing, &self.from, self.id);
        index_remove(&mut state.incoming, &self.to, self.id);
    }

    fn candidates(state: &MemoryState, query: &RecordQuery) -> Option<HashSet<TrellisId>> {
        let edges_of = |m: &HashMap<TrellisId, HashSet<TrellisId>>, node: TrellisId| {
            m.get(&node).cloned().unwrap_or_default()
        };
        match query.adjacency? {
            Adjacency::From(node) | Adjacency::Between { from: node, .. } => {
                Some(edges_of(&state.outgoing, node))
            }
            Adjacency::To(node) => Some(edges_of(&state.incoming, node)),
            Adjacency::Touching(node) => {
                let mut all = edges_of(&state.outgoing, node);
                all.extend(edges_of(&state.incoming, node));
                Some(all)
            }
        }
    }

    fn endpoints(&self) -> Option<(TrellisId, TrellisId)> {
        Some((self.from, self.to))
    }

    fn owner_key(&self) -> Option<OwnerKey> {
        Some((self.graph_id, Attachment::Edge(self.id)))
    }

    fn payload(&self) -> Option<&Value> {
        self.data.as_ref()
    }
}

macro_rules! subordinate {
    ($ty:ty, $table:ident, $index:ident) => {
        impl MemoryRecord for $ty {
            fn table(state: &MemoryState) -> &HashMap<TrellisId, Self> {
                &state.$table
            }

            fn table_mut(state: &mut MemoryState) -> &mut HashMap<TrellisId, Self> {
                &mut state.$table
            }

            fn on_insert(&self, state: &mut MemoryState) {
                index_add(&mut state.$index, (self.graph_id, self.attachment()), self.id);
            }

            fn on_remove(&self, state: &mut MemoryState) {
                index_remove(&mut state.$index, &(self.graph_id, self.attachment()), self.id);
            }

            fn candidates(state: &MemoryState, query: &RecordQuery) -> Option<HashSet<TrellisId>> {
                owned_candidates(&state.$index, query)
            }

            fn attached_to(&self) -> Option<Attachment> {
                Some(self.attachment())
            }
        }
    };
}

subordinate!(Label, labels, label_owners);
subordinate!(Tag, tags, tag_owners);
subordinate!(VectorRecord, vectors, vector_owners);

/// Repository over one table of the shared state.
pub(crate) struct MemoryTable<T> {
    state: Arc<RwLock<MemoryState>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: MemoryRecord> MemoryTable<T> {
    fn new(state: Arc<RwLock<MemoryState>>) -> Self {
        Self {
            state,
            _marker: PhantomData,
        }
    }

    /// Matching records with their sort markers, unsorted.
    fn collect(state: &MemoryState, query: &RecordQuery) -> Result<Vec<(SortMarker, T)>> {
        let table = T::table(state);
        let scan: Vec<&T> = match &query.ids {
            Some(ids) => {
                let unique: HashSet<&TrellisId> = ids.iter().collect();
                unique.into_iter().filter_map(|id| table.get(id)).collect()
            }
            None => match T::candidates(state, query) {
                Some(ids) => ids.iter().filter_map(|id| table.get(id)).collect(),
                None => table.values().collect(),
            },
        };

        let mut rows = Vec::new();
        for record in scan {
            if !matcher::matches(record, state, query) {
                continue;
            }
            let mut record = record.clone();
            record.decorate(state);
            let marker = record.sort_marker(query.order)?;
            if let Some(after) = &query.after {
                if !after.precedes(query.order, &marker) {
                    continue;
                }
            }
            rows.push((marker, record));
        }
        Ok(rows)
    }

    fn sorted(state: &MemoryState, query: &RecordQuery) -> Result<Vec<T>> {
        let mut rows = Self::collect(state, query)?;
        rows.sort_by(|a, b| query.order.compare(&a.0, &b.0));
        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        Ok(rows
            .into_iter()
            .skip(skip)
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|(_, record)| record)
            .collect())
    }

    fn get(state: &MemoryState, tenant_id: TrellisId, id: TrellisId) -> Option<T> {
        let mut record = T::table(state)
            .get(&id)
            .filter(|r| r.tenant_id() == tenant_id)?
            .clone();
        record.decorate(state);
        Some(record)
    }

    fn remove(state: &mut MemoryState, id: TrellisId) -> bool {
        match T::table_mut(state).remove(&id) {
            Some(old) => {
                old.on_remove(state);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl<T: MemoryRecord> Repository<T> for MemoryTable<T> {
    async fn insert(&self, record: T) -> Result<T> {
        let mut state = self.state.write();
        let id = record.id();
        if T::table(&state).contains_key(&id) {
            return Err(TrellisError::conflict(format!("{} {} already exists", T::KIND, id)));
        }
        record.on_insert(&mut state);
        T::table_mut(&mut state).insert(id, record.clone());
        debug!("Inserted {} {}", T::KIND, id);

        let mut stored = record;
        stored.decorate(&state);
        Ok(stored)
    }

    async fn select_by_key(&self, tenant_id: TrellisId, id: TrellisId) -> Result<Option<T>> {
        Ok(Self::get(&self.state.read(), tenant_id, id))
    }

    async fn select_by_keys(&self, tenant_id: TrellisId, ids: &[TrellisId]) -> Result<Vec<T>> {
        let state = self.state.read();
        Ok(ids
            .iter()
            .filter_map(|id| Self::get(&state, tenant_id, *id))
            .collect())
    }

    async fn select_page(&self, query: &RecordQuery) -> Result<Vec<T>> {
        Self::sorted(&self.state.read(), query)
    }

    async fn count(&self, query: &RecordQuery) -> Result<u64> {
        Ok(Self::collect(&self.state.read(), query)?.len() as u64)
    }

    async fn update(&self, record: T) -> Result<T> {
        let mut state = self.state.write();
        let id = record.id();
        let exists = T::table(&state)
            .get(&id)
            .is_some_and(|r| r.tenant_id() == record.tenant_id());
        if !exists {
            return Err(TrellisError::not_found(T::KIND.as_str(), id));
        }
        Self::remove(&mut state, id);
        record.on_insert(&mut state);
        T::table_mut(&mut state).insert(id, record.clone());
        debug!("Updated {} {}", T::KIND, id);

        let mut stored = record;
        stored.decorate(&state);
        Ok(stored)
    }

    async fn delete(&self, tenant_id: TrellisId, id: TrellisId) -> Result<bool> {
        let mut state = self.state.write();
        let owned = T::table(&state)
            .get(&id)
            .is_some_and(|r| r.tenant_id() == tenant_id);
        Ok(owned && Self::remove(&mut state, id))
    }

    async fn delete_where(&self, query: &RecordQuery) -> Result<u64> {
        let mut state = self.state.write();
        let doomed: Vec<TrellisId> = Self::sorted(&state, query)?
            .iter()
            .map(|record| record.id())
            .collect();
        let mut removed = 0;
        for id in doomed {
            if Self::remove(&mut state, id) {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!("Deleted {} {} records", removed, T::KIND);
        }
        Ok(removed)
    }
}

/// Non-persistent storage backend holding every table in one locked state.
pub struct MemoryStorage {
    state: Arc<RwLock<MemoryState>>,
    tenants: MemoryTable<Tenant>,
    graphs: MemoryTable<Graph>,
    nodes: MemoryTable<Node>,
    edges: MemoryTable<Edge>,
    labels: MemoryTable<Label>,
    tags: MemoryTable<Tag>,
    vectors: MemoryTable<VectorRecord>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        info!("Creating in-memory storage (non-persistent)");
        let state = Arc::new(RwLock::new(MemoryState::default()));
        Self {
            tenants: MemoryTable::new(state.clone()),
            graphs: MemoryTable::new(state.clone()),
            nodes: MemoryTable::new(state.clone()),
            edges: MemoryTable::new(state.clone()),
            labels: MemoryTable::new(state.clone()),
            tags: MemoryTable::new(state.clone()),
            vectors: MemoryTable::new(state.clone()),
            state,
        }
    }

    /// Total number of records across all tables.
    pub fn len(&self) -> usize {
        self.state.read().record_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        *self.state.write() = MemoryState::default();
    }
}

impl Storage for MemoryStorage {
    fn tenants(&self) -> &dyn Repository<Tenant> {
        &self.tenants
    }

    fn graphs(&self) -> &dyn Repository<Graph> {
        &self.graphs
    }

    fn nodes(&self) -> &dyn Repository<Node> {
        &self.nodes
    }

    fn edges(&self) -> &dyn Repository<Edge> {
        &self.edges
    }

    fn labels(&self) -> &dyn Repository<Label> {
        &self.labels
    }

    fn tags(&self) -> &dyn Repository<Tag> {
        &self.tags
    }

    fn vectors(&self) -> &dyn Repository<VectorRecord> {
        &self.vectors
    }
}
