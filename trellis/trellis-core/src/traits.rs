//! Core traits defining the storage contract the engines are written against.

use crate::error::{Result, TrellisError};
use crate::id::TrellisId;
use crate::types::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A persisted entity addressable by `(tenant, id)`.
pub trait Record: Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> TrellisId;

    fn tenant_id(&self) -> TrellisId;

    /// Owning graph; `None` for tenants. Graphs return their own id.
    fn graph_id(&self) -> Option<TrellisId>;

    fn created_utc(&self) -> DateTime<Utc>;

    /// Text used by name ordering and name filters.
    fn sort_name(&self) -> Option<&str>;

    /// Edge traversal cost.
    fn cost(&self) -> Option<i64> {
        None
    }

    /// Node total degree.
    fn degree(&self) -> Option<u64> {
        None
    }

    /// Drop the opaque payload, if the record carries one.
    fn strip_data(&mut self) {}

    /// Select this record type's repository from a storage bundle.
    fn repository(storage: &dyn Storage) -> &dyn Repository<Self>;

    fn sort_key(&self, order: EnumerationOrder) -> Result<SortKey> {
        use EnumerationOrder::*;
        match order {
            CreatedAscending | CreatedDescending => Ok(SortKey::Time(self.created_utc())),
            NameAscending | NameDescending => Ok(SortKey::Text(
                self.sort_name().unwrap_or_default().to_lowercase(),
            )),
            CostAscending | CostDescending => self.cost().map(SortKey::Int).ok_or_else(|| {
                TrellisError::invalid_argument(format!("{} records have no cost", Self::KIND))
            }),
            MostConnected | LeastConnected => self
                .degree()
                .map(|d| SortKey::Int(d as i64))
                .ok_or_else(|| {
                    TrellisError::invalid_argument(format!(
                        "{} records have no connectedness",
                        Self::KIND
                    ))
                }),
        }
    }

    fn sort_marker(&self, order: EnumerationOrder) -> Result<SortMarker> {
        Ok(SortMarker::new(self.sort_key(order)?, self.id()))
    }
}

/// Storage primitives for one entity type.
///
/// Implementations translate [`RecordQuery`] into their native query form;
/// the engines above never see that form.
#[async_trait]
pub trait Repository<T: Record>: Send + Sync {
    /// Insert a record. Fails with `Conflict` if the id already exists.
    async fn insert(&self, record: T) -> Result<T>;

    async fn insert_many(&self, records: Vec<T>) -> Result<Vec<T>> {
        let mut inserted = Vec::with_capacity(records.len());
        for record in records {
            inserted.push(self.insert(record).await?);
        }
        Ok(inserted)
    }

    async fn select_by_key(&self, tenant_id: TrellisId, id: TrellisId) -> Result<Option<T>>;

    /// Batch point lookup. Missing ids are omitted; order follows `ids`.
    async fn select_by_keys(&self, tenant_id: TrellisId, ids: &[TrellisId]) -> Result<Vec<T>>;

    /// Ordered, seeked, skipped and limited selection.
    async fn select_page(&self, query: &RecordQuery) -> Result<Vec<T>>;

    /// Count of records matching the query's scope, filter and marker.
    /// Ignores `skip` and `limit`.
    async fn count(&self, query: &RecordQuery) -> Result<u64>;

    /// Replace an existing record. Fails with `NotFound` if absent.
    async fn update(&self, record: T) -> Result<T>;

    /// Returns whether a record was removed.
    async fn delete(&self, tenant_id: TrellisId, id: TrellisId) -> Result<bool>;

    /// Returns the number of records removed.
    async fn delete_where(&self, query: &RecordQuery) -> Result<u64>;

    async fn exists(&self, tenant_id: TrellisId, id: TrellisId) -> Result<bool> {
        Ok(self.select_by_key(tenant_id, id).await?.is_some())
    }
}

/// One repository per entity type.
pub trait Storage: Send + Sync {
    fn tenants(&self) -> &dyn Repository<Tenant>;
    fn graphs(&self) -> &dyn Repository<Graph>;
    fn nodes(&self) -> &dyn Repository<Node>;
    fn edges(&self) -> &dyn Repository<Edge>;
    fn labels(&self) -> &dyn Repository<Label>;
    fn tags(&self) -> &dyn Repository<Tag>;
    fn vectors(&self) -> &dyn Repository<VectorRecord>;
}

impl Record for Tenant {
    const KIND: EntityKind = EntityKind::Tenant;

    fn id(&self) -> TrellisId {
        self.id
    }

    fn tenant_id(&self) -> TrellisId {
        self.id
    }

    fn graph_id(&self) -> Option<TrellisId> {
        None
    }

    fn created_utc(&self) -> DateTime<Utc> {
        self.created_utc
    }

    fn sort_name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn repository(storage: &dyn Storage) -> &dyn Repository<Self> {
        storage.tenants()
    }
}

impl Record for Graph {
    const KIND: EntityKind = EntityKind::Graph;

    fn id(&self) -> TrellisId {
        self.id
    }

    fn tenant_id(&self) -> TrellisId {
        self.tenant_id
    }

    fn graph_id(&self) -> Option<TrellisId> {
        Some(self.id)
    }

    fn created_utc(&self) -> DateTime<Utc> {
        self.created_utc
    }

    fn sort_name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn strip_data(&mut self) {
        self.data = None;
    }

    fn repository(storage: &dyn Storage) -> &dyn Repository<Self> {
        storage.graphs()
    }
}

impl Record for Node {
    const KIND: EntityKind = EntityKind::Node;

    fn id(&self) -> TrellisId {
        self.id
    }

    fn tenant_id(&self) -> TrellisId {
        self.tenant_id
    }

    fn graph_id(&self) -> Option<TrellisId> {
        Some(self.graph_id)
    }

    fn created_utc(&self) -> DateTime<Utc> {
        self.created_utc
    }

    fn sort_name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn degree(&self) -> Option<u64> {
        Some(self.total_degree)
    }

    fn strip_data(&mut self) {
        self.data = None;
    }

    fn repository(storage: &dyn Storage) -> &dyn Repository<Self> {
        storage.nodes()
    }
}

impl Record for Edge {
    const KIND: EntityKind = EntityKind::Edge;

    fn id(&self) -> TrellisId {
        self.id
    }

    fn tenant_id(&self) -> TrellisId {
        self.tenant_id
    }

    fn graph_id(&self) -> Option<TrellisId> {
        Some(self.graph_id)
    }

    fn created_utc(&self) -> DateTime<Utc> {
        self.created_utc
    }

    fn sort_name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn cost(&self) -> Option<i64> {
        Some(i64::from(self.cost))
    }

    fn strip_data(&mut self) {
        self.data = None;
    }

    fn repository(storage: &dyn Storage) -> &dyn Repository<Self> {
        storage.edges()
    }
}

impl Record for Label {
    const KIND: EntityKind = EntityKind::Label;

    fn id(&self) -> TrellisId {
        self.id
    }

    fn tenant_id(&self) -> TrellisId {
        self.tenant_id
    }

    fn graph_id(&self) -> Option<TrellisId> {
        Some(self.graph_id)
    }

    fn created_utc(&self) -> DateTime<Utc> {
        self.created_utc
    }

    fn sort_name(&self) -> Option<&str> {
        Some(&self.label)
    }

    fn repository(storage: &dyn Storage) -> &dyn Repository<Self> {
        storage.labels()
    }
}

impl Record for Tag {
    const KIND: EntityKind = EntityKind::Tag;

    fn id(&self) -> TrellisId {
        self.id
    }

    fn tenant_id(&self) -> TrellisId {
        self.tenant_id
    }

    fn graph_id(&self) -> Option<TrellisId> {
        Some(self.graph_id)
    }

    fn created_utc(&self) -> DateTime<Utc> {
        self.created_utc
    }

    fn sort_name(&self) -> Option<&str> {
        Some(&self.key)
    }

    fn repository(storage: &dyn Storage) -> &dyn Repository<Self> {
        storage.tags()
    }
}

impl Record for VectorRecord {
    const KIND: EntityKind = EntityKind::Vector;

    fn id(&self) -> TrellisId {
        self.id
    }

    fn tenant_id(&self) -> TrellisId {
        self.tenant_id
    }

    fn graph_id(&self) -> Option<TrellisId> {
        Some(self.graph_id)
    }

    fn created_utc(&self) -> DateTime<Utc> {
        self.created_utc
    }

    fn sort_name(&self) -> Option<&str> {
        Some(&self.model)
    }

    fn repository(storage: &dyn Storage) -> &dyn Repository<Self> {
        storage.vectors()
    }
}
