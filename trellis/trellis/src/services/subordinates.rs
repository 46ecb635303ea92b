use crate::client::ClientContext;
use crate::services::graph_scope;
use async_stream::try_stream;
use chrono::Utc;
use futures::TryStreamExt;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use trellis_core::prelude::*;
use trellis_graph::ResultStream;

/// Records attached to a graph, a node or an edge: labels, tags, vectors.
pub trait Subordinate: Record {
    fn owning_graph(&self) -> TrellisId;

    fn attached_to(&self) -> Attachment;

    /// Field-level validation run before every write.
    fn check(&self) -> Result<()>;

    /// Carry the creation time over from the stored version and stamp the
    /// update time.
    fn restamp(&mut self, stored: &Self);
}

impl Subordinate for Label {
    fn owning_graph(&self) -> TrellisId {
        self.graph_id
    }

    fn attached_to(&self) -> Attachment {
        self.attachment()
    }

    fn check(&self) -> Result<()> {
        if self.label.trim().is_empty() {
            return Err(TrellisError::invalid_argument("label must not be empty"));
        }
        Ok(())
    }

    fn restamp(&mut self, stored: &Self) {
        self.created_utc = stored.created_utc;
        self.last_update_utc = Utc::now();
    }
}

impl Subordinate for Tag {
    fn owning_graph(&self) -> TrellisId {
        self.graph_id
    }

    fn attached_to(&self) -> Attachment {
        self.attachment()
    }

    fn check(&self) -> Result<()> {
        if self.key.trim().is_empty() {
            return Err(TrellisError::invalid_argument("tag key must not be empty"));
        }
        Ok(())
    }

    fn restamp(&mut self, stored: &Self) {
        self.created_utc = stored.created_utc;
        self.last_update_utc = Utc::now();
    }
}

impl Subordinate for VectorRecord {
    fn owning_graph(&self) -> TrellisId {
        self.graph_id
    }

    fn attached_to(&self) -> Attachment {
        self.attachment()
    }

    fn check(&self) -> Result<()> {
        self.validate()
    }

    fn restamp(&mut self, stored: &Self) {
        self.created_utc = stored.created_utc;
        self.last_update_utc = Utc::now();
    }
}

/// CRUD over one subordinate record type. Writes are checked against the
/// existence of the graph and of the attached node or edge.
pub struct SubordinateService<T> {
    context: Arc<ClientContext>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for SubordinateService<T> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            _record: PhantomData,
        }
    }
}

pub type LabelService = SubordinateService<Label>;
pub type TagService = SubordinateService<Tag>;

impl<T: Subordinate> SubordinateService<T> {
    pub(crate) fn new(context: Arc<ClientContext>) -> Self {
        Self {
            context,
            _record: PhantomData,
        }
    }

    fn repository(&self) -> &dyn Repository<T> {
        T::repository(self.context.storage.as_ref())
    }

    pub async fn create(&self, record: T) -> Result<T> {
        record.check()?;
        self.context
            .require_attachment(record.tenant_id(), record.owning_graph(), record.attached_to())
            .await?;
        let record = self.repository().insert(record).await?;
        debug!("Created {} {}", T::KIND, record.id());
        Ok(record)
    }

    pub async fn create_many(&self, records: Vec<T>) -> Result<Vec<T>> {
        let mut created = Vec::with_capacity(records.len());
        for record in records {
            created.push(self.create(record).await?);
        }
        Ok(created)
    }

    pub async fn read_by_guid(&self, tenant_id: TrellisId, id: TrellisId) -> Result<Option<T>> {
        self.repository().select_by_key(tenant_id, id).await
    }

    pub async fn read_by_guids(&self, tenant_id: TrellisId, ids: &[TrellisId]) -> Result<Vec<T>> {
        self.repository().select_by_keys(tenant_id, ids).await
    }

    /// Every record matching `query`, fetched a page at a time. Set the
    /// query's parent to narrow to one owner.
    pub fn read_many(&self, query: EnumerationQuery, cancel: CancellationToken) -> ResultStream<T> {
        let context = self.context.clone();
        Box::pin(try_stream! {
            let (tenant_id, graph_id) = graph_scope(&query)?;
            context.require_graph(tenant_id, graph_id).await?;
            let mut records = context.enumerator.stream::<T>(query, cancel);
            while let Some(record) = records.try_next().await? {
                yield record;
            }
        })
    }

    pub async fn read_first(&self, query: EnumerationQuery, cancel: &CancellationToken) -> Result<Option<T>> {
        let page = self.enumerate(query.with_max_results(1), cancel).await?;
        Ok(page.objects.into_iter().next())
    }

    pub async fn enumerate(&self, query: EnumerationQuery, cancel: &CancellationToken) -> Result<EnumerationResult<T>> {
        let (tenant_id, graph_id) = graph_scope(&query)?;
        self.context.require_graph(tenant_id, graph_id).await?;
        self.context.enumerator.enumerate::<T>(&query, cancel).await
    }

    /// Records attached to one graph, node or edge, oldest first.
    pub async fn read_attached(
        &self,
        tenant_id: TrellisId,
        graph_id: TrellisId,
        attachment: Attachment,
    ) -> Result<Vec<T>> {
        let scope = RecordQuery::graph(tenant_id, graph_id).with_parent(attachment.into());
        self.repository().select_page(&scope).await
    }

    /// Replace a record's content. The graph and attachment are fixed at
    /// creation.
    pub async fn update(&self, mut record: T) -> Result<T> {
        record.check()?;
        let stored = self
            .repository()
            .select_by_key(record.tenant_id(), record.id())
            .await?
            .ok_or_else(|| TrellisError::not_found(T::KIND.as_str(), record.id()))?;
        if stored.owning_graph() != record.owning_graph() || stored.attached_to() != record.attached_to() {
            return Err(TrellisError::invalid_argument(format!(
                "{} {} cannot be moved to another owner",
                T::KIND,
                record.id()
            )));
        }
        record.restamp(&stored);
        self.repository().update(record).await
    }

    pub async fn delete_by_guid(&self, tenant_id: TrellisId, id: TrellisId) -> Result<()> {
        self.remove(tenant_id, id).await.map(|_| ())
    }

    pub async fn delete_many(&self, tenant_id: TrellisId, ids: &[TrellisId]) -> Result<()> {
        for id in ids {
            match self.remove(tenant_id, *id).await {
                Err(e) if e.is_not_found() => continue,
                other => {
                    other?;
                }
            }
        }
        Ok(())
    }

    /// Delete every record of this type in a graph. Returns the number
    /// removed.
    pub async fn delete_all_in_graph(&self, tenant_id: TrellisId, graph_id: TrellisId) -> Result<u64> {
        self.context.require_graph(tenant_id, graph_id).await?;
        let removed = self
            .repository()
            .delete_where(&RecordQuery::graph(tenant_id, graph_id))
            .await?;
        debug!("Deleted {} {} records from graph {}", removed, T::KIND, graph_id);
        Ok(removed)
    }

    /// Delete every record of this type attached to one owner.
    pub async fn delete_attached(
        &self,
        tenant_id: TrellisId,
        graph_id: TrellisId,
        attachment: Attachment,
    ) -> Result<u64> {
        let scope = RecordQuery::graph(tenant_id, graph_id).with_parent(attachment.into());
        self.repository().delete_where(&scope).await
    }

    pub async fn exists_by_guid(&self, tenant_id: TrellisId, id: TrellisId) -> Result<bool> {
        self.repository().exists(tenant_id, id).await
    }

    /// Delete and hand back the removed record.
    pub(crate) async fn remove(&self, tenant_id: TrellisId, id: TrellisId) -> Result<T> {
        let stored = self
            .repository()
            .select_by_key(tenant_id, id)
            .await?
            .ok_or_else(|| TrellisError::not_found(T::KIND.as_str(), id))?;
        self.repository().delete(tenant_id, id).await?;
        Ok(stored)
    }

    pub(crate) fn context(&self) -> &Arc<ClientContext> {
        &self.context
    }
}
