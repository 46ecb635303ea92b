use crate::client::ClientContext;
use crate::services::graphs::delete_graph;
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use trellis_core::prelude::*;
use trellis_graph::ResultStream;

/// Tenant management.
#[derive(Clone)]
pub struct TenantService {
    context: Arc<ClientContext>,
}

impl TenantService {
    pub(crate) fn new(context: Arc<ClientContext>) -> Self {
        Self { context }
    }

    pub async fn create(&self, tenant: Tenant) -> Result<Tenant> {
        if tenant.name.trim().is_empty() {
            return Err(TrellisError::invalid_argument("tenant name must not be empty"));
        }
        let tenant = self.context.storage.tenants().insert(tenant).await?;
        self.context.caches.tenants.insert(tenant.id);
        info!("Created tenant: {} ({})", tenant.name, tenant.id);
        Ok(tenant)
    }

    pub async fn create_many(&self, tenants: Vec<Tenant>) -> Result<Vec<Tenant>> {
        let mut created = Vec::with_capacity(tenants.len());
        for tenant in tenants {
            created.push(self.create(tenant).await?);
        }
        Ok(created)
    }

    pub async fn read_by_guid(&self, tenant_id: TrellisId) -> Result<Option<Tenant>> {
        self.context.storage.tenants().select_by_key(tenant_id, tenant_id).await
    }

    pub async fn read_by_guids(&self, tenant_ids: &[TrellisId]) -> Result<Vec<Tenant>> {
        let mut tenants = Vec::with_capacity(tenant_ids.len());
        for id in tenant_ids {
            if let Some(tenant) = self.read_by_guid(*id).await? {
                tenants.push(tenant);
            }
        }
        Ok(tenants)
    }

    /// Every tenant matching `query`, fetched a page at a time.
    pub fn read_many(&self, query: EnumerationQuery, cancel: CancellationToken) -> ResultStream<Tenant> {
        self.context
            .enumerator
            .stream::<Tenant>(EnumerationQuery { tenant_id: None, ..query }, cancel)
    }

    pub async fn read_first(&self, query: EnumerationQuery, cancel: &CancellationToken) -> Result<Option<Tenant>> {
        let page = self.enumerate(query.with_max_results(1), cancel).await?;
        Ok(page.objects.into_iter().next())
    }

    pub async fn enumerate(
        &self,
        query: EnumerationQuery,
        cancel: &CancellationToken,
    ) -> Result<EnumerationResult<Tenant>> {
        let query = EnumerationQuery { tenant_id: None, ..query };
        self.context.enumerator.enumerate::<Tenant>(&query, cancel).await
    }

    pub async fn update(&self, mut tenant: Tenant) -> Result<Tenant> {
        if tenant.name.trim().is_empty() {
            return Err(TrellisError::invalid_argument("tenant name must not be empty"));
        }
        let existing = self
            .read_by_guid(tenant.id)
            .await?
            .ok_or_else(|| TrellisError::not_found("tenant", tenant.id))?;

        tenant.created_utc = existing.created_utc;
        tenant.last_update_utc = Utc::now();
        self.context.caches.tenants.invalidate(&tenant.id);
        self.context.storage.tenants().update(tenant).await
    }

    /// Delete a tenant. Without `force` this fails with `Conflict` while the
    /// tenant still owns graphs; with `force` every graph is deleted first.
    pub async fn delete_by_guid(&self, tenant_id: TrellisId, force: bool) -> Result<()> {
        self.context.require_tenant(tenant_id).await?;

        let graphs = self
            .context
            .storage
            .graphs()
            .select_page(&RecordQuery::tenant(tenant_id))
            .await?;
        if !graphs.is_empty() && !force {
            return Err(TrellisError::conflict(format!(
                "tenant {} still owns {} graphs",
                tenant_id,
                graphs.len()
            )));
        }

        for graph in &graphs {
            delete_graph(&self.context, graph).await?;
        }
        self.context.storage.tenants().delete(tenant_id, tenant_id).await?;

        let caches = &self.context.caches;
        caches.tenants.invalidate(&tenant_id);
        if !graphs.is_empty() {
            caches.graphs.clear();
            caches.nodes.clear();
            caches.edges.clear();
        }
        info!("Deleted tenant {} ({} graphs)", tenant_id, graphs.len());
        Ok(())
    }

    pub async fn delete_many(&self, tenant_ids: &[TrellisId], force: bool) -> Result<()> {
        for id in tenant_ids {
            match self.delete_by_guid(*id, force).await {
                Err(e) if e.is_not_found() => continue,
                other => other?,
            }
        }
        self.context.caches.tenants.clear();
        Ok(())
    }

    pub async fn exists_by_guid(&self, tenant_id: TrellisId) -> Result<bool> {
        match self.context.require_tenant(tenant_id).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}
