//! Cursor-based pagination shared by every entity type.
//!
//! A page is fetched by seeking past the continuation marker on the
//! ordering key rather than by offset, so inserts between calls never shift
//! records across page boundaries.

use crate::{ResultStream, ensure_active};
use async_stream::try_stream;
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use trellis_core::config::EnumerationConfig;
use trellis_core::prelude::*;

#[derive(Clone)]
pub struct Enumerator {
    storage: Arc<dyn Storage>,
    config: EnumerationConfig,
}

impl Enumerator {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_config(storage, EnumerationConfig::default())
    }

    pub fn with_config(storage: Arc<dyn Storage>, config: EnumerationConfig) -> Self {
        Self { storage, config }
    }

    /// A tenant-scoped query using the configured default page size.
    pub fn query(&self, tenant_id: TrellisId) -> EnumerationQuery {
        EnumerationQuery::new(tenant_id).with_max_results(self.config.default_page_size)
    }

    /// Fetch one page plus total and remaining counts.
    pub async fn enumerate<T: Record>(
        &self,
        query: &EnumerationQuery,
        cancel: &CancellationToken,
    ) -> Result<EnumerationResult<T>> {
        query.validate()?;
        query.order.validate_for(T::KIND, query.graph_id.is_some())?;

        let repo = T::repository(self.storage.as_ref());
        let scope = scope_of(query);

        let marker = match query.continuation_token {
            Some(token) => {
                ensure_active(cancel)?;
                // Tenants are their own tenant scope.
                let tenant = query.tenant_id.unwrap_or(token);
                let record = repo
                    .select_by_key(tenant, token)
                    .await?
                    .ok_or_else(|| TrellisError::not_found("continuation token", token))?;
                Some(record.sort_marker(query.order)?)
            }
            None => None,
        };

        ensure_active(cancel)?;
        let total = repo.count(&scope).await?;
        if total == 0 {
            return Ok(EnumerationResult::empty(query.max_results));
        }

        ensure_active(cancel)?;
        let page_query = scope
            .clone()
            .after(marker)
            .with_skip(query.skip)
            .with_limit(query.max_results);
        let objects = repo.select_page(&page_query).await?;

        let (remaining, last_id) = match objects.last() {
            Some(last) => {
                ensure_active(cancel)?;
                let after_last = scope.clone().after(Some(last.sort_marker(query.order)?));
                (repo.count(&after_last).await?, Some(last.id()))
            }
            None => (0, None),
        };

        let kind = T::KIND;
        debug!(
            kind = %kind,
            total,
            returned = objects.len(),
            remaining,
            "Enumerated page"
        );

        Ok(EnumerationResult {
            timestamp: Utc::now(),
            max_results: query.max_results,
            continuation_token: if remaining == 0 { None } else { last_id },
            end_of_results: remaining == 0,
            total_records: total,
            records_remaining: remaining,
            objects,
        })
    }

    /// Lazily walk every record matching `query`, fetching
    /// `stream_page_size` records per page. Pages are fetched on demand;
    /// dropping the stream stops further fetches.
    pub fn stream<T: Record>(
        &self,
        query: EnumerationQuery,
        cancel: CancellationToken,
    ) -> ResultStream<T> {
        let enumerator = self.clone();
        let page_size = self.config.stream_page_size;
        Box::pin(try_stream! {
            let mut query = query.with_max_results(page_size);
            loop {
                let page = enumerator.enumerate::<T>(&query, &cancel).await?;
                let next = page.continuation_token;
                for record in page.objects {
                    yield record;
                }
                match next {
                    Some(token) => {
                        query.continuation_token = Some(token);
                        query.skip = 0;
                    }
                    None => break,
                }
            }
        })
    }
}

/// Filter-only selection for a query: no marker, no paging.
fn scope_of(query: &EnumerationQuery) -> RecordQuery {
    RecordQuery {
        tenant_id: query.tenant_id,
        graph_id: query.graph_id,
        parent: query.parent.clone(),
        adjacency: None,
        ids: None,
        filter: query.filter.clone(),
        order: query.order,
        after: None,
        skip: 0,
        limit: None,
    }
}
