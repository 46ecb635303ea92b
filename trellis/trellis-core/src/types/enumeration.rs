//! Cursor-based enumeration request/response types and the ordering model.

use crate::error::{Result, TrellisError};
use crate::id::TrellisId;
use crate::types::entity::EntityKind;
use crate::types::filter::SearchFilter;
use crate::types::query::ParentRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Smallest and largest accepted page size.
pub const MIN_PAGE_SIZE: usize = 1;
pub const MAX_PAGE_SIZE: usize = 1000;

/// Result ordering for enumeration and paged selects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumerationOrder {
    #[default]
    CreatedAscending,
    CreatedDescending,
    NameAscending,
    NameDescending,
    /// Edges only
    CostAscending,
    /// Edges only
    CostDescending,
    /// Nodes within a single graph only; by total degree
    MostConnected,
    /// Nodes within a single graph only; by total degree
    LeastConnected,
}

impl EnumerationOrder {
    pub fn is_descending(&self) -> bool {
        matches!(
            self,
            Self::CreatedDescending | Self::NameDescending | Self::CostDescending | Self::MostConnected
        )
    }

    pub fn is_cost(&self) -> bool {
        matches!(self, Self::CostAscending | Self::CostDescending)
    }

    pub fn is_connectedness(&self) -> bool {
        matches!(self, Self::MostConnected | Self::LeastConnected)
    }

    /// Reject orderings that make no sense for `kind` or the given scope.
    pub fn validate_for(&self, kind: EntityKind, graph_scoped: bool) -> Result<()> {
        if self.is_cost() && kind != EntityKind::Edge {
            return Err(TrellisError::invalid_argument(format!(
                "cost ordering is only valid for edges, not {}",
                kind
            )));
        }
        if self.is_connectedness() && (kind != EntityKind::Node || !graph_scoped) {
            return Err(TrellisError::invalid_argument(
                "connectedness ordering is only valid for nodes within a single graph",
            ));
        }
        Ok(())
    }

    /// Total order over `(key, id)` pairs. Descending orders reverse the key
    /// only; ids always break ties ascending.
    pub fn compare(&self, a: &SortMarker, b: &SortMarker) -> Ordering {
        let by_key = a.key.cmp(&b.key);
        let by_key = if self.is_descending() { by_key.reverse() } else { by_key };
        by_key.then_with(|| a.id.cmp(&b.id))
    }
}

/// Ordering key extracted from a record for a given [`EnumerationOrder`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SortKey {
    Time(DateTime<Utc>),
    Text(String),
    Int(i64),
}

/// Seek position: a record's ordering key plus its id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortMarker {
    pub key: SortKey,
    pub id: TrellisId,
}

impl SortMarker {
    pub fn new(key: SortKey, id: TrellisId) -> Self {
        Self { key, id }
    }

    /// Whether `candidate` sorts strictly after this marker under `order`.
    pub fn precedes(&self, order: EnumerationOrder, candidate: &SortMarker) -> bool {
        order.compare(candidate, self) == Ordering::Greater
    }
}

/// A single enumeration request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumerationQuery {
    /// `None` enumerates across tenants (tenant listing only)
    pub tenant_id: Option<TrellisId>,
    pub graph_id: Option<TrellisId>,
    /// Restricts labels, tags and vectors to one attachment point
    pub parent: Option<ParentRef>,
    #[serde(default)]
    pub order: EnumerationOrder,
    pub max_results: usize,
    #[serde(default)]
    pub skip: u64,
    /// Id of the last record returned by the previous page
    pub continuation_token: Option<TrellisId>,
    #[serde(default)]
    pub filter: SearchFilter,
    #[serde(default)]
    pub include_data: bool,
    #[serde(default)]
    pub include_subordinates: bool,
}

impl EnumerationQuery {
    pub fn new(tenant_id: TrellisId) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            ..Self::all()
        }
    }

    /// Enumeration that is not scoped to a tenant.
    pub fn all() -> Self {
        Self {
            tenant_id: None,
            graph_id: None,
            parent: None,
            order: EnumerationOrder::default(),
            max_results: 100,
            skip: 0,
            continuation_token: None,
            filter: SearchFilter::default(),
            include_data: false,
            include_subordinates: false,
        }
    }

    pub fn in_graph(mut self, graph_id: TrellisId) -> Self {
        self.graph_id = Some(graph_id);
        self
    }

    pub fn with_parent(mut self, parent: ParentRef) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_order(mut self, order: EnumerationOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_filter(mut self, filter: SearchFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_continuation(mut self, token: Option<TrellisId>) -> Self {
        self.continuation_token = token;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.max_results) {
            return Err(TrellisError::invalid_argument(format!(
                "max_results must be between {} and {}",
                MIN_PAGE_SIZE, MAX_PAGE_SIZE
            )));
        }
        Ok(())
    }
}

/// One page of an enumeration plus its bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumerationResult<T> {
    pub timestamp: DateTime<Utc>,
    pub max_results: usize,
    /// Id of the last object on this page; `None` once exhausted
    pub continuation_token: Option<TrellisId>,
    pub end_of_results: bool,
    /// Records matching the filter, independent of paging
    pub total_records: u64,
    /// Records after the last object on this page
    pub records_remaining: u64,
    pub objects: Vec<T>,
}

impl<T> EnumerationResult<T> {
    pub fn empty(max_results: usize) -> Self {
        Self {
            timestamp: Utc::now(),
            max_results,
            continuation_token: None,
            end_of_results: true,
            total_records: 0,
            records_remaining: 0,
            objects: Vec::new(),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> EnumerationResult<U> {
        EnumerationResult {
            timestamp: self.timestamp,
            max_results: self.max_results,
            continuation_token: self.continuation_token,
            end_of_results: self.end_of_results,
            total_records: self.total_records,
            records_remaining: self.records_remaining,
            objects: self.objects.into_iter().map(f).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_validation() {
        let cost = EnumerationOrder::CostAscending;
        assert!(cost.validate_for(EntityKind::Edge, false).is_ok());
        assert!(cost.validate_for(EntityKind::Node, true).is_err());

        let most = EnumerationOrder::MostConnected;
        assert!(most.validate_for(EntityKind::Node, true).is_ok());
        assert!(most.validate_for(EntityKind::Node, false).is_err());
        assert!(most.validate_for(EntityKind::Edge, true).is_err());
    }

    #[test]
    fn test_descending_reverses_key_but_not_tiebreak() {
        let low = TrellisId::nil();
        let high = TrellisId::new();
        let a = SortMarker::new(SortKey::Int(5), high);
        let b = SortMarker::new(SortKey::Int(5), low);
        let c = SortMarker::new(SortKey::Int(9), low);

        let desc = EnumerationOrder::MostConnected;
        assert_eq!(desc.compare(&c, &a), Ordering::Less);
        assert_eq!(desc.compare(&b, &a), Ordering::Less);

        let asc = EnumerationOrder::LeastConnected;
        assert_eq!(asc.compare(&a, &c), Ordering::Less);
        assert!(b.precedes(asc, &a));
    }

    #[test]
    fn test_page_size_bounds() {
        let q = EnumerationQuery::new(TrellisId::new());
        assert!(q.clone().with_max_results(0).validate().is_err());
        assert!(q.clone().with_max_results(1001).validate().is_err());
        assert!(q.with_max_results(1000).validate().is_ok());
    }
}
