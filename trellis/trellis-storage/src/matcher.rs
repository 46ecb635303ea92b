//! In-memory evaluation of [`RecordQuery`] scope and filter criteria.
//!
//! This is the memory backend's stand-in for a query compiler: instead of
//! translating criteria into a native query it evaluates them directly
//! against stored rows.

use crate::memory::{MemoryRecord, MemoryState};
use trellis_core::{Attachment, ParentRef, RecordQuery};

/// Whether `record` falls inside the query's tenant/graph/id/parent/adjacency
/// scope and satisfies its filter.
pub(crate) fn matches<T: MemoryRecord>(record: &T, state: &MemoryState, query: &RecordQuery) -> bool {
    in_scope(record, query) && passes_filter(record, state, query)
}

fn in_scope<T: MemoryRecord>(record: &T, query: &RecordQuery) -> bool {
    if query.tenant_id.is_some_and(|t| record.tenant_id() != t) {
        return false;
    }
    if query.graph_id.is_some_and(|g| record.graph_id() != Some(g)) {
        return false;
    }
    if let Some(ids) = &query.ids {
        if !ids.contains(&record.id()) {
            return false;
        }
    }
    if let (Some(parent), Some(attachment)) = (&query.parent, record.attached_to()) {
        if !parent_matches(parent, attachment) {
            return false;
        }
    }
    if let (Some(adjacency), Some((from, to))) = (&query.adjacency, record.endpoints()) {
        if !adjacency.matches(from, to) {
            return false;
        }
    }
    true
}

pub(crate) fn parent_matches(parent: &ParentRef, attachment: Attachment) -> bool {
    match parent {
        ParentRef::Graph => attachment == Attachment::Graph,
        ParentRef::Node(id) => attachment == Attachment::Node(*id),
        ParentRef::Edge(id) => attachment == Attachment::Edge(*id),
        ParentRef::AnyOf(ids) => attachment.owner().is_some_and(|owner| ids.contains(&owner)),
    }
}

fn passes_filter<T: MemoryRecord>(record: &T, state: &MemoryState, query: &RecordQuery) -> bool {
    let filter = &query.filter;
    if filter.is_empty() {
        return true;
    }
    if !filter.name_matches(record.sort_name()) {
        return false;
    }
    if !filter.expression_matches(record.payload()) {
        return false;
    }

    // Label and tag criteria only constrain records that can own subordinates.
    let Some(owner) = record.owner_key() else {
        return true;
    };
    if !filter.labels.is_empty() {
        let labels = state.labels_of(&owner);
        if !filter.labels_match(labels.iter().map(|l| l.label.as_str())) {
            return false;
        }
    }
    if !filter.tags.is_empty() {
        let tags = state.tags_of(&owner);
        if !filter.tags_match(tags.iter().map(|t| (t.key.as_str(), t.value.as_str()))) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::TrellisId;

    #[test]
    fn test_parent_matching() {
        let n = TrellisId::new();
        let e = TrellisId::new();

        assert!(parent_matches(&ParentRef::Graph, Attachment::Graph));
        assert!(!parent_matches(&ParentRef::Graph, Attachment::Node(n)));
        assert!(parent_matches(&ParentRef::Node(n), Attachment::Node(n)));
        assert!(!parent_matches(&ParentRef::Edge(n), Attachment::Node(n)));
        assert!(parent_matches(&ParentRef::AnyOf(vec![n, e]), Attachment::Edge(e)));
        assert!(!parent_matches(&ParentRef::AnyOf(vec![n]), Attachment::Graph));
    }
}
