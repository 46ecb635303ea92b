//! Error types for the Trellis graph database.

/// Result type alias for Trellis operations.
pub type Result<T> = std::result::Result<T, TrellisError>;

/// Main error type for the Trellis system.
#[derive(Debug, thiserror::Error)]
pub enum TrellisError {
    /// A referenced tenant, graph, node, edge or continuation marker is absent
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Missing required field, bad dimensionality, invalid ordering, paging out of range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Delete blocked by dependents, duplicate unique key
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Explicitly unsupported operations
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Approximate index errors
    #[error("Index error: {0}")]
    Index(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TrellisError {
    /// Create a new not found error
    pub fn not_found(resource: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }

    /// Create a new invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a new conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a new not implemented error
    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::NotImplemented(msg.into())
    }

    /// Create a new index error
    pub fn index(msg: impl Into<String>) -> Self {
        Self::Index(msg.into())
    }

    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is an invalid argument error
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    /// Check if this is a conflict error
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Check if the operation was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrellisError::not_found("node", "123");
        assert_eq!(format!("{}", err), "Not found: node with id 123");

        let err = TrellisError::invalid_argument("max_results must be between 1 and 1000");
        assert_eq!(
            format!("{}", err),
            "Invalid argument: max_results must be between 1 and 1000"
        );
    }

    #[test]
    fn test_predicates() {
        assert!(TrellisError::not_found("graph", "x").is_not_found());
        assert!(TrellisError::conflict("dependents").is_conflict());
        assert!(TrellisError::Cancelled.is_cancelled());
        assert!(!TrellisError::internal("boom").is_cancelled());
    }
}
