//! Error types for the eager query engine
//!
//! Configuration errors (unknown associations, cycles) are raised while the query
//! is being configured, planning errors (strategy, alias) while the statement is
//! being built, and statement errors are passed through untouched from the
//! execution layer.

/// Result type alias for engine operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for query configuration, planning and execution
#[derive(Debug, thiserror::Error)]
pub enum OrmError {
    /// A contain() call referenced an association that is not registered
    #[error("Collection '{collection}' has no association named '{association}'")]
    UnknownAssociation {
        collection: String,
        association: String,
    },

    /// A collection name could not be resolved in the registry
    #[error("Collection '{0}' is not registered")]
    UnknownCollection(String),

    /// A strategy override does not fit the association cardinality
    #[error("Invalid strategy '{strategy}' for association '{association}': {reason}")]
    InvalidStrategy {
        association: String,
        strategy: String,
        reason: String,
    },

    /// Two branches of one statement resolved to the same join alias
    #[error("Join alias '{alias}' is used more than once in the same statement")]
    AmbiguousAlias { alias: String },

    /// A containment branch revisits a collection on its own ancestor path
    #[error("Containment path '{path}' revisits a collection already joined on this branch")]
    CyclicContainment { path: String },

    /// Invalid descriptor, option or engine configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The statement layer failed; the source error is kept as-is
    #[error("Statement execution failed: {0}")]
    Statement(#[source] anyhow::Error),

    /// A backend cannot evaluate part of a plan
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Option or record (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OrmError {
    pub(crate) fn unknown_association(collection: &str, association: &str) -> Self {
        Self::UnknownAssociation {
            collection: collection.to_string(),
            association: association.to_string(),
        }
    }

    pub(crate) fn invalid_strategy(
        association: &str,
        strategy: impl std::fmt::Display,
        reason: &str,
    ) -> Self {
        Self::InvalidStrategy {
            association: association.to_string(),
            strategy: strategy.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Returns true for errors raised before any statement was issued
    pub fn is_configuration_error(&self) -> bool {
        !matches!(self, Self::Statement(_))
    }
}
