// Store errors - everything the data layer can reject or fail with
//
// Surfaces (CLI, REST API) decide how each variant is shown to the user.

/// Result alias used across the data layer
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Row does not exist (or belongs to another owner)
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Input failed validation (empty name, bad date, unknown enum value...)
    #[error("validation failed: {0}")]
    Validation(String),

    /// Transaction amounts must be finite and non-negative
    #[error("invalid amount {0}: must be a non-negative number")]
    InvalidAmount(f64),

    /// Unique key already taken
    #[error("{entity} already exists: {key}")]
    Duplicate { entity: &'static str, key: String },

    /// Default categories are built in and cannot be removed
    #[error("default category cannot be deleted: {0}")]
    DefaultCategoryProtected(String),

    /// Caller identity missing
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A thread panicked while holding the connection lock
    #[error("database connection lock poisoned")]
    Poisoned,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// True for errors caused by the caller's input rather than the store
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound { .. }
                | StoreError::Validation(_)
                | StoreError::InvalidAmount(_)
                | StoreError::Duplicate { .. }
                | StoreError::DefaultCategoryProtected(_)
                | StoreError::Unauthorized(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = StoreError::not_found("transaction", "tx-1");
        assert_eq!(err.to_string(), "transaction not found: tx-1");

        let err = StoreError::DefaultCategoryProtected("Food".to_string());
        assert_eq!(err.to_string(), "default category cannot be deleted: Food");
    }

    #[test]
    fn test_client_error_classification() {
        assert!(StoreError::InvalidAmount(-1.0).is_client_error());
        assert!(!StoreError::Poisoned.is_client_error());
        assert!(!StoreError::Database(rusqlite::Error::InvalidQuery).is_client_error());
    }
}
