use common::SagaId;
use domain::{DomainError, PaymentStatus};
use thiserror::Error;

/// Errors that can occur when interacting with the payment store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The (saga type, saga id, payment status) key of an outbox row is taken.
    /// Another transaction already recorded this outcome.
    #[error("Outbox message already exists for {saga_type} saga {saga_id} with payment status {payment_status}")]
    DuplicateOutboxMessage {
        saga_type: String,
        saga_id: SagaId,
        payment_status: PaymentStatus,
    },

    /// A stored column held a value that does not map to a domain type.
    #[error("Invalid value {value:?} in column {column}")]
    InvalidColumn { column: &'static str, value: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value broke a domain invariant.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// The storage backend refused the operation.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns true if retrying the whole transaction may succeed.
    ///
    /// Data exceptions and integrity violations reported by the database
    /// fail the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(db_err)) => !db_err
                .code()
                .is_some_and(|code| is_permanent_sqlstate(&code)),
            StoreError::Database(e) => {
                !matches!(e, sqlx::Error::RowNotFound | sqlx::Error::ColumnDecode { .. })
            }
            StoreError::Backend(_) => true,
            _ => false,
        }
    }
}

/// SQLSTATE class 22 (data exception) or 23 (integrity constraint violation).
fn is_permanent_sqlstate(code: &str) -> bool {
    code.starts_with("22") || code.starts_with("23")
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlstate_classes() {
        // numeric_value_out_of_range, check_violation, unique_violation
        assert!(is_permanent_sqlstate("22003"));
        assert!(is_permanent_sqlstate("23514"));
        assert!(is_permanent_sqlstate("23505"));
        // serialization_failure, deadlock_detected, admin_shutdown
        assert!(!is_permanent_sqlstate("40001"));
        assert!(!is_permanent_sqlstate("40P01"));
        assert!(!is_permanent_sqlstate("57P01"));
    }

    #[test]
    fn test_connection_level_errors_are_retryable() {
        assert!(StoreError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(StoreError::Backend("unavailable".to_string()).is_retryable());
        assert!(!StoreError::Database(sqlx::Error::RowNotFound).is_retryable());
        assert!(
            !StoreError::InvalidColumn {
                column: "status",
                value: "PAID".to_string()
            }
            .is_retryable()
        );
    }
}
