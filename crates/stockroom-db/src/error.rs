//! # Database Error Types
//!
//! Error types for storage operations and for the sale coordinator.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)          CoreError (pricing, stock, input) │
//! │       │                                   │                             │
//! │       ▼                                   │                             │
//! │  DbError ← categorized by SQLite code     │                             │
//! │       │     (busy, constraint, ...)       │                             │
//! │       └───────────────┬───────────────────┘                             │
//! │                       ▼                                                 │
//! │                  SaleError ──► FailureKind (reason code for callers)   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use stockroom_core::{CoreError, ValidationError};

/// SQLite result codes that mean "another connection holds the lock" or
/// "your snapshot is stale". Primary and extended forms.
const SQLITE_BUSY_CODES: &[&str] = &[
    "5",   // SQLITE_BUSY
    "261", // SQLITE_BUSY_RECOVERY
    "517", // SQLITE_BUSY_SNAPSHOT
    "773", // SQLITE_BUSY_TIMEOUT
    "6",   // SQLITE_LOCKED
    "262", // SQLITE_LOCKED_SHAREDCACHE
];

/// Foreign key failures. A RESTRICT action fires as a trigger constraint,
/// which sqlx reports as `ErrorKind::Other`.
const SQLITE_FOREIGN_KEY_CODES: &[&str] = &[
    "787",  // SQLITE_CONSTRAINT_FOREIGNKEY
    "1811", // SQLITE_CONSTRAINT_TRIGGER
];

// =============================================================================
// Database Error
// =============================================================================

/// Database operation errors.
///
/// These errors wrap sqlx errors and provide additional context
/// for debugging and for retry decisions.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Recording a sale for a product id that does not exist
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// CHECK constraint violation (negative stock, non-positive quantity sold).
    #[error("Check constraint violation: {message}")]
    CheckViolation { message: String },

    /// Entity cannot be deleted while other rows reference it.
    #[error("{entity} {id} is in use and cannot be deleted")]
    InUse { entity: String, id: String },

    /// SQLite reported BUSY or LOCKED.
    ///
    /// ## When This Occurs
    /// - Another connection holds the write lock past the busy timeout
    /// - A deferred transaction read a snapshot that is now stale
    #[error("Database busy: {0}")]
    Busy(String),

    /// Optimistic version check failed: the row changed since it was read.
    #[error("Concurrent update of {entity} {id}")]
    Conflict { entity: String, id: String },

    /// A transaction ran past its deadline and was rolled back.
    #[error("Transaction timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },

    /// Input rejected before reaching SQL.
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a Conflict error for a given entity type and ID.
    pub fn conflict(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::Conflict {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// True when running the whole transaction again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::Busy(_) | DbError::Conflict { .. })
    }
}

fn is_busy(code: Option<&str>, message: &str) -> bool {
    code.is_some_and(|c| SQLITE_BUSY_CODES.contains(&c))
        || message.contains("database is locked")
        || message.contains("database table is locked")
}

fn is_foreign_key(code: Option<&str>, message: &str) -> bool {
    code.is_some_and(|c| SQLITE_FOREIGN_KEY_CODES.contains(&c))
        || message.contains("FOREIGN KEY constraint failed")
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound      → DbError::NotFound
/// sqlx::Error::Database         → busy/locked code   → DbError::Busy
///                                 constraint kind    → Unique / ForeignKey / Check
///                                 anything else      → DbError::QueryFailed
/// sqlx::Error::PoolTimedOut     → DbError::PoolExhausted
/// Other                         → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message().to_string();
                let code = db_err.code().map(|c| c.into_owned());

                if is_busy(code.as_deref(), &msg) {
                    return DbError::Busy(msg);
                }
                if is_foreign_key(code.as_deref(), &msg) {
                    return DbError::ForeignKeyViolation { message: msg };
                }

                match db_err.kind() {
                    sqlx::error::ErrorKind::UniqueViolation => {
                        // "UNIQUE constraint failed: <table>.<column>"
                        let field = msg
                            .split("UNIQUE constraint failed: ")
                            .nth(1)
                            .unwrap_or("unknown")
                            .to_string();
                        DbError::UniqueViolation {
                            field,
                            value: "unknown".to_string(),
                        }
                    }
                    sqlx::error::ErrorKind::ForeignKeyViolation => {
                        DbError::ForeignKeyViolation { message: msg }
                    }
                    sqlx::error::ErrorKind::CheckViolation => {
                        DbError::CheckViolation { message: msg }
                    }
                    _ => DbError::QueryFailed(msg),
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Sale Error
// =============================================================================

/// What a caller of the sale coordinator gets back on failure.
///
/// Every failed sale has already been rolled back by the time this value
/// exists, except for `RollbackFailed`, which reports that the rollback
/// itself failed after `original` aborted the sale.
#[derive(Debug, Error)]
pub enum SaleError {
    /// The request broke a business rule; nothing was written.
    #[error(transparent)]
    Rejected(#[from] CoreError),

    /// Storage failed; the transaction was rolled back.
    #[error(transparent)]
    Persistence(#[from] DbError),

    /// The sale aborted and the rollback failed too.
    #[error("Rollback failed after error ({original}): {source}")]
    RollbackFailed {
        original: Box<SaleError>,
        source: DbError,
    },
}

impl SaleError {
    /// Returns the reason code for this failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            SaleError::Rejected(CoreError::ProductNotFound(_)) => FailureKind::ProductNotFound,
            SaleError::Rejected(CoreError::InsufficientStock { .. }) => {
                FailureKind::InsufficientStock
            }
            SaleError::Rejected(err) if err.is_pricing() => FailureKind::InvalidPrice,
            SaleError::Rejected(_) => FailureKind::InvalidRequest,
            SaleError::Persistence(DbError::NotFound { .. }) => FailureKind::ProductNotFound,
            SaleError::Persistence(DbError::Validation(v)) if v.is_pricing() => {
                FailureKind::InvalidPrice
            }
            SaleError::Persistence(DbError::Validation(_)) => FailureKind::InvalidRequest,
            SaleError::Persistence(_) | SaleError::RollbackFailed { .. } => {
                FailureKind::StorageFault
            }
        }
    }

    /// True when the coordinator may run the transaction again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SaleError::Persistence(e) if e.is_retryable())
    }
}

/// Result type for coordinator operations.
pub type SaleResult<T> = Result<T, SaleError>;

// =============================================================================
// Failure Kind
// =============================================================================

/// Stable reason codes for failed sales.
///
/// | Code                 | Meaning                                        |
/// |----------------------|------------------------------------------------|
/// | `INVALID_REQUEST`    | Bad quantity, missing user, empty batch, ...   |
/// | `INVALID_PRICE`      | Billed total or payable outside allowed range  |
/// | `INSUFFICIENT_STOCK` | Demand exceeds quantity on hand                |
/// | `PRODUCT_NOT_FOUND`  | Unknown product reference                      |
/// | `STORAGE_FAULT`      | Storage failed; nothing was applied            |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    InvalidRequest,
    InvalidPrice,
    InsufficientStock,
    ProductNotFound,
    StorageFault,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InvalidRequest => "INVALID_REQUEST",
            FailureKind::InvalidPrice => "INVALID_PRICE",
            FailureKind::InsufficientStock => "INSUFFICIENT_STOCK",
            FailureKind::ProductNotFound => "PRODUCT_NOT_FOUND",
            FailureKind::StorageFault => "STORAGE_FAULT",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
