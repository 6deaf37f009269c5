//! # Error Types
//!
//! Domain-specific error types for stockroom-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  stockroom-core errors (this file)                                     │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  stockroom-db errors (separate crate)                                  │
//! │  ├── DbError          - Storage failures                               │
//! │  └── SaleError        - What callers of the coordinator see            │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SaleError ← DbError               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (product ID, amounts)
//! 3. Errors are enum variants, never String

use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Core Error
// =============================================================================

/// Core business rule violations.
///
/// Every variant maps to exactly one failure category a caller can render:
/// invalid request, invalid price, insufficient stock or missing product.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Product cannot be found.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Insufficient stock to complete a sale.
    ///
    /// ## User Workflow
    /// ```text
    /// Sell 7 units (two lines: 3 + 4)
    ///      │
    ///      ▼
    /// Aggregated demand vs stock: available=5
    ///      │
    ///      ▼
    /// InsufficientStock { product_id, available: 5, requested: 7 }
    ///      │
    ///      ▼
    /// UI shows: "Only 5 in stock"
    /// ```
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// Billed total is negative or above catalog price × quantity.
    #[error("Billed total {billed} is outside the allowed range 0.00..={max}")]
    BilledTotalOutOfBounds { billed: Money, max: Money },

    /// A batch sale with no lines.
    #[error("Sale batch must contain at least one line")]
    EmptyBatch,

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Returns true for errors about money amounts.
    pub fn is_pricing(&self) -> bool {
        match self {
            CoreError::BilledTotalOutOfBounds { .. } => true,
            CoreError::Validation(v) => v.is_pricing(),
            _ => false,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur before any business logic runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., "12.345" as an amount).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not allowed in this context.
    #[error("{field} is not allowed: {reason}")]
    NotAllowed { field: String, reason: String },

    /// Arithmetic on amounts or quantities overflowed.
    #[error("{field} is too large")]
    Overflow { field: String },
}

impl ValidationError {
    /// Returns the name of the offending field.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::Required { field }
            | ValidationError::TooLong { field, .. }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::MustBePositive { field }
            | ValidationError::InvalidFormat { field, .. }
            | ValidationError::NotAllowed { field, .. }
            | ValidationError::Overflow { field } => field,
        }
    }

    /// Returns true when the offending field is a money amount.
    pub fn is_pricing(&self) -> bool {
        let field = self.field();
        field.contains("price") || field.contains("total") || field.contains("payable")
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
