//! # Validation Module
//!
//! Input validation for Stockroom requests.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Request shape (THIS MODULE)                                  │
//! │  ├── Quantities positive, user present, names bounded                  │
//! │  └── Runs before any transaction is opened                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Transaction rules (pricing + stock ledger)                   │
//! │  ├── Billed total within 0..=price × quantity                          │
//! │  └── Aggregated demand within quantity on hand                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (quantity >= 0), CHECK (quantity_sold > 0)                  │
//! │  └── Foreign key product_id ON DELETE RESTRICT                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockroom_core::validation::{validate_quantity, validate_user_id};
//!
//! validate_quantity(5).unwrap();
//! assert!(validate_user_id("  ").is_err());
//! ```

use crate::error::ValidationError;
use crate::types::SaleLine;
use crate::{MAX_CATEGORY_LEN, MAX_PRODUCT_NAME_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest accepted search string.
const MAX_QUERY_LEN: usize = 100;

/// Longest accepted operator reference.
const MAX_USER_ID_LEN: usize = 64;

// =============================================================================
// String Validators
// =============================================================================

fn required_bounded(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

/// Validates a product name.
///
/// ## Rules
/// - Must not be empty
/// - At most 200 characters
///
/// ## Example
/// ```rust
/// use stockroom_core::validation::validate_product_name;
///
/// assert!(validate_product_name("Whole Milk 1L").is_ok());
/// assert!(validate_product_name("").is_err());
/// ```
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    required_bounded("name", name, MAX_PRODUCT_NAME_LEN)
}

/// Validates a category label (non-empty, at most 100 characters).
pub fn validate_category(category: &str) -> ValidationResult<()> {
    required_bounded("category", category, MAX_CATEGORY_LEN)
}

/// Validates the operator reference attached to every sale.
pub fn validate_user_id(user_id: &str) -> ValidationResult<()> {
    required_bounded("user_id", user_id, MAX_USER_ID_LEN)
}

/// Validates a product reference in a request.
pub fn validate_product_id(product_id: &str) -> ValidationResult<()> {
    if product_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "product_id".to_string(),
        });
    }
    Ok(())
}

/// Validates a search query.
///
/// ## Returns
/// The trimmed query string. Empty is allowed and means "everything".
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();

    if query.chars().count() > MAX_QUERY_LEN {
        return Err(ValidationError::TooLong {
            field: "query".to_string(),
            max: MAX_QUERY_LEN,
        });
    }

    Ok(query.to_string())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a requested sale or restock quantity.
///
/// ## User Workflow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Sell: product P, quantity 4                                           │
/// │       │                                                                 │
/// │       ▼                                                                 │
/// │  validate_quantity(4) ← THIS FUNCTION                                  │
/// │       │                                                                 │
/// │       ├── qty <= 0? → INVALID_REQUEST, no transaction opened           │
/// │       │                                                                 │
/// │       └── OK → open scope, read stock                                  │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    Ok(())
}

/// Validates a stored stock level. Zero is fine; negative never is.
pub fn validate_stock_level(qty: i64) -> ValidationResult<()> {
    if qty < 0 {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a price in cents.
///
/// ## Example
/// ```rust
/// use stockroom_core::validation::validate_price_cents;
///
/// assert!(validate_price_cents(1099).is_ok());  // 10.99
/// assert!(validate_price_cents(0).is_ok());     // free item
/// assert!(validate_price_cents(-100).is_err());
/// ```
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a percentage discount in basis points (0 to 10000).
pub fn validate_discount_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10000 {
        return Err(ValidationError::OutOfRange {
            field: "discount".to_string(),
            min: 0,
            max: 10000,
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the shape of every line in a batch.
///
/// Emptiness is a separate error (`CoreError::EmptyBatch`) and is checked by
/// the caller. Field names carry the line index, e.g. `lines[1].quantity`.
pub fn validate_sale_lines(lines: &[SaleLine]) -> ValidationResult<()> {
    for (index, line) in lines.iter().enumerate() {
        if line.product_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: format!("lines[{index}].product_id"),
            });
        }
        if line.quantity <= 0 {
            return Err(ValidationError::MustBePositive {
                field: format!("lines[{index}].quantity"),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
