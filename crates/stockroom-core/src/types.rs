//! # Domain Types
//!
//! Core domain types used throughout Stockroom.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │      Sale       │   │    SaleLine     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │◄──│  product_id     │   │  product_id     │       │
//! │  │  quantity       │   │  quantity_sold  │   │  quantity       │       │
//! │  │  price_cents    │   │  total_cents    │   │  billed_total?  │       │
//! │  │  version        │   │  user_id        │   │  (request only) │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐                             │
//! │  │   SaleRecord    │   │   SalePhase     │                             │
//! │  │  Sale + name    │   │  Pending ...    │                             │
//! │  │  (reporting)    │   │  Committed      │                             │
//! │  └─────────────────┘   └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Quantity on a `Product` is owned by the stock ledger. Nothing in this
//! module can change it; `ProductUpdate` deliberately has no quantity field.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::money::Money;
use crate::validation::{self, ValidationResult};

// =============================================================================
// Product
// =============================================================================

/// A product held in stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name.
    pub name: String,

    /// Free-form category label ("Dairy", "Bakery", ...).
    pub category: String,

    /// Quantity on hand. Never negative.
    pub quantity: i64,

    /// Catalog unit price in cents.
    pub price_cents: i64,

    /// Perishable goods carry an expiry date.
    pub expiry_date: Option<NaiveDate>,

    /// Optimistic concurrency token, bumped on every stock write.
    pub version: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the unit price as Money.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Checks whether `requested` units can be taken from stock.
    #[inline]
    pub fn has_stock(&self, requested: i64) -> bool {
        requested <= self.quantity
    }

    /// True when the expiry date lies strictly before `today`.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        matches!(self.expiry_date, Some(expiry) if expiry < today)
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub category: String,
    pub quantity: i64,
    pub price_cents: i64,
    pub expiry_date: Option<NaiveDate>,
}

impl NewProduct {
    /// Checks every field before the product reaches the database.
    ///
    /// ## Example
    /// ```rust
    /// use stockroom_core::NewProduct;
    ///
    /// let milk = NewProduct {
    ///     name: "Whole Milk 1L".into(),
    ///     category: "Dairy".into(),
    ///     quantity: 24,
    ///     price_cents: 129,
    ///     expiry_date: None,
    /// };
    /// assert!(milk.validate().is_ok());
    ///
    /// let broken = NewProduct { quantity: -1, ..milk };
    /// assert!(broken.validate().is_err());
    /// ```
    pub fn validate(&self) -> ValidationResult<()> {
        validation::validate_product_name(&self.name)?;
        validation::validate_category(&self.category)?;
        validation::validate_stock_level(self.quantity)?;
        validation::validate_price_cents(self.price_cents)?;
        Ok(())
    }
}

/// Descriptive fields of a product that may be edited.
///
/// Stock is not among them: quantity changes only through sales and restocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductUpdate {
    pub name: String,
    pub category: String,
    pub price_cents: i64,
    pub expiry_date: Option<NaiveDate>,
}

impl ProductUpdate {
    pub fn validate(&self) -> ValidationResult<()> {
        validation::validate_product_name(&self.name)?;
        validation::validate_category(&self.category)?;
        validation::validate_price_cents(self.price_cents)?;
        Ok(())
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A persisted sale of one product line. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Sale {
    pub id: String,
    pub product_id: String,
    pub quantity_sold: i64,
    /// Effective charge for the line, in cents.
    pub total_cents: i64,
    /// Operator who rang up the sale.
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

impl Sale {
    /// Returns the billed total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// A sale joined with the product's current name, for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleRecord {
    pub id: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity_sold: i64,
    pub total_cents: i64,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

impl SaleRecord {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// A sale about to be written. Identifier and timestamp are assigned on insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSale {
    pub product_id: String,
    pub quantity_sold: i64,
    pub total: Money,
    pub user_id: String,
}

// =============================================================================
// Sale Request
// =============================================================================

/// One line of a sale request.
///
/// `billed_total` is the negotiated charge for the whole line. When it is
/// absent the line is charged at catalog price × quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLine {
    pub product_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub billed_total: Option<Money>,
}

impl SaleLine {
    /// A line charged at catalog price.
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        SaleLine {
            product_id: product_id.into(),
            quantity,
            billed_total: None,
        }
    }

    /// Sets a negotiated total for the whole line.
    pub fn with_billed_total(mut self, total: Money) -> Self {
        self.billed_total = Some(total);
        self
    }
}

// =============================================================================
// Sale Phase
// =============================================================================

/// Lifecycle of one sale transaction.
///
/// ```text
/// Pending ──► Validating ──► Applying ──► Committed
///                  │             │
///                  └──► Aborted ◄┘
/// ```
///
/// There is no partially applied terminal state: an `Applying` transaction
/// that does not reach `Committed` leaves stock and sales as they were.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SalePhase {
    Pending,
    Validating,
    Applying,
    Committed,
    Aborted,
}

impl SalePhase {
    /// Returns true when `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: SalePhase) -> bool {
        use SalePhase::*;
        matches!(
            (self, next),
            (Pending, Validating)
                | (Validating, Applying)
                | (Validating, Aborted)
                | (Applying, Committed)
                | (Applying, Aborted)
        )
    }

    /// Committed and Aborted are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, SalePhase::Committed | SalePhase::Aborted)
    }
}

impl fmt::Display for SalePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SalePhase::Pending => "pending",
            SalePhase::Validating => "validating",
            SalePhase::Applying => "applying",
            SalePhase::Committed => "committed",
            SalePhase::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
