//! # stockroom-core: Pure Business Logic for Stockroom
//!
//! This crate holds the rules of the sale transaction core as pure
//! functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockroom Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            Caller (UI, CLI, service - not in this repo)         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ process_sale / process_sale_batch     │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │   stockroom-db: SaleCoordinator ─► StockLedger ─► SQLite         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ uses                                   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ stockroom-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐  ┌─────────┐  ┌─────────┐  ┌──────────┐ ┌──────┐ │   │
//! │  │   │  types  │  │  money  │  │ pricing │  │validation│ │alerts│ │   │
//! │  │   │ Product │  │  Money  │  │ bounds  │  │  rules   │ │ scan │ │   │
//! │  │   │  Sale   │  │ (cents) │  │ split   │  │  checks  │ │      │ │   │
//! │  │   └─────────┘  └─────────┘  └─────────┘  └──────────┘ └──────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Sale, SaleLine, SalePhase)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`pricing`] - Discount-only pricing bounds and blended-total allocation
//! - [`validation`] - Input validation
//! - [`alerts`] - Low-stock and expiry classification
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use stockroom_core::money::Money;
//! use stockroom_core::pricing::effective_charge;
//!
//! let unit_price = Money::from_cents(500); // 5.00
//!
//! // A discount is fine...
//! let charge = effective_charge(unit_price, 4, Some(Money::from_cents(1800))).unwrap();
//! assert_eq!(charge.cents(), 1800);
//!
//! // ...a markup is not.
//! assert!(effective_charge(unit_price, 4, Some(Money::from_cents(2100))).is_err());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod alerts;
pub mod error;
pub mod money;
pub mod pricing;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Quantity at or below which a product is reported as low stock.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 10;

/// Days ahead of expiry at which a product is reported as expiring soon.
pub const DEFAULT_EXPIRY_WINDOW_DAYS: i64 = 7;

/// Maximum length of a product name.
pub const MAX_PRODUCT_NAME_LEN: usize = 200;

/// Maximum length of a category label.
pub const MAX_CATEGORY_LEN: usize = 100;
