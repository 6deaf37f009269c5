//! # Repository Module
//!
//! Database repository implementations for Stockroom.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Caller                                  SaleCoordinator                │
//! │    │ db.products().search("milk", 20)      │ scope.get_product(id)      │
//! │    ▼                                       ▼                            │
//! │  ProductRepository / SaleRepository      SqliteScope (transaction)     │
//! │  (pool, one statement per call)            │                            │
//! │    │                                       │                            │
//! │    └──────────► row helpers in this module ◄┘                           │
//! │                 (take &mut SqliteConnection)                            │
//! │                       │                                                 │
//! │                       ▼                                                 │
//! │                 SQLite Database                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The connection-level helpers are shared so the pool-based repositories
//! and the transactional gateway run the exact same SQL.
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Catalog CRUD, search, stock reports
//! - [`SaleRepository`](sale::SaleRepository) - Sales history and totals

use chrono::{DateTime, SecondsFormat, Utc};

pub mod product;
pub mod sale;

/// Fixed-width RFC 3339 text, so stored timestamps sort chronologically.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
