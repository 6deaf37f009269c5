//! # stockroom-db: Persistence and Sale Transactions for Stockroom
//!
//! This crate owns everything that touches SQLite: the connection pool,
//! migrations, catalog and sales repositories, and the sale coordinator
//! that turns a sale request into one atomic transaction.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockroom Data Flow                              │
//! │                                                                         │
//! │  Caller: process_sale(product, 4, "cashier-1", Some(18.00))            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   stockroom-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │ Coordinator   │    │  Gateway      │    │  Database    │  │   │
//! │  │   │               │    │               │    │  (pool.rs)   │  │   │
//! │  │   │ phases, retry │───►│ SaleScope     │───►│ SqlitePool   │  │   │
//! │  │   │ StockLedger   │    │ (transaction) │    │ migrations   │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  │   Repositories: ProductRepository, SaleRepository              │   │
//! │  │   AlertMonitor: periodic low-stock / expiry scans              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  │   <data dir>/stockroom.db                                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - TOML configuration with environment overrides
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database and sale error types, failure reason codes
//! - [`repository`] - Product catalog and sales history
//! - [`gateway`] - Transactional scope used by the coordinator
//! - [`ledger`] - Version-checked stock reads and writes
//! - [`coordinator`] - Sale, batch, checkout and restock transactions
//! - [`alerts`] - Background low-stock and expiry monitor
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stockroom_db::{Database, DbConfig, StockroomConfig};
//!
//! let config = StockroomConfig::load(None)?;
//! let db = Database::new(DbConfig::from_settings(&config.database)).await?;
//!
//! let coordinator = db.coordinator(config.sales.clone());
//! let sale = coordinator.process_sale(&product_id, 4, "cashier-1", None).await?;
//!
//! let history = coordinator.get_all_sales().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod alerts;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use alerts::{AlertMonitor, AlertMonitorHandle, AlertReport};
pub use config::{ConfigError, StockroomConfig};
pub use coordinator::SaleCoordinator;
pub use error::{DbError, DbResult, FailureKind, SaleError, SaleResult};
pub use gateway::{SaleScope, SalesGateway, SqliteGateway};
pub use ledger::StockLedger;
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::product::ProductRepository;
pub use repository::sale::SaleRepository;
