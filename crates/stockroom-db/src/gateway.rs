//! # Persistence Gateway
//!
//! Transactional access to product and sale rows for the sale coordinator.
//!
//! ```text
//! SalesGateway::begin() ──► SaleScope ──┬── get_product(id)
//!                                       ├── set_quantity(id, qty, expected_version)
//!                                       ├── insert_sale(new_sale)
//!                                       └── commit() | rollback() | drop → rollback
//! ```
//!
//! The traits exist so tests can wrap the SQLite implementation and inject
//! failures at any step.

use sqlx::{Sqlite, SqlitePool, Transaction};
use std::future::Future;

use crate::error::DbResult;
use crate::repository::{product, sale};
use stockroom_core::{NewSale, Product, Sale};

/// Opens transactional scopes.
pub trait SalesGateway: Send + Sync {
    type Scope: SaleScope;

    /// Starts a new transaction.
    fn begin(&self) -> impl Future<Output = DbResult<Self::Scope>> + Send;
}

/// One open transaction.
///
/// Dropping a scope without calling `commit` rolls it back.
pub trait SaleScope: Send {
    fn get_product(&mut self, id: &str)
        -> impl Future<Output = DbResult<Option<Product>>> + Send;

    /// Conditional write; `Conflict` if the version moved, `NotFound` if the
    /// row is gone.
    fn set_quantity(
        &mut self,
        id: &str,
        new_quantity: i64,
        expected_version: i64,
    ) -> impl Future<Output = DbResult<()>> + Send;

    fn insert_sale(&mut self, new_sale: &NewSale) -> impl Future<Output = DbResult<Sale>> + Send;

    fn commit(self) -> impl Future<Output = DbResult<()>> + Send;

    fn rollback(self) -> impl Future<Output = DbResult<()>> + Send;
}

// =============================================================================
// SQLite implementation
// =============================================================================

/// Gateway backed by the shared SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteGateway {
    pool: SqlitePool,
}

impl SqliteGateway {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteGateway { pool }
    }
}

impl SalesGateway for SqliteGateway {
    type Scope = SqliteScope;

    async fn begin(&self) -> DbResult<SqliteScope> {
        let tx = self.pool.begin().await?;
        Ok(SqliteScope { tx })
    }
}

/// An open SQLite transaction. sqlx rolls it back on drop.
#[derive(Debug)]
pub struct SqliteScope {
    tx: Transaction<'static, Sqlite>,
}

impl SaleScope for SqliteScope {
    async fn get_product(&mut self, id: &str) -> DbResult<Option<Product>> {
        product::fetch_product(&mut self.tx, id).await
    }

    async fn set_quantity(
        &mut self,
        id: &str,
        new_quantity: i64,
        expected_version: i64,
    ) -> DbResult<()> {
        product::update_quantity(&mut self.tx, id, new_quantity, expected_version).await
    }

    async fn insert_sale(&mut self, new_sale: &NewSale) -> DbResult<Sale> {
        sale::insert_sale(&mut self.tx, new_sale).await
    }

    async fn commit(self) -> DbResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> DbResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
