//! # Stock Ledger
//!
//! Authoritative quantity-on-hand for the products touched by one
//! transaction.
//!
//! The ledger remembers the version of every product it reads. A write is
//! only accepted for a product read in the same scope, and only lands if the
//! stored version still matches. Two sales that both read the same stock
//! therefore cannot both write it: the second one gets `DbError::Conflict`,
//! rolls back, and is retried against fresh stock.

use std::collections::HashMap;
use tracing::debug;

use crate::error::{DbError, DbResult, SaleResult};
use crate::gateway::SaleScope;
use stockroom_core::{CoreError, Product};

/// Per-transaction view of stock levels.
#[derive(Debug, Default)]
pub struct StockLedger {
    /// product id → version observed in this scope
    observed: HashMap<String, i64>,
}

impl StockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a product and records its version.
    ///
    /// ## Errors
    /// * `CoreError::ProductNotFound` - no such product
    /// * `DbError` - storage failure
    pub async fn read<S: SaleScope>(&mut self, scope: &mut S, product_id: &str) -> SaleResult<Product> {
        let product = scope
            .get_product(product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

        self.observed.insert(product.id.clone(), product.version);
        Ok(product)
    }

    /// Returns the quantity on hand.
    pub async fn quantity<S: SaleScope>(&mut self, scope: &mut S, product_id: &str) -> SaleResult<i64> {
        Ok(self.read(scope, product_id).await?.quantity)
    }

    /// Writes a new quantity for a product read earlier in this scope.
    ///
    /// ## Errors
    /// * `DbError::Validation` - negative quantity (nothing is written)
    /// * `DbError::Internal` - product was not read through this ledger
    /// * `DbError::Conflict` - another transaction wrote it first
    /// * `DbError::NotFound` - the product disappeared
    pub async fn set_quantity<S: SaleScope>(
        &mut self,
        scope: &mut S,
        product_id: &str,
        new_quantity: i64,
    ) -> DbResult<()> {
        stockroom_core::validation::validate_stock_level(new_quantity)?;

        let expected = *self.observed.get(product_id).ok_or_else(|| {
            DbError::Internal(format!("stock write for {product_id} without a prior read"))
        })?;

        scope.set_quantity(product_id, new_quantity, expected).await?;
        self.observed.insert(product_id.to_string(), expected + 1);

        debug!(product_id = %product_id, new_quantity, version = expected + 1, "Stock written");
        Ok(())
    }

    /// Number of distinct products read in this scope.
    pub fn tracked(&self) -> usize {
        self.observed.len()
    }
}
