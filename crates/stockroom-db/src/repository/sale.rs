//! # Sale Repository
//!
//! Sales history and totals. Sales are written only by the coordinator,
//! through [`insert_sale`] inside its transaction, and are never updated or
//! deleted afterwards.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SaleCoordinator (one transaction)                                      │
//! │     ├── insert_sale()      → row in `sales` (id + created_at assigned) │
//! │     └── ledger decrement   → products.quantity, version + 1            │
//! │                 │                                                       │
//! │              COMMIT                                                     │
//! │                 │                                                       │
//! │                 ▼                                                       │
//! │  SaleRepository (reads only)                                           │
//! │     ├── list_all()         newest first, with product name             │
//! │     ├── list_between()     date range                                  │
//! │     └── total_amount()     Σ total_cents                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use crate::repository::timestamp;
use stockroom_core::{Money, NewSale, Sale, SaleRecord};

const RECORD_QUERY: &str = r#"
    SELECT
        s.id,
        s.product_id,
        p.name AS product_name,
        s.quantity_sold,
        s.total_cents,
        s.user_id,
        s.created_at
    FROM sales s
    JOIN products p ON p.id = s.product_id
"#;

/// Writes one sale row on the given connection and returns it.
pub(crate) async fn insert_sale(conn: &mut SqliteConnection, new_sale: &NewSale) -> DbResult<Sale> {
    let sale = Sale {
        id: Uuid::new_v4().to_string(),
        product_id: new_sale.product_id.clone(),
        quantity_sold: new_sale.quantity_sold,
        total_cents: new_sale.total.cents(),
        user_id: new_sale.user_id.clone(),
        created_at: Utc::now(),
    };

    debug!(id = %sale.id, product_id = %sale.product_id, "Inserting sale");

    sqlx::query(
        r#"
        INSERT INTO sales (id, product_id, quantity_sold, total_cents, user_id, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&sale.id)
    .bind(&sale.product_id)
    .bind(sale.quantity_sold)
    .bind(sale.total_cents)
    .bind(&sale.user_id)
    .bind(timestamp(sale.created_at))
    .execute(&mut *conn)
    .await?;

    Ok(sale)
}

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>(
            r#"
            SELECT id, product_id, quantity_sold, total_cents, user_id, created_at
            FROM sales
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sale)
    }

    /// All sales, newest first, with the product's current name.
    pub async fn list_all(&self) -> DbResult<Vec<SaleRecord>> {
        let sql = format!("{RECORD_QUERY} ORDER BY s.created_at DESC, s.rowid DESC");
        let records = sqlx::query_as::<_, SaleRecord>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    /// Sales with `from <= created_at <= to`, newest first.
    pub async fn list_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<SaleRecord>> {
        let sql = format!(
            "{RECORD_QUERY} WHERE s.created_at BETWEEN ?1 AND ?2 \
             ORDER BY s.created_at DESC, s.rowid DESC"
        );
        let records = sqlx::query_as::<_, SaleRecord>(&sql)
            .bind(timestamp(from))
            .bind(timestamp(to))
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    /// Sales recorded for one product, newest first.
    pub async fn list_for_product(&self, product_id: &str) -> DbResult<Vec<SaleRecord>> {
        let sql = format!(
            "{RECORD_QUERY} WHERE s.product_id = ?1 ORDER BY s.created_at DESC, s.rowid DESC"
        );
        let records = sqlx::query_as::<_, SaleRecord>(&sql)
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    /// Sum of all billed totals.
    pub async fn total_amount(&self) -> DbResult<Money> {
        let cents: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(total_cents), 0) FROM sales")
            .fetch_one(&self.pool)
            .await?;
        Ok(Money::from_cents(cents))
    }

    /// Returns the number of sales.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::pool::{Database, DbConfig};
    use chrono::Duration;
    use stockroom_core::NewProduct;

    async fn setup() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .products()
            .insert(&NewProduct {
                name: "Oat Milk".to_string(),
                category: "Dairy".to_string(),
                quantity: 20,
                price_cents: 300,
                expiry_date: None,
            })
            .await
            .unwrap();
        (db, product.id)
    }

    async fn record(db: &Database, product_id: &str, cents: i64) -> Sale {
        let mut conn = db.pool().acquire().await.unwrap();
        insert_sale(
            &mut conn,
            &NewSale {
                product_id: product_id.to_string(),
                quantity_sold: 1,
                total: Money::from_cents(cents),
                user_id: "clerk-1".to_string(),
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let (db, product_id) = setup().await;
        let sale = record(&db, &product_id, 300).await;

        let fetched = db.sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(fetched.product_id, product_id);
        assert_eq!(fetched.total(), Money::from_cents(300));
        assert_eq!(fetched.user_id, "clerk-1");
    }

    #[tokio::test]
    async fn test_list_all_newest_first_with_names() {
        let (db, product_id) = setup().await;
        let first = record(&db, &product_id, 100).await;
        let second = record(&db, &product_id, 200).await;

        let records = db.sales().list_all().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, second.id);
        assert_eq!(records[1].id, first.id);
        assert!(records.iter().all(|r| r.product_name == "Oat Milk"));
    }

    #[tokio::test]
    async fn test_totals_and_ranges() {
        let (db, product_id) = setup().await;
        assert_eq!(db.sales().total_amount().await.unwrap(), Money::zero());

        record(&db, &product_id, 150).await;
        record(&db, &product_id, 275).await;

        assert_eq!(db.sales().total_amount().await.unwrap(), Money::from_cents(425));
        assert_eq!(db.sales().count().await.unwrap(), 2);

        let now = Utc::now();
        let around = db
            .sales()
            .list_between(now - Duration::hours(1), now + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(around.len(), 2);

        let past = db
            .sales()
            .list_between(now - Duration::days(2), now - Duration::days(1))
            .await
            .unwrap();
        assert!(past.is_empty());

        assert_eq!(db.sales().list_for_product(&product_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sale_for_unknown_product_is_rejected() {
        let (db, _) = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let err = insert_sale(
            &mut conn,
            &NewSale {
                product_id: "nope".to_string(),
                quantity_sold: 1,
                total: Money::zero(),
                user_id: "clerk".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
    }
}
