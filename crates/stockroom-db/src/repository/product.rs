//! # Product Repository
//!
//! Database operations for the product catalog.
//!
//! ## Key Operations
//! - CRUD on descriptive fields (name, category, price, expiry)
//! - Substring search over name and category
//! - Low-stock and near-expiry reports
//!
//! Quantity is written in exactly two places: `insert` (opening stock) and
//! the versioned [`update_quantity`] used by the stock ledger. `update`
//! never touches it.

use chrono::{Days, NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::timestamp;
use stockroom_core::validation::validate_search_query;
use stockroom_core::{NewProduct, Product, ProductUpdate};

const PRODUCT_COLUMNS: &str =
    "id, name, category, quantity, price_cents, expiry_date, version, created_at, updated_at";

// =============================================================================
// Connection-level helpers (shared with the transactional gateway)
// =============================================================================

/// Reads one product on the given connection.
pub(crate) async fn fetch_product(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<Option<Product>> {
    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
    let product = sqlx::query_as::<_, Product>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(product)
}

/// Writes a new quantity if the row still carries `expected_version`.
///
/// ## Outcomes
/// ```text
/// UPDATE ... WHERE id = ? AND version = ?
///      │
///      ├── 1 row  → Ok, version is now expected_version + 1
///      └── 0 rows → row gone?  → DbError::NotFound
///                   otherwise  → DbError::Conflict (someone else wrote)
/// ```
pub(crate) async fn update_quantity(
    conn: &mut SqliteConnection,
    id: &str,
    new_quantity: i64,
    expected_version: i64,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE products SET
            quantity = ?1,
            version = version + 1,
            updated_at = ?2
        WHERE id = ?3 AND version = ?4
        "#,
    )
    .bind(new_quantity)
    .bind(timestamp(Utc::now()))
    .bind(id)
    .bind(expected_version)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 1 {
        return Ok(());
    }

    let exists: Option<i64> = sqlx::query_scalar("SELECT version FROM products WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match exists {
        None => Err(DbError::not_found("Product", id)),
        Some(current) => {
            debug!(product_id = %id, expected_version, current, "Stale product version");
            Err(DbError::conflict("Product", id))
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
/// let milk = repo.insert(&new_product).await?;
/// let dairy = repo.search("dairy", 20).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Inserts a new product with its opening stock.
    pub async fn insert(&self, new_product: &NewProduct) -> DbResult<Product> {
        new_product.validate()?;

        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let stamp = timestamp(now);

        debug!(id = %id, name = %new_product.name, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, category, quantity, price_cents, expiry_date,
                version, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?7)
            "#,
        )
        .bind(&id)
        .bind(new_product.name.trim())
        .bind(new_product.category.trim())
        .bind(new_product.quantity)
        .bind(new_product.price_cents)
        .bind(new_product.expiry_date)
        .bind(&stamp)
        .execute(&self.pool)
        .await?;

        self.get_by_id(&id)
            .await?
            .ok_or_else(|| DbError::Internal(format!("product {id} vanished after insert")))
    }

    /// Gets a product by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        fetch_product(&mut conn, id).await
    }

    /// Lists every product, ordered by name.
    pub async fn list_all(&self) -> DbResult<Vec<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY name, id");
        let products = sqlx::query_as::<_, Product>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(products)
    }

    /// Searches name and category for a case-insensitive substring.
    ///
    /// An empty query returns the first `limit` products by name.
    pub async fn search(&self, query: &str, limit: u32) -> DbResult<Vec<Product>> {
        let query = validate_search_query(query)?;

        debug!(query = %query, limit, "Searching products");

        let pattern = format!("%{}%", escape_like(&query));
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE name LIKE ?1 ESCAPE '\\' OR category LIKE ?1 ESCAPE '\\' \
             ORDER BY name, id LIMIT ?2"
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(pattern)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        debug!(count = products.len(), "Search returned products");
        Ok(products)
    }

    /// Updates descriptive fields. Quantity and version are left alone.
    pub async fn update(&self, id: &str, changes: &ProductUpdate) -> DbResult<Product> {
        changes.validate()?;

        let result = sqlx::query(
            r#"
            UPDATE products SET
                name = ?1,
                category = ?2,
                price_cents = ?3,
                expiry_date = ?4,
                updated_at = ?5
            WHERE id = ?6
            "#,
        )
        .bind(changes.name.trim())
        .bind(changes.category.trim())
        .bind(changes.price_cents)
        .bind(changes.expiry_date)
        .bind(timestamp(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Deletes a product that no sale references.
    ///
    /// ## Errors
    /// * `DbError::InUse` - at least one sale points at the product
    /// * `DbError::NotFound` - no such product
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DbError::from)
            .map_err(|e| match e {
                DbError::ForeignKeyViolation { .. } => DbError::InUse {
                    entity: "Product".to_string(),
                    id: id.to_string(),
                },
                other => other,
            })?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        debug!(product_id = %id, "Product deleted");
        Ok(())
    }

    /// Products with `quantity <= threshold`, lowest stock first.
    pub async fn low_stock(&self, threshold: i64) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE quantity <= ?1 ORDER BY quantity, name"
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(threshold)
            .fetch_all(&self.pool)
            .await?;
        Ok(products)
    }

    /// Products expiring on or before `today + days`, soonest first.
    /// Already-expired products are included.
    pub async fn near_expiry(&self, today: NaiveDate, days: u32) -> DbResult<Vec<Product>> {
        let horizon = today
            .checked_add_days(Days::new(u64::from(days)))
            .unwrap_or(NaiveDate::MAX);
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE expiry_date IS NOT NULL AND expiry_date <= ?1 \
             ORDER BY expiry_date, name"
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(horizon)
            .fetch_all(&self.pool)
            .await?;
        Ok(products)
    }

    /// Returns the number of products.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// Escapes LIKE wildcards so user input matches literally.
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use stockroom_core::{Money, NewSale};

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn new_product(name: &str, category: &str, quantity: i64) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            category: category.to_string(),
            quantity,
            price_cents: 250,
            expiry_date: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = setup().await;
        let repo = db.products();

        let created = repo.insert(&new_product("Rye Bread", "Bakery", 12)).await.unwrap();
        assert_eq!(created.version, 0);
        assert_eq!(created.quantity, 12);

        let fetched = repo.get_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert!(repo.get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_rejects_invalid_input() {
        let db = setup().await;
        let err = db
            .products()
            .insert(&new_product("", "Bakery", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));

        let err = db
            .products()
            .insert(&new_product("Bagel", "Bakery", -1))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
        assert_eq!(db.products().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_by_name_and_category() {
        let db = setup().await;
        let repo = db.products();
        repo.insert(&new_product("Whole Milk", "Dairy", 5)).await.unwrap();
        repo.insert(&new_product("Cheddar", "Dairy", 5)).await.unwrap();
        repo.insert(&new_product("Baguette", "Bakery", 5)).await.unwrap();
        repo.insert(&new_product("100% Juice", "Drinks", 5)).await.unwrap();

        let dairy = repo.search("dairy", 10).await.unwrap();
        assert_eq!(dairy.len(), 2);

        let milk = repo.search("MILK", 10).await.unwrap();
        assert_eq!(milk.len(), 1);
        assert_eq!(milk[0].name, "Whole Milk");

        // wildcard characters are literal
        let percent = repo.search("%", 10).await.unwrap();
        assert_eq!(percent.len(), 1);

        let everything = repo.search("", 3).await.unwrap();
        assert_eq!(everything.len(), 3);
    }

    #[tokio::test]
    async fn test_update_leaves_quantity_alone() {
        let db = setup().await;
        let repo = db.products();
        let created = repo.insert(&new_product("Butter", "Dairy", 7)).await.unwrap();

        let updated = repo
            .update(
                &created.id,
                &ProductUpdate {
                    name: "Salted Butter".to_string(),
                    category: "Dairy".to_string(),
                    price_cents: 399,
                    expiry_date: NaiveDate::from_ymd_opt(2030, 1, 1),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Salted Butter");
        assert_eq!(updated.price(), Money::from_cents(399));
        assert_eq!(updated.quantity, 7);
        assert_eq!(updated.version, created.version);

        let missing = repo
            .update(
                "missing",
                &ProductUpdate {
                    name: "x".to_string(),
                    category: "y".to_string(),
                    price_cents: 1,
                    expiry_date: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(missing, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_versioned_quantity_update() {
        let db = setup().await;
        let created = db
            .products()
            .insert(&new_product("Eggs", "Dairy", 12))
            .await
            .unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        update_quantity(&mut conn, &created.id, 10, 0).await.unwrap();

        let stale = update_quantity(&mut conn, &created.id, 8, 0).await.unwrap_err();
        assert!(matches!(stale, DbError::Conflict { .. }));

        let gone = update_quantity(&mut conn, "missing", 8, 0).await.unwrap_err();
        assert!(matches!(gone, DbError::NotFound { .. }));

        let negative = update_quantity(&mut conn, &created.id, -1, 1).await.unwrap_err();
        assert!(matches!(negative, DbError::CheckViolation { .. }));
        drop(conn);

        let after = db.products().get_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(after.quantity, 10);
        assert_eq!(after.version, 1);
    }

    #[tokio::test]
    async fn test_delete_refuses_products_with_sales() {
        let db = setup().await;
        let repo = db.products();
        let sold = repo.insert(&new_product("Jam", "Pantry", 3)).await.unwrap();
        let unsold = repo.insert(&new_product("Honey", "Pantry", 3)).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        crate::repository::sale::insert_sale(
            &mut conn,
            &NewSale {
                product_id: sold.id.clone(),
                quantity_sold: 1,
                total: Money::from_cents(250),
                user_id: "clerk".to_string(),
            },
        )
        .await
        .unwrap();
        drop(conn);

        let err = repo.delete(&sold.id).await.unwrap_err();
        assert!(matches!(err, DbError::InUse { .. }));

        repo.delete(&unsold.id).await.unwrap();
        assert!(matches!(
            repo.delete(&unsold.id).await.unwrap_err(),
            DbError::NotFound { .. }
        ));
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_low_stock_and_near_expiry_reports() {
        let db = setup().await;
        let repo = db.products();
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        let mut expired = new_product("Old Yoghurt", "Dairy", 50);
        expired.expiry_date = NaiveDate::from_ymd_opt(2024, 5, 30);
        let mut soon = new_product("Fresh Cream", "Dairy", 50);
        soon.expiry_date = NaiveDate::from_ymd_opt(2024, 6, 5);
        let mut later = new_product("Hard Cheese", "Dairy", 50);
        later.expiry_date = NaiveDate::from_ymd_opt(2024, 9, 1);

        repo.insert(&expired).await.unwrap();
        repo.insert(&soon).await.unwrap();
        repo.insert(&later).await.unwrap();
        repo.insert(&new_product("Salt", "Pantry", 10)).await.unwrap();
        repo.insert(&new_product("Pepper", "Pantry", 2)).await.unwrap();

        let low: Vec<String> = repo
            .low_stock(10)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(low, vec!["Pepper", "Salt"]);

        let expiring: Vec<String> = repo
            .near_expiry(today, 7)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(expiring, vec!["Old Yoghurt", "Fresh Cream"]);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("milk"), "milk");
    }
}
