//! # Stock Alerts
//!
//! Classifies products that need attention. Pure: the caller supplies the
//! products and today's date.
//!
//! | Alert          | Condition                         |
//! |----------------|-----------------------------------|
//! | `LowStock`     | `quantity <= low_stock_threshold` |
//! | `Expired`      | `expiry < today`                  |
//! | `ExpiringSoon` | `today <= expiry < today + window`|
//!
//! A product may raise a stock alert and an expiry alert at the same time.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::types::Product;
use crate::{DEFAULT_EXPIRY_WINDOW_DAYS, DEFAULT_LOW_STOCK_THRESHOLD};

/// Limits used when classifying products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertThresholds {
    pub low_stock_threshold: i64,
    pub expiry_window_days: i64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        AlertThresholds {
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
            expiry_window_days: DEFAULT_EXPIRY_WINDOW_DAYS,
        }
    }
}

/// One reason a product needs attention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StockAlert {
    LowStock {
        product_id: String,
        name: String,
        quantity: i64,
    },
    Expired {
        product_id: String,
        name: String,
        expiry_date: NaiveDate,
    },
    ExpiringSoon {
        product_id: String,
        name: String,
        expiry_date: NaiveDate,
        days_left: i64,
    },
}

impl StockAlert {
    pub fn product_id(&self) -> &str {
        match self {
            StockAlert::LowStock { product_id, .. }
            | StockAlert::Expired { product_id, .. }
            | StockAlert::ExpiringSoon { product_id, .. } => product_id,
        }
    }
}

/// Returns the stock alert for a product, if any.
pub fn classify_stock(product: &Product, thresholds: &AlertThresholds) -> Option<StockAlert> {
    (product.quantity <= thresholds.low_stock_threshold).then(|| StockAlert::LowStock {
        product_id: product.id.clone(),
        name: product.name.clone(),
        quantity: product.quantity,
    })
}

/// Returns the expiry alert for a product, if any.
pub fn classify_expiry(
    product: &Product,
    today: NaiveDate,
    thresholds: &AlertThresholds,
) -> Option<StockAlert> {
    let expiry = product.expiry_date?;

    if expiry < today {
        return Some(StockAlert::Expired {
            product_id: product.id.clone(),
            name: product.name.clone(),
            expiry_date: expiry,
        });
    }

    let window = u64::try_from(thresholds.expiry_window_days).unwrap_or(0);
    let horizon = today.checked_add_days(Days::new(window))?;
    (expiry < horizon).then(|| StockAlert::ExpiringSoon {
        product_id: product.id.clone(),
        name: product.name.clone(),
        expiry_date: expiry,
        days_left: (expiry - today).num_days(),
    })
}

/// Classifies every product, stock alerts and expiry alerts in product order.
///
/// ## Example
/// ```rust
/// use chrono::{NaiveDate, Utc};
/// use stockroom_core::alerts::{scan, AlertThresholds, StockAlert};
/// use stockroom_core::Product;
///
/// let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
/// let yoghurt = Product {
///     id: "p-1".into(),
///     name: "Yoghurt".into(),
///     category: "Dairy".into(),
///     quantity: 40,
///     price_cents: 99,
///     expiry_date: NaiveDate::from_ymd_opt(2024, 5, 3),
///     version: 0,
///     created_at: Utc::now(),
///     updated_at: Utc::now(),
/// };
///
/// let alerts = scan(&[yoghurt], today, &AlertThresholds::default());
/// assert!(matches!(alerts[0], StockAlert::ExpiringSoon { days_left: 2, .. }));
/// ```
pub fn scan(products: &[Product], today: NaiveDate, thresholds: &AlertThresholds) -> Vec<StockAlert> {
    products
        .iter()
        .flat_map(|p| {
            classify_stock(p, thresholds)
                .into_iter()
                .chain(classify_expiry(p, today, thresholds))
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
