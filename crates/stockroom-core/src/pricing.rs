//! # Pricing Rules
//!
//! Discount-only pricing: a billed total may be lower than catalog price ×
//! quantity, never higher, and never negative.
//!
//! ```text
//!            0.00                  unit price × quantity
//!              │◄──── accepted billed totals ────►│
//!   ───────────┼──────────────────────────────────┼───────────
//!    rejected  │                                  │  rejected
//! ```
//!
//! A checkout with one discounted payable for several lines is split back
//! onto the lines with [`allocate_payable`].

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::validation::validate_discount_bps;

/// Catalog price × quantity, with overflow reported as a validation error.
///
/// ## Example
/// ```rust
/// use stockroom_core::{pricing::line_subtotal, Money};
///
/// assert_eq!(line_subtotal(Money::from_cents(500), 4).unwrap().cents(), 2000);
/// assert!(line_subtotal(Money::from_cents(i64::MAX), 2).is_err());
/// ```
pub fn line_subtotal(unit_price: Money, quantity: i64) -> CoreResult<Money> {
    unit_price.checked_multiply_quantity(quantity).ok_or_else(|| {
        ValidationError::Overflow {
            field: "line_total".to_string(),
        }
        .into()
    })
}

/// Returns the amount a line is charged.
///
/// - no billed total: catalog price × quantity
/// - billed total in `0..=price × quantity`: the billed total
/// - anything else: `CoreError::BilledTotalOutOfBounds`
pub fn effective_charge(
    unit_price: Money,
    quantity: i64,
    billed_total: Option<Money>,
) -> CoreResult<Money> {
    let max = line_subtotal(unit_price, quantity)?;

    match billed_total {
        None => Ok(max),
        Some(billed) if billed.is_negative() || billed > max => {
            Err(CoreError::BilledTotalOutOfBounds { billed, max })
        }
        Some(billed) => Ok(billed),
    }
}

/// Sums line subtotals, reporting overflow as a validation error.
pub fn checkout_subtotal(line_subtotals: &[Money]) -> CoreResult<Money> {
    line_subtotals
        .iter()
        .try_fold(0i64, |acc, s| acc.checked_add(s.cents()))
        .map(Money::from_cents)
        .ok_or_else(|| {
            ValidationError::Overflow {
                field: "subtotal".to_string(),
            }
            .into()
        })
}

/// Applies a percentage discount (basis points) to a subtotal.
pub fn payable_after_discount(subtotal: Money, discount_bps: u32) -> CoreResult<Money> {
    validate_discount_bps(discount_bps)?;
    Ok(subtotal.apply_percentage_discount(discount_bps))
}

/// Splits one payable amount across lines in proportion to their subtotals.
///
/// Uses largest-remainder apportionment at cent precision: every line gets
/// the floor of its exact share, then the cents left over go one each to the
/// lines with the largest fractional remainders. Ties go to the earlier line.
///
/// The shares always sum to `payable` and no share exceeds its line's
/// subtotal, so every resulting line passes [`effective_charge`].
///
/// ## Example
/// ```rust
/// use stockroom_core::{pricing::allocate_payable, Money};
///
/// // 10.00 payable over three equal 5.00 lines
/// let lines = [Money::from_cents(500); 3];
/// let shares = allocate_payable(&lines, Money::from_cents(1000)).unwrap();
/// let cents: Vec<i64> = shares.iter().map(|m| m.cents()).collect();
/// assert_eq!(cents, vec![334, 333, 333]);
/// ```
pub fn allocate_payable(line_subtotals: &[Money], payable: Money) -> CoreResult<Vec<Money>> {
    if line_subtotals.is_empty() {
        return Err(CoreError::EmptyBatch);
    }
    if line_subtotals.iter().any(|s| s.is_negative()) {
        return Err(ValidationError::OutOfRange {
            field: "line_total".to_string(),
            min: 0,
            max: i64::MAX,
        }
        .into());
    }

    let total: i128 = line_subtotals.iter().map(|s| s.cents() as i128).sum();
    let max = Money::from_cents(i64::try_from(total).map_err(|_| ValidationError::Overflow {
        field: "payable".to_string(),
    })?);

    if payable.is_negative() || payable > max {
        return Err(CoreError::BilledTotalOutOfBounds {
            billed: payable,
            max,
        });
    }
    if total == 0 {
        return Ok(vec![Money::zero(); line_subtotals.len()]);
    }

    let target = payable.cents() as i128;
    let mut shares = Vec::with_capacity(line_subtotals.len());
    let mut remainders = Vec::with_capacity(line_subtotals.len());
    for (index, subtotal) in line_subtotals.iter().enumerate() {
        let exact = subtotal.cents() as i128 * target;
        shares.push(exact / total);
        remainders.push((exact % total, index));
    }

    let assigned: i128 = shares.iter().sum();
    let leftover = (target - assigned) as usize;

    // Largest remainder first, earlier line on ties.
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for &(_, index) in remainders.iter().take(leftover) {
        shares[index] += 1;
    }

    // Each share is bounded by its subtotal, which fits in i64.
    Ok(shares
        .into_iter()
        .map(|cents| Money::from_cents(cents as i64))
        .collect())
}

// =============================================================================
// Unit Tests
// =============================================================================
