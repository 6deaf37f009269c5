//! # Sale Transaction Coordinator
//!
//! Turns a sale request into one all-or-nothing unit of work.
//!
//! ## Flow of One Attempt
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  PENDING      request shape checked (no transaction yet)               │
//! │     │                                                                   │
//! │     ▼ begin()                                                           │
//! │  VALIDATING   ledger reads each product once (records version)         │
//! │     │         aggregated demand <= quantity on hand                    │
//! │     │         every line priced (discount-only bound)                  │
//! │     ▼                                                                   │
//! │  APPLYING     for each line: insert sale, decrement remaining,         │
//! │     │         versioned stock write                                    │
//! │     ▼                                                                   │
//! │  COMMITTED    commit()                                                 │
//! │                                                                         │
//! │  any error in VALIDATING / APPLYING → rollback() → ABORTED             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Retries
//! Begin and the transaction body run under `transaction_timeout`; commit
//! and rollback are never cut short. A stale version
//! (`DbError::Conflict`) or a SQLite lock (`DbError::Busy`) aborts the
//! attempt and the whole transaction runs again after an exponential
//! backoff, up to `max_attempts`. The retry re-reads stock, so a sale that
//! lost the race sees the new quantity and fails with insufficient stock
//! instead of overselling.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use tracing::{debug, error, info, warn};

use crate::config::SaleSettings;
use crate::error::{DbError, FailureKind, SaleError, SaleResult};
use crate::gateway::{SaleScope, SalesGateway, SqliteGateway};
use crate::ledger::StockLedger;
use crate::repository::sale::SaleRepository;
use stockroom_core::pricing::{
    allocate_payable, checkout_subtotal, effective_charge, line_subtotal, payable_after_discount,
};
use stockroom_core::validation::{
    validate_discount_bps, validate_product_id, validate_quantity, validate_sale_lines,
    validate_user_id,
};
use stockroom_core::{
    CoreError, CoreResult, Money, NewSale, Product, Sale, SaleLine, SalePhase, SaleRecord,
    ValidationError,
};

// =============================================================================
// Phase tracking
// =============================================================================

/// Logs the state machine of one attempt.
#[derive(Debug)]
struct PhaseTracker {
    operation: &'static str,
    phase: SalePhase,
}

impl PhaseTracker {
    fn new(operation: &'static str) -> Self {
        PhaseTracker {
            operation,
            phase: SalePhase::Pending,
        }
    }

    /// A tracker for an attempt whose scope has just been opened.
    fn validating(operation: &'static str) -> Self {
        let mut tracker = PhaseTracker::new(operation);
        tracker.advance(SalePhase::Validating);
        tracker
    }

    fn advance(&mut self, next: SalePhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal sale phase transition {} -> {}",
            self.phase,
            next
        );
        debug!(operation = self.operation, from = %self.phase, to = %next, "Sale phase");
        self.phase = next;
    }

    fn abort(&mut self) {
        if matches!(self.phase, SalePhase::Validating | SalePhase::Applying) {
            self.advance(SalePhase::Aborted);
        }
    }
}

/// What a transaction body hands back for commit or rollback.
type Attempt<S, T> = (S, PhaseTracker, SaleResult<T>);

/// How billed totals are decided for a batch.
#[derive(Debug, Clone, Copy)]
enum Billing {
    /// Each line carries its own optional billed total.
    PerLine,
    /// One payable split across lines by subtotal.
    Payable(Money),
    /// A percentage discount on the checkout subtotal, then split.
    Discount(u32),
}

// =============================================================================
// Coordinator
// =============================================================================

/// Entry point for sales, batches, checkouts and restocks.
///
/// ## Usage
/// ```rust,ignore
/// let coordinator = db.coordinator(config.sales.clone());
///
/// // 4 units at a negotiated 18.00
/// let sale = coordinator
///     .process_sale(&milk.id, 4, "cashier-1", Some(Money::from_cents(1800)))
///     .await?;
///
/// // several lines, one transaction
/// let sales = coordinator
///     .process_sale_batch(&[SaleLine::new(&milk.id, 3), SaleLine::new(&bread.id, 1)], "cashier-1")
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct SaleCoordinator<G = SqliteGateway> {
    gateway: G,
    reports: SaleRepository,
    settings: SaleSettings,
}

impl<G: SalesGateway> SaleCoordinator<G> {
    pub fn new(gateway: G, reports: SaleRepository, settings: SaleSettings) -> Self {
        SaleCoordinator {
            gateway,
            reports,
            settings,
        }
    }

    pub fn settings(&self) -> &SaleSettings {
        &self.settings
    }

    /// Sells `quantity` units of one product.
    ///
    /// `billed_total` is the negotiated charge for the whole line; `None`
    /// charges catalog price × quantity.
    pub async fn process_sale(
        &self,
        product_id: &str,
        quantity: i64,
        user_id: &str,
        billed_total: Option<Money>,
    ) -> SaleResult<Sale> {
        validate_product_id(product_id).map_err(CoreError::from)?;
        validate_quantity(quantity).map_err(CoreError::from)?;
        validate_user_id(user_id).map_err(CoreError::from)?;

        let sale = self
            .run_with_retry("sale", move |mut scope| async move {
                let mut phases = PhaseTracker::validating("sale");
                let outcome = apply_single(
                    &mut scope,
                    &mut phases,
                    product_id,
                    quantity,
                    user_id,
                    billed_total,
                )
                .await;
                (scope, phases, outcome)
            })
            .await?;

        info!(
            sale_id = %sale.id,
            product_id = %sale.product_id,
            quantity = sale.quantity_sold,
            total = %sale.total(),
            "Sale committed"
        );
        Ok(sale)
    }

    /// Sells several lines in one transaction.
    ///
    /// Lines for the same product are checked against stock jointly: two
    /// lines of 3 and 4 against 5 on hand fail as a whole.
    pub async fn process_sale_batch(
        &self,
        lines: &[SaleLine],
        user_id: &str,
    ) -> SaleResult<Vec<Sale>> {
        self.run_batch("batch", lines, user_id, Billing::PerLine).await
    }

    /// Sells several lines for one discounted payable.
    ///
    /// Lines must not carry their own billed totals. Each line's share of
    /// `payable` is proportional to its catalog subtotal, priced from the
    /// products read inside the transaction.
    pub async fn process_checkout(
        &self,
        lines: &[SaleLine],
        payable: Money,
        user_id: &str,
    ) -> SaleResult<Vec<Sale>> {
        self.run_batch("checkout", lines, user_id, Billing::Payable(payable))
            .await
    }

    /// Like [`process_checkout`](Self::process_checkout), with the payable
    /// derived from a percentage discount (basis points) on the subtotal.
    pub async fn process_discounted_checkout(
        &self,
        lines: &[SaleLine],
        discount_bps: u32,
        user_id: &str,
    ) -> SaleResult<Vec<Sale>> {
        validate_discount_bps(discount_bps).map_err(CoreError::from)?;
        self.run_batch("checkout", lines, user_id, Billing::Discount(discount_bps))
            .await
    }

    /// Adds stock. Returns the new quantity on hand.
    pub async fn restock(&self, product_id: &str, quantity: i64) -> SaleResult<i64> {
        validate_product_id(product_id).map_err(CoreError::from)?;
        validate_quantity(quantity).map_err(CoreError::from)?;

        let new_quantity = self
            .run_with_retry("restock", move |mut scope| async move {
                let mut phases = PhaseTracker::validating("restock");
                let outcome = apply_restock(&mut scope, &mut phases, product_id, quantity).await;
                (scope, phases, outcome)
            })
            .await?;

        info!(product_id = %product_id, added = quantity, new_quantity, "Restock committed");
        Ok(new_quantity)
    }

    /// All recorded sales, newest first.
    pub async fn get_all_sales(&self) -> SaleResult<Vec<SaleRecord>> {
        Ok(self.reports.list_all().await?)
    }

    /// Sum of all billed totals.
    pub async fn get_total_sales_amount(&self) -> SaleResult<Money> {
        Ok(self.reports.total_amount().await?)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn run_batch(
        &self,
        operation: &'static str,
        lines: &[SaleLine],
        user_id: &str,
        billing: Billing,
    ) -> SaleResult<Vec<Sale>> {
        if lines.is_empty() {
            return Err(CoreError::EmptyBatch.into());
        }
        validate_sale_lines(lines).map_err(CoreError::from)?;
        validate_user_id(user_id).map_err(CoreError::from)?;

        if !matches!(billing, Billing::PerLine) {
            if let Some(index) = lines.iter().position(|l| l.billed_total.is_some()) {
                return Err(CoreError::from(ValidationError::NotAllowed {
                    field: format!("lines[{index}]"),
                    reason: "checkout lines are billed from the checkout payable".to_string(),
                })
                .into());
            }
        }

        let demand = aggregate_demand(lines)?;
        let demand = &demand;

        let sales = self
            .run_with_retry(operation, move |mut scope| async move {
                let mut phases = PhaseTracker::validating(operation);
                let outcome =
                    apply_batch(&mut scope, &mut phases, lines, user_id, demand, billing).await;
                (scope, phases, outcome)
            })
            .await?;

        let total: Money = sales.iter().map(Sale::total).sum();
        info!(
            operation,
            lines = sales.len(),
            products = demand.len(),
            total = %total,
            "Batch committed"
        );
        Ok(sales)
    }

    /// Runs `body` in fresh transactions until it succeeds, fails for good,
    /// or runs out of tries.
    async fn run_with_retry<T, F, Fut>(&self, operation: &'static str, mut body: F) -> SaleResult<T>
    where
        F: FnMut(G::Scope) -> Fut,
        Fut: Future<Output = Attempt<G::Scope, T>>,
    {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut backoff = self.create_backoff();
        let mut attempt_no: u32 = 1;

        loop {
            match self.attempt(operation, &mut body).await {
                Err(err) if err.is_retryable() && attempt_no < max_attempts => {
                    let delay = backoff
                        .next_backoff()
                        .unwrap_or_else(|| self.settings.max_backoff());
                    warn!(
                        operation,
                        attempt = attempt_no,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying after concurrent update"
                    );
                    tokio::time::sleep(delay).await;
                    attempt_no += 1;
                }
                Err(err) => {
                    if err.kind() == FailureKind::StorageFault {
                        error!(operation, attempt = attempt_no, error = %err, "Sale failed");
                    } else {
                        debug!(operation, error = %err, "Sale rejected");
                    }
                    return Err(err);
                }
                Ok(value) => return Ok(value),
            }
        }
    }

    /// One attempt.
    ///
    /// The deadline covers begin and the transaction body only. Commit or
    /// rollback always runs to completion, so a timeout is only ever
    /// reported for work that was not committed.
    async fn attempt<T, F, Fut>(&self, operation: &'static str, body: &mut F) -> SaleResult<T>
    where
        F: FnMut(G::Scope) -> Fut,
        Fut: Future<Output = Attempt<G::Scope, T>>,
    {
        let timeout = self.settings.transaction_timeout();
        let work = async {
            let scope = self.gateway.begin().await?;
            Ok::<_, DbError>(body(scope).await)
        };

        match tokio::time::timeout(timeout, work).await {
            Ok(Ok((scope, mut phases, outcome))) => finish(scope, &mut phases, outcome).await,
            Ok(Err(err)) => Err(err.into()),
            // The body future owned the scope; dropping it rolled back.
            Err(_) => {
                error!(operation, ?timeout, "Transaction timed out");
                Err(DbError::Timeout {
                    after_ms: timeout.as_millis() as u64,
                }
                .into())
            }
        }
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.settings.initial_backoff(),
            max_interval: self.settings.max_backoff(),
            multiplier: 2.0,
            // attempts are bounded by max_attempts instead
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

// =============================================================================
// Transaction bodies
// =============================================================================

fn insufficient(product: &Product, requested: i64) -> SaleError {
    CoreError::InsufficientStock {
        product_id: product.id.clone(),
        available: product.quantity,
        requested,
    }
    .into()
}

/// Total requested quantity per distinct product.
fn aggregate_demand(lines: &[SaleLine]) -> CoreResult<BTreeMap<String, i64>> {
    let mut demand: BTreeMap<String, i64> = BTreeMap::new();
    for line in lines {
        let entry = demand.entry(line.product_id.clone()).or_insert(0);
        *entry = entry.checked_add(line.quantity).ok_or_else(|| {
            CoreError::from(ValidationError::Overflow {
                field: "quantity".to_string(),
            })
        })?;
    }
    Ok(demand)
}

fn product_for<'a>(products: &'a HashMap<&str, Product>, line: &SaleLine) -> SaleResult<&'a Product> {
    products
        .get(line.product_id.as_str())
        .ok_or_else(|| CoreError::ProductNotFound(line.product_id.clone()).into())
}

/// Catalog price × quantity per line, from prices read in this scope.
fn catalog_subtotals(products: &HashMap<&str, Product>, lines: &[SaleLine]) -> SaleResult<Vec<Money>> {
    lines
        .iter()
        .map(|line| -> SaleResult<Money> {
            Ok(line_subtotal(product_for(products, line)?.price(), line.quantity)?)
        })
        .collect()
}

async fn apply_single<S: SaleScope>(
    scope: &mut S,
    phases: &mut PhaseTracker,
    product_id: &str,
    quantity: i64,
    user_id: &str,
    billed_total: Option<Money>,
) -> SaleResult<Sale> {
    let mut ledger = StockLedger::new();
    let product = ledger.read(scope, product_id).await?;

    if !product.has_stock(quantity) {
        return Err(insufficient(&product, quantity));
    }
    let charge = effective_charge(product.price(), quantity, billed_total)?;

    phases.advance(SalePhase::Applying);

    let sale = scope
        .insert_sale(&NewSale {
            product_id: product.id.clone(),
            quantity_sold: quantity,
            total: charge,
            user_id: user_id.to_string(),
        })
        .await?;
    ledger
        .set_quantity(scope, &product.id, product.quantity - quantity)
        .await?;

    Ok(sale)
}

async fn apply_batch<S: SaleScope>(
    scope: &mut S,
    phases: &mut PhaseTracker,
    lines: &[SaleLine],
    user_id: &str,
    demand: &BTreeMap<String, i64>,
    billing: Billing,
) -> SaleResult<Vec<Sale>> {
    let mut ledger = StockLedger::new();
    let mut products: HashMap<&str, Product> = HashMap::with_capacity(demand.len());
    let mut remaining: HashMap<&str, i64> = HashMap::with_capacity(demand.len());

    for (product_id, &requested) in demand {
        let product = ledger.read(scope, product_id).await?;
        if !product.has_stock(requested) {
            return Err(insufficient(&product, requested));
        }
        remaining.insert(product_id.as_str(), product.quantity);
        products.insert(product_id.as_str(), product);
    }

    // Price every line before the first write.
    let charges: Vec<Money> = match billing {
        Billing::PerLine => lines
            .iter()
            .map(|line| -> SaleResult<Money> {
                let product = product_for(&products, line)?;
                Ok(effective_charge(product.price(), line.quantity, line.billed_total)?)
            })
            .collect::<SaleResult<Vec<Money>>>()?,
        Billing::Payable(payable) => {
            allocate_payable(&catalog_subtotals(&products, lines)?, payable)?
        }
        Billing::Discount(bps) => {
            let subtotals = catalog_subtotals(&products, lines)?;
            let payable = payable_after_discount(checkout_subtotal(&subtotals)?, bps)?;
            allocate_payable(&subtotals, payable)?
        }
    };

    phases.advance(SalePhase::Applying);

    let mut sales = Vec::with_capacity(lines.len());
    for (line, charge) in lines.iter().zip(charges) {
        let sale = scope
            .insert_sale(&NewSale {
                product_id: line.product_id.clone(),
                quantity_sold: line.quantity,
                total: charge,
                user_id: user_id.to_string(),
            })
            .await?;

        let left = remaining
            .get_mut(line.product_id.as_str())
            .ok_or_else(|| CoreError::ProductNotFound(line.product_id.clone()))?;
        *left -= line.quantity;
        if *left < 0 {
            let product = product_for(&products, line)?;
            return Err(insufficient(product, demand[&line.product_id]));
        }
        ledger.set_quantity(scope, &line.product_id, *left).await?;

        sales.push(sale);
    }

    Ok(sales)
}

async fn apply_restock<S: SaleScope>(
    scope: &mut S,
    phases: &mut PhaseTracker,
    product_id: &str,
    quantity: i64,
) -> SaleResult<i64> {
    let mut ledger = StockLedger::new();
    let on_hand = ledger.quantity(scope, product_id).await?;
    let new_quantity = on_hand.checked_add(quantity).ok_or_else(|| {
        CoreError::from(ValidationError::Overflow {
            field: "quantity".to_string(),
        })
    })?;

    phases.advance(SalePhase::Applying);
    ledger.set_quantity(scope, product_id, new_quantity).await?;

    Ok(new_quantity)
}

/// Commits on success, rolls back on failure. The scope is always consumed.
async fn finish<S: SaleScope, T>(
    scope: S,
    phases: &mut PhaseTracker,
    outcome: SaleResult<T>,
) -> SaleResult<T> {
    match outcome {
        Ok(value) => match scope.commit().await {
            Ok(()) => {
                phases.advance(SalePhase::Committed);
                Ok(value)
            }
            Err(err) => {
                // the failed transaction was dropped, which rolls it back
                phases.abort();
                warn!(operation = phases.operation, error = %err, "Commit failed");
                Err(err.into())
            }
        },
        Err(original) => {
            phases.abort();
            match scope.rollback().await {
                Ok(()) => Err(original),
                Err(source) => {
                    error!(
                        operation = phases.operation,
                        error = %original,
                        rollback_error = %source,
                        "Rollback failed"
                    );
                    Err(SaleError::RollbackFailed {
                        original: Box::new(original),
                        source,
                    })
                }
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::SqliteScope;
    use crate::pool::{Database, DbConfig};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use stockroom_core::NewProduct;

    fn fast_settings() -> SaleSettings {
        SaleSettings {
            max_attempts: 5,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            transaction_timeout_secs: 5,
        }
    }

    async fn add_product(db: &Database, name: &str, quantity: i64, price_cents: i64) -> Product {
        db.products()
            .insert(&NewProduct {
                name: name.to_string(),
                category: "Grocery".to_string(),
                quantity,
                price_cents,
                expiry_date: None,
            })
            .await
            .unwrap()
    }

    async fn quantity_of(db: &Database, id: &str) -> i64 {
        db.products().get_by_id(id).await.unwrap().unwrap().quantity
    }

    async fn setup() -> (Database, SaleCoordinator) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let coordinator = db.coordinator(fast_settings());
        (db, coordinator)
    }

    // -------------------------------------------------------------------------
    // Fault injection
    // -------------------------------------------------------------------------

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Fault {
        None,
        InsertSale,
        SetQuantity,
        Rollback,
    }

    /// Wraps the SQLite gateway and fails on demand.
    #[derive(Debug, Clone)]
    struct FaultyGateway {
        inner: SqliteGateway,
        fault: Fault,
        /// stock writes still to be turned into conflicts
        conflicts: Arc<AtomicU32>,
        read_delay: Option<Duration>,
        /// delay after a successful commit, before it is acknowledged
        commit_delay: Option<Duration>,
    }

    impl FaultyGateway {
        fn new(db: &Database, fault: Fault) -> Self {
            FaultyGateway {
                inner: db.gateway(),
                fault,
                conflicts: Arc::new(AtomicU32::new(0)),
                read_delay: None,
                commit_delay: None,
            }
        }

        fn with_conflicts(self, count: u32) -> Self {
            self.conflicts.store(count, Ordering::SeqCst);
            self
        }

        fn with_read_delay(mut self, delay: Duration) -> Self {
            self.read_delay = Some(delay);
            self
        }

        fn with_commit_delay(mut self, delay: Duration) -> Self {
            self.commit_delay = Some(delay);
            self
        }
    }

    struct FaultyScope {
        inner: SqliteScope,
        fault: Fault,
        conflicts: Arc<AtomicU32>,
        read_delay: Option<Duration>,
        commit_delay: Option<Duration>,
    }

    impl SalesGateway for FaultyGateway {
        type Scope = FaultyScope;

        async fn begin(&self) -> crate::error::DbResult<FaultyScope> {
            Ok(FaultyScope {
                inner: self.inner.begin().await?,
                fault: self.fault,
                conflicts: self.conflicts.clone(),
                read_delay: self.read_delay,
                commit_delay: self.commit_delay,
            })
        }
    }

    fn injected() -> DbError {
        DbError::QueryFailed("injected fault".to_string())
    }

    impl SaleScope for FaultyScope {
        async fn get_product(&mut self, id: &str) -> crate::error::DbResult<Option<Product>> {
            if let Some(delay) = self.read_delay {
                tokio::time::sleep(delay).await;
            }
            self.inner.get_product(id).await
        }

        async fn set_quantity(
            &mut self,
            id: &str,
            new_quantity: i64,
            expected_version: i64,
        ) -> crate::error::DbResult<()> {
            if self.fault == Fault::SetQuantity {
                return Err(injected());
            }
            let take_conflict = self
                .conflicts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if take_conflict {
                return Err(DbError::conflict("product", id));
            }
            self.inner.set_quantity(id, new_quantity, expected_version).await
        }

        async fn insert_sale(&mut self, new_sale: &NewSale) -> crate::error::DbResult<Sale> {
            if self.fault == Fault::InsertSale {
                return Err(injected());
            }
            self.inner.insert_sale(new_sale).await
        }

        async fn commit(self) -> crate::error::DbResult<()> {
            self.inner.commit().await?;
            if let Some(delay) = self.commit_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(())
        }

        async fn rollback(self) -> crate::error::DbResult<()> {
            if self.fault == Fault::Rollback {
                // inner scope is dropped here, which still rolls it back
                return Err(injected());
            }
            self.inner.rollback().await
        }
    }

    fn faulty(db: &Database, gateway: FaultyGateway, settings: SaleSettings) -> SaleCoordinator<FaultyGateway> {
        SaleCoordinator::new(gateway, db.sales(), settings)
    }

    // -------------------------------------------------------------------------
    // Single sales
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_discounted_sale_commits() {
        let (db, coordinator) = setup().await;
        let product = add_product(&db, "Green Tea", 10, 500).await;

        let sale = coordinator
            .process_sale(&product.id, 4, "cashier-1", Some(Money::from_cents(1800)))
            .await
            .unwrap();

        assert_eq!(sale.quantity_sold, 4);
        assert_eq!(sale.total(), Money::from_cents(1800));
        assert_eq!(sale.user_id, "cashier-1");
        assert_eq!(quantity_of(&db, &product.id).await, 6);

        let history = coordinator.get_all_sales().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].product_name, "Green Tea");
        assert_eq!(
            coordinator.get_total_sales_amount().await.unwrap(),
            Money::from_cents(1800)
        );
    }

    #[tokio::test]
    async fn test_sale_without_billed_total_charges_catalog_price() {
        let (db, coordinator) = setup().await;
        let product = add_product(&db, "Green Tea", 10, 500).await;

        let sale = coordinator
            .process_sale(&product.id, 10, "cashier-1", None)
            .await
            .unwrap();

        assert_eq!(sale.total(), Money::from_cents(5000));
        assert_eq!(quantity_of(&db, &product.id).await, 0);
    }

    #[tokio::test]
    async fn test_markup_is_rejected_and_nothing_changes() {
        let (db, coordinator) = setup().await;
        let product = add_product(&db, "Green Tea", 10, 500).await;

        let err = coordinator
            .process_sale(&product.id, 4, "cashier-1", Some(Money::from_cents(2100)))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::InvalidPrice);
        assert_eq!(quantity_of(&db, &product.id).await, 10);
        assert_eq!(db.sales().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_negative_billed_total_is_invalid_price() {
        let (db, coordinator) = setup().await;
        let product = add_product(&db, "Green Tea", 10, 500).await;

        let err = coordinator
            .process_sale(&product.id, 1, "cashier-1", Some(Money::from_cents(-1)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidPrice);
    }

    #[tokio::test]
    async fn test_insufficient_stock() {
        let (db, coordinator) = setup().await;
        let product = add_product(&db, "Green Tea", 3, 500).await;

        let err = coordinator
            .process_sale(&product.id, 4, "cashier-1", None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::InsufficientStock);
        assert!(matches!(
            err,
            SaleError::Rejected(CoreError::InsufficientStock {
                available: 3,
                requested: 4,
                ..
            })
        ));
        assert_eq!(quantity_of(&db, &product.id).await, 3);
    }

    #[tokio::test]
    async fn test_invalid_requests_never_reach_storage() {
        let (db, coordinator) = setup().await;
        let product = add_product(&db, "Green Tea", 3, 500).await;

        for quantity in [0, -2] {
            let err = coordinator
                .process_sale(&product.id, quantity, "cashier-1", None)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), FailureKind::InvalidRequest);
        }

        let err = coordinator
            .process_sale(&product.id, 1, "  ", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidRequest);

        let err = coordinator.process_sale("", 1, "cashier-1", None).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidRequest);

        assert_eq!(db.sales().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let (_db, coordinator) = setup().await;
        let err = coordinator
            .process_sale("no-such-product", 1, "cashier-1", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::ProductNotFound);
    }

    // -------------------------------------------------------------------------
    // Batches and checkouts
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_batch_commits_every_line() {
        let (db, coordinator) = setup().await;
        let tea = add_product(&db, "Green Tea", 10, 500).await;
        let rice = add_product(&db, "Rice 5kg", 4, 900).await;

        let sales = coordinator
            .process_sale_batch(
                &[
                    SaleLine::new(&tea.id, 2),
                    SaleLine::new(&rice.id, 1).with_billed_total(Money::from_cents(800)),
                    SaleLine::new(&tea.id, 3),
                ],
                "cashier-2",
            )
            .await
            .unwrap();

        assert_eq!(sales.len(), 3);
        assert_eq!(sales[0].total(), Money::from_cents(1000));
        assert_eq!(sales[1].total(), Money::from_cents(800));
        assert_eq!(quantity_of(&db, &tea.id).await, 5);
        assert_eq!(quantity_of(&db, &rice.id).await, 3);
        assert_eq!(db.sales().count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_batch_checks_joint_demand() {
        let (db, coordinator) = setup().await;
        let tea = add_product(&db, "Green Tea", 5, 500).await;

        let err = coordinator
            .process_sale_batch(
                &[SaleLine::new(&tea.id, 3), SaleLine::new(&tea.id, 4)],
                "cashier-2",
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::InsufficientStock);
        assert!(matches!(
            err,
            SaleError::Rejected(CoreError::InsufficientStock { requested: 7, .. })
        ));
        assert_eq!(quantity_of(&db, &tea.id).await, 5);
        assert_eq!(db.sales().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_batch_with_one_bad_price_applies_nothing() {
        let (db, coordinator) = setup().await;
        let tea = add_product(&db, "Green Tea", 10, 500).await;
        let rice = add_product(&db, "Rice 5kg", 4, 900).await;

        let err = coordinator
            .process_sale_batch(
                &[
                    SaleLine::new(&tea.id, 1),
                    SaleLine::new(&rice.id, 1).with_billed_total(Money::from_cents(901)),
                ],
                "cashier-2",
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::InvalidPrice);
        assert_eq!(quantity_of(&db, &tea.id).await, 10);
        assert_eq!(db.sales().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_batch_and_missing_product() {
        let (db, coordinator) = setup().await;
        let tea = add_product(&db, "Green Tea", 10, 500).await;

        let err = coordinator.process_sale_batch(&[], "cashier-2").await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidRequest);

        let err = coordinator
            .process_sale_batch(
                &[SaleLine::new(&tea.id, 1), SaleLine::new("ghost", 1)],
                "cashier-2",
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::ProductNotFound);
        assert_eq!(quantity_of(&db, &tea.id).await, 10);
    }

    #[tokio::test]
    async fn test_checkout_splits_payable() {
        let (db, coordinator) = setup().await;
        let tea = add_product(&db, "Green Tea", 10, 500).await;
        let rice = add_product(&db, "Rice 5kg", 4, 500).await;

        // 20.00 + 5.00, paid 22.50
        let sales = coordinator
            .process_checkout(
                &[SaleLine::new(&tea.id, 4), SaleLine::new(&rice.id, 1)],
                Money::from_cents(2250),
                "cashier-3",
            )
            .await
            .unwrap();

        let totals: Vec<i64> = sales.iter().map(|s| s.total_cents).collect();
        assert_eq!(totals, vec![1800, 450]);
        assert_eq!(
            coordinator.get_total_sales_amount().await.unwrap(),
            Money::from_cents(2250)
        );
        assert_eq!(quantity_of(&db, &tea.id).await, 6);
        assert_eq!(quantity_of(&db, &rice.id).await, 3);
    }

    #[tokio::test]
    async fn test_checkout_rejects_overpayment_and_line_totals() {
        let (db, coordinator) = setup().await;
        let tea = add_product(&db, "Green Tea", 10, 500).await;

        let err = coordinator
            .process_checkout(&[SaleLine::new(&tea.id, 2)], Money::from_cents(1001), "cashier-3")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidPrice);

        let err = coordinator
            .process_checkout(
                &[SaleLine::new(&tea.id, 2).with_billed_total(Money::from_cents(900))],
                Money::from_cents(900),
                "cashier-3",
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidRequest);

        assert_eq!(quantity_of(&db, &tea.id).await, 10);
    }

    #[tokio::test]
    async fn test_discounted_checkout() {
        let (db, coordinator) = setup().await;
        let tea = add_product(&db, "Green Tea", 10, 500).await;
        let rice = add_product(&db, "Rice 5kg", 4, 500).await;

        let sales = coordinator
            .process_discounted_checkout(
                &[SaleLine::new(&tea.id, 4), SaleLine::new(&rice.id, 1)],
                1000,
                "cashier-3",
            )
            .await
            .unwrap();
        let totals: Vec<i64> = sales.iter().map(|s| s.total_cents).collect();
        assert_eq!(totals, vec![1800, 450]);

        let err = coordinator
            .process_discounted_checkout(&[SaleLine::new(&tea.id, 1)], 10_001, "cashier-3")
            .await
            .unwrap_err();
        // a discount over 100% is a malformed request, not a billed total
        assert_eq!(err.kind(), FailureKind::InvalidRequest);
        assert_eq!(quantity_of(&db, &tea.id).await, 6);
    }

    #[tokio::test]
    async fn test_restock() {
        let (db, coordinator) = setup().await;
        let tea = add_product(&db, "Green Tea", 2, 500).await;

        assert_eq!(coordinator.restock(&tea.id, 8).await.unwrap(), 10);
        assert_eq!(quantity_of(&db, &tea.id).await, 10);

        let err = coordinator.restock(&tea.id, 0).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidRequest);

        let err = coordinator.restock("ghost", 1).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::ProductNotFound);
    }

    // -------------------------------------------------------------------------
    // Failures and retries
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_storage_fault_at_any_step_rolls_back() {
        for fault in [Fault::InsertSale, Fault::SetQuantity] {
            let db = Database::new(DbConfig::in_memory()).await.unwrap();
            let tea = add_product(&db, "Green Tea", 10, 500).await;
            let coordinator = faulty(&db, FaultyGateway::new(&db, fault), fast_settings());

            let err = coordinator
                .process_sale_batch(
                    &[SaleLine::new(&tea.id, 1), SaleLine::new(&tea.id, 2)],
                    "cashier-4",
                )
                .await
                .unwrap_err();

            assert_eq!(err.kind(), FailureKind::StorageFault, "{fault:?}");
            assert!(!err.is_retryable());
            assert_eq!(quantity_of(&db, &tea.id).await, 10, "{fault:?}");
            assert_eq!(db.sales().count().await.unwrap(), 0, "{fault:?}");
        }
    }

    #[tokio::test]
    async fn test_failed_rollback_is_reported() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let tea = add_product(&db, "Green Tea", 1, 500).await;
        let coordinator = faulty(&db, FaultyGateway::new(&db, Fault::Rollback), fast_settings());

        let err = coordinator
            .process_sale(&tea.id, 5, "cashier-4", None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::StorageFault);
        match err {
            SaleError::RollbackFailed { original, .. } => {
                assert_eq!(original.kind(), FailureKind::InsufficientStock);
            }
            other => panic!("expected RollbackFailed, got {other:?}"),
        }
        assert_eq!(quantity_of(&db, &tea.id).await, 1);
    }

    #[tokio::test]
    async fn test_conflicts_are_retried() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let tea = add_product(&db, "Green Tea", 10, 500).await;
        let gateway = FaultyGateway::new(&db, Fault::None).with_conflicts(3);
        let coordinator = faulty(&db, gateway, fast_settings());

        let sale = coordinator
            .process_sale(&tea.id, 2, "cashier-5", None)
            .await
            .unwrap();

        assert_eq!(sale.quantity_sold, 2);
        assert_eq!(quantity_of(&db, &tea.id).await, 8);
        // the three aborted attempts left no sale rows behind
        assert_eq!(db.sales().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_conflicts_past_max_attempts_fail() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let tea = add_product(&db, "Green Tea", 10, 500).await;
        let gateway = FaultyGateway::new(&db, Fault::None).with_conflicts(u32::MAX);
        let settings = SaleSettings {
            max_attempts: 3,
            ..fast_settings()
        };
        let conflicts = gateway.conflicts.clone();
        let coordinator = faulty(&db, gateway, settings);

        let err = coordinator
            .process_sale(&tea.id, 2, "cashier-5", None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::StorageFault);
        assert!(matches!(err, SaleError::Persistence(DbError::Conflict { .. })));
        assert_eq!(u32::MAX - conflicts.load(Ordering::SeqCst), 3);
        assert_eq!(quantity_of(&db, &tea.id).await, 10);
    }

    #[tokio::test]
    async fn test_slow_transaction_times_out() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let tea = add_product(&db, "Green Tea", 10, 500).await;
        let gateway =
            FaultyGateway::new(&db, Fault::None).with_read_delay(Duration::from_millis(1500));
        let settings = SaleSettings {
            transaction_timeout_secs: 1,
            ..fast_settings()
        };
        let coordinator = faulty(&db, gateway, settings);

        let err = coordinator
            .process_sale(&tea.id, 1, "cashier-6", None)
            .await
            .unwrap_err();

        assert!(matches!(err, SaleError::Persistence(DbError::Timeout { after_ms: 1000 })));
        assert_eq!(err.kind(), FailureKind::StorageFault);
        assert_eq!(quantity_of(&db, &tea.id).await, 10);
    }

    #[tokio::test]
    async fn test_slow_commit_is_not_reported_as_timeout() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let tea = add_product(&db, "Green Tea", 10, 500).await;
        let gateway =
            FaultyGateway::new(&db, Fault::None).with_commit_delay(Duration::from_millis(1500));
        let settings = SaleSettings {
            transaction_timeout_secs: 1,
            ..fast_settings()
        };
        let coordinator = faulty(&db, gateway, settings);

        // the commit landed, so the caller must see the sale
        let sale = coordinator
            .process_sale(&tea.id, 4, "cashier-6", Some(Money::from_cents(1800)))
            .await
            .unwrap();

        assert_eq!(sale.total(), Money::from_cents(1800));
        assert_eq!(quantity_of(&db, &tea.id).await, 6);
        assert_eq!(db.sales().count().await.unwrap(), 1);
    }

    // -------------------------------------------------------------------------
    // Concurrency
    // -------------------------------------------------------------------------

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sales_of_last_unit() {
        let path = std::env::temp_dir().join(format!("stockroom-race-{}.db", uuid::Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path).max_connections(8))
            .await
            .unwrap();
        let tea = add_product(&db, "Green Tea", 1, 500).await;

        let settings = SaleSettings {
            max_attempts: 20,
            ..fast_settings()
        };
        let coordinator = Arc::new(db.coordinator(settings));

        let mut handles = Vec::new();
        for i in 0..8 {
            let coordinator = coordinator.clone();
            let id = tea.id.clone();
            handles.push(tokio::spawn(async move {
                coordinator
                    .process_sale(&id, 1, &format!("cashier-{i}"), None)
                    .await
            }));
        }

        let mut committed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => committed += 1,
                Err(err) => assert!(
                    matches!(
                        err.kind(),
                        FailureKind::InsufficientStock | FailureKind::StorageFault
                    ),
                    "unexpected failure: {err}"
                ),
            }
        }

        assert_eq!(committed, 1);
        assert_eq!(quantity_of(&db, &tea.id).await, 0);
        assert_eq!(db.sales().count().await.unwrap(), 1);

        db.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sales_never_oversell() {
        let path = std::env::temp_dir().join(format!("stockroom-race-{}.db", uuid::Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path).max_connections(8))
            .await
            .unwrap();
        let initial = 8;
        let tea = add_product(&db, "Green Tea", initial, 500).await;
        let coordinator = Arc::new(db.coordinator(SaleSettings::default()));

        let mut handles = Vec::new();
        for i in 0..12 {
            let coordinator = coordinator.clone();
            let id = tea.id.clone();
            handles.push(tokio::spawn(async move {
                coordinator
                    .process_sale(&id, 1, &format!("cashier-{i}"), None)
                    .await
            }));
        }

        let mut committed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(sale) => {
                    assert_eq!(sale.quantity_sold, 1);
                    committed += 1;
                }
                Err(err) => assert_eq!(
                    err.kind(),
                    FailureKind::InsufficientStock,
                    "unexpected failure: {err}"
                ),
            }
        }

        let remaining = quantity_of(&db, &tea.id).await;
        assert_eq!(committed, initial - remaining);
        assert_eq!(remaining, 0);
        assert_eq!(db.sales().count().await.unwrap(), committed);
        assert_eq!(
            coordinator.get_total_sales_amount().await.unwrap(),
            Money::from_cents(500 * committed)
        );

        db.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
        }
    }
}
