//! # Alert Monitor
//!
//! Background task that periodically classifies the catalog into low-stock,
//! expired and expiring-soon alerts.
//!
//! ```text
//! ┌──────────────────────┐   interval tick    ┌────────────────────────────┐
//! │ AlertMonitor::run()  │ ─────────────────► │ products().list_all()      │
//! │                      │                    │ stockroom_core::alerts::scan│
//! │                      │ ◄───────────────── │                            │
//! └──────────┬───────────┘    AlertReport     └────────────────────────────┘
//!            │ watch channel
//!            ▼
//!   AlertMonitorHandle::subscribe() / latest()
//! ```
//!
//! The monitor only reads. Scans run on their own pool connections, so they
//! never hold up a sale in WAL mode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::config::AlertSettings;
use crate::error::{DbError, DbResult};
use crate::pool::Database;
use stockroom_core::alerts::{scan, StockAlert};

/// Result of one catalog scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertReport {
    pub scanned_at: DateTime<Utc>,
    pub products_scanned: usize,
    pub alerts: Vec<StockAlert>,
}

impl AlertReport {
    pub fn low_stock(&self) -> impl Iterator<Item = &StockAlert> {
        self.alerts
            .iter()
            .filter(|a| matches!(a, StockAlert::LowStock { .. }))
    }

    pub fn expiry(&self) -> impl Iterator<Item = &StockAlert> {
        self.alerts
            .iter()
            .filter(|a| !matches!(a, StockAlert::LowStock { .. }))
    }
}

/// Periodic alert scanner.
pub struct AlertMonitor {
    db: Database,
    settings: AlertSettings,
    report_tx: watch::Sender<Option<AlertReport>>,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for reading reports and stopping the monitor.
#[derive(Clone)]
pub struct AlertMonitorHandle {
    report_rx: watch::Receiver<Option<AlertReport>>,
    shutdown_tx: mpsc::Sender<()>,
}

impl AlertMonitorHandle {
    /// Receiver that sees every new report.
    pub fn subscribe(&self) -> watch::Receiver<Option<AlertReport>> {
        self.report_rx.clone()
    }

    /// Most recent report, `None` before the first scan completes.
    pub fn latest(&self) -> Option<AlertReport> {
        self.report_rx.borrow().clone()
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> DbResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| DbError::Internal("alert monitor already stopped".into()))
    }
}

impl AlertMonitor {
    /// Creates a new monitor and returns a handle.
    pub fn new(db: Database, settings: AlertSettings) -> (Self, AlertMonitorHandle) {
        let (report_tx, report_rx) = watch::channel(None);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let monitor = AlertMonitor {
            db,
            settings,
            report_tx,
            shutdown_rx,
        };
        let handle = AlertMonitorHandle {
            report_rx,
            shutdown_tx,
        };

        (monitor, handle)
    }

    /// Runs the scan loop until shutdown.
    ///
    /// This should be spawned as a background task. The first scan runs
    /// immediately.
    pub async fn run(mut self) {
        info!(
            interval_secs = self.settings.scan_interval_secs,
            "Alert monitor starting"
        );

        let mut interval = tokio::time::interval(self.settings.scan_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.scan_once().await {
                        Ok(report) => {
                            self.report_tx.send_replace(Some(report));
                        }
                        Err(e) => error!(?e, "Alert scan failed"),
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Alert monitor shutting down");
                    break;
                }
            }
        }

        info!("Alert monitor stopped");
    }

    /// Scans the catalog once.
    pub async fn scan_once(&self) -> DbResult<AlertReport> {
        let products = self.db.products().list_all().await?;
        let scanned_at = Utc::now();
        let alerts = scan(
            &products,
            scanned_at.date_naive(),
            &self.settings.thresholds(),
        );

        let report = AlertReport {
            scanned_at,
            products_scanned: products.len(),
            alerts,
        };

        if report.alerts.is_empty() {
            debug!(products = report.products_scanned, "No stock alerts");
        } else {
            info!(
                products = report.products_scanned,
                low_stock = report.low_stock().count(),
                expiry = report.expiry().count(),
                "Stock alerts raised"
            );
        }

        Ok(report)
    }
}
