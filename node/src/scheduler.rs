//! Periodic reconciliation.
//!
//! Start-up is two explicit phases: [`Scheduler::warm_up`] fetches and
//! publishes the directory so claims can be served immediately, then
//! [`Scheduler::run`] reconciles once with that snapshot and afterwards
//! every `period`. Cycles never overlap and a failed cycle never stops
//! the loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::Instrument;

use rosterlink_community::CommunityApi;
use rosterlink_directory::DirectorySource;
use rosterlink_engine::{
    fetch_directory, EngineError, LatestDirectory, ReconciliationEngine, ReconciliationReport,
    VerificationLedger,
};
use rosterlink_types::DirectorySnapshot;

use crate::{BridgeMetrics, BridgeStatus};

pub struct Scheduler {
    directory: Arc<dyn DirectorySource>,
    engine: ReconciliationEngine,
    ledger: Arc<VerificationLedger>,
    latest: Arc<LatestDirectory>,
    metrics: Arc<BridgeMetrics>,
    status: Arc<BridgeStatus>,
    period: Duration,
    call_timeout: Duration,
    cycles: u64,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        directory: Arc<dyn DirectorySource>,
        community: Arc<dyn CommunityApi>,
        ledger: Arc<VerificationLedger>,
        latest: Arc<LatestDirectory>,
        metrics: Arc<BridgeMetrics>,
        status: Arc<BridgeStatus>,
        period: Duration,
        call_timeout: Duration,
        roster_timeout: Duration,
    ) -> Self {
        let engine =
            ReconciliationEngine::new(community, call_timeout).with_roster_timeout(roster_timeout);
        Self {
            directory,
            engine,
            ledger,
            latest,
            metrics,
            status,
            period,
            call_timeout,
            cycles: 0,
        }
    }

    /// Fetch and publish the directory ahead of the first cycle.
    ///
    /// Returns `None` when the fetch fails; the first cycle then fetches
    /// again on its own.
    pub async fn warm_up(&self) -> Option<Arc<DirectorySnapshot>> {
        match self.refresh_directory().await {
            Ok(snapshot) => {
                tracing::info!(accounts = snapshot.len(), "directory warmed up");
                Some(snapshot)
            }
            Err(e) => {
                tracing::warn!(error = %e, "directory warm-up failed");
                None
            }
        }
    }

    /// Reconcile once now, then every `period` until shutdown.
    pub async fn run(
        mut self,
        warm: Option<Arc<DirectorySnapshot>>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        self.run_cycle(warm).await;

        let mut interval = tokio::time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    tracing::debug!("scheduler shutting down");
                    break;
                }
                _ = interval.tick() => {
                    self.run_cycle(None).await;
                }
            }
        }
    }

    /// Run one cycle, reusing `directory` when given. Failures are
    /// logged and recorded, never propagated.
    pub async fn run_cycle(&mut self, directory: Option<Arc<DirectorySnapshot>>) {
        self.cycles += 1;
        let n = self.cycles;
        self.metrics.cycles.inc();

        let span = tracing::info_span!("cycle", n);
        let result = self.cycle(directory).instrument(span.clone()).await;

        let _entered = span.enter();
        match result {
            Ok(report) => {
                self.metrics.record_report(&report);
                self.status.record_success(n, report.corrections.len());
                if report.is_empty() {
                    tracing::debug!(mappings = report.remaining, "no corrections needed");
                } else {
                    tracing::info!(
                        removed = report.corrections.len(),
                        revoke_failures = report.revoke_failures(),
                        mappings = report.remaining,
                        "reconciliation applied"
                    );
                }
            }
            Err(e) => {
                self.metrics.cycles_failed.inc();
                self.status.record_failure(n, e.to_string());
                tracing::warn!(error = %e, "reconciliation cycle failed");
            }
        }
    }

    async fn cycle(
        &self,
        directory: Option<Arc<DirectorySnapshot>>,
    ) -> Result<ReconciliationReport, EngineError> {
        let directory = match directory {
            Some(snapshot) => snapshot,
            None => self.refresh_directory().await?,
        };
        self.engine.reconcile(&directory, &self.ledger).await
    }

    async fn refresh_directory(&self) -> Result<Arc<DirectorySnapshot>, EngineError> {
        let snapshot = fetch_directory(self.directory.as_ref(), self.call_timeout).await?;
        self.metrics.directory_size.set(snapshot.len() as i64);
        Ok(self.latest.publish(snapshot))
    }
}
