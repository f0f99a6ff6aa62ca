//! Prometheus metrics for the bridge.
//!
//! [`BridgeMetrics`] owns a dedicated [`Registry`]; the status server
//! encodes it into the text exposition format on `GET /metrics`.

use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

use rosterlink_engine::{ClaimResult, ReconciliationReport};

pub struct BridgeMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Reconciliation cycles started.
    pub cycles: IntCounter,
    /// Cycles that ended in a fetch or persistence error.
    pub cycles_failed: IntCounter,
    /// Mappings removed, labelled by `reason`.
    pub mappings_removed: IntCounterVec,
    /// Marker revocations that failed (the mapping was still removed).
    pub revoke_failures: IntCounter,
    /// Claims that ended in a grant.
    pub claims_granted: IntCounter,
    /// Claims refused, labelled by `outcome`.
    pub claims_rejected: IntCounterVec,
    /// Claims that could not be completed.
    pub claims_failed: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Mappings currently held.
    pub mappings: IntGauge,
    /// Accounts in the last directory snapshot.
    pub directory_size: IntGauge,
}

impl BridgeMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let cycles = register_int_counter_with_registry!(
            Opts::new("rosterlink_cycles_total", "Reconciliation cycles started"),
            registry
        )
        .expect("failed to register cycles_total");

        let cycles_failed = register_int_counter_with_registry!(
            Opts::new(
                "rosterlink_cycles_failed_total",
                "Reconciliation cycles that failed"
            ),
            registry
        )
        .expect("failed to register cycles_failed_total");

        let mappings_removed = register_int_counter_vec_with_registry!(
            Opts::new(
                "rosterlink_mappings_removed_total",
                "Verification mappings removed by reconciliation"
            ),
            &["reason"],
            registry
        )
        .expect("failed to register mappings_removed_total");

        let revoke_failures = register_int_counter_with_registry!(
            Opts::new(
                "rosterlink_revoke_failures_total",
                "Verified marker revocations that failed"
            ),
            registry
        )
        .expect("failed to register revoke_failures_total");

        let claims_granted = register_int_counter_with_registry!(
            Opts::new("rosterlink_claims_granted_total", "Verification claims granted"),
            registry
        )
        .expect("failed to register claims_granted_total");

        let claims_rejected = register_int_counter_vec_with_registry!(
            Opts::new(
                "rosterlink_claims_rejected_total",
                "Verification claims refused"
            ),
            &["outcome"],
            registry
        )
        .expect("failed to register claims_rejected_total");

        let claims_failed = register_int_counter_with_registry!(
            Opts::new(
                "rosterlink_claims_failed_total",
                "Verification claims that could not be completed"
            ),
            registry
        )
        .expect("failed to register claims_failed_total");

        let mappings = register_int_gauge_with_registry!(
            Opts::new("rosterlink_mappings", "Verification mappings currently held"),
            registry
        )
        .expect("failed to register mappings");

        let directory_size = register_int_gauge_with_registry!(
            Opts::new(
                "rosterlink_directory_size",
                "Accounts in the last directory snapshot"
            ),
            registry
        )
        .expect("failed to register directory_size");

        Self {
            registry,
            cycles,
            cycles_failed,
            mappings_removed,
            revoke_failures,
            claims_granted,
            claims_rejected,
            claims_failed,
            mappings,
            directory_size,
        }
    }

    pub fn record_report(&self, report: &ReconciliationReport) {
        for correction in &report.corrections {
            self.mappings_removed
                .with_label_values(&[correction.reason.as_str()])
                .inc();
        }
        self.revoke_failures.inc_by(report.revoke_failures() as u64);
        self.mappings.set(report.remaining as i64);
    }

    pub fn record_claim(&self, result: &ClaimResult) {
        match result {
            ClaimResult::Granted(_) => self.claims_granted.inc(),
            rejected => self
                .claims_rejected
                .with_label_values(&[rejected.as_str()])
                .inc(),
        }
    }

    /// Encode all metrics in the Prometheus text format.
    pub fn encode(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for BridgeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosterlink_engine::{Correction, RemovalReason, RevokeOutcome};
    use rosterlink_types::{MemberId, VerificationMapping};

    #[test]
    fn metrics_register_without_collisions() {
        let metrics = BridgeMetrics::new();
        metrics.cycles.inc();
        assert_eq!(metrics.cycles.get(), 1);
        assert_eq!(metrics.mappings.get(), 0);
    }

    #[test]
    fn report_updates_removal_counters_and_gauge() {
        let metrics = BridgeMetrics::new();
        let report = ReconciliationReport {
            corrections: vec![
                Correction {
                    mapping: VerificationMapping::new("alice", MemberId::new(1)),
                    reason: RemovalReason::DirectoryRemoved,
                    revoke: Some(RevokeOutcome::Failed("403".into())),
                },
                Correction {
                    mapping: VerificationMapping::new("bob", MemberId::new(2)),
                    reason: RemovalReason::LeftCommunity,
                    revoke: None,
                },
            ],
            unverifiable: 0,
            remaining: 3,
        };
        metrics.record_report(&report);

        let removed = RemovalReason::DirectoryRemoved.as_str();
        assert_eq!(
            metrics.mappings_removed.with_label_values(&[removed]).get(),
            1
        );
        assert_eq!(metrics.revoke_failures.get(), 1);
        assert_eq!(metrics.mappings.get(), 3);
    }

    #[test]
    fn claims_are_split_by_outcome() {
        let metrics = BridgeMetrics::new();
        metrics.record_claim(&ClaimResult::NotFound);
        metrics.record_claim(&ClaimResult::Granted(VerificationMapping::new(
            "carol",
            MemberId::new(3),
        )));
        assert_eq!(metrics.claims_granted.get(), 1);
        assert_eq!(
            metrics
                .claims_rejected
                .with_label_values(&["not_found"])
                .get(),
            1
        );
    }

    #[test]
    fn encode_includes_metric_names() {
        let metrics = BridgeMetrics::new();
        metrics.cycles.inc();
        let text = metrics.encode();
        assert!(text.contains("rosterlink_cycles_total 1"));
    }
}
