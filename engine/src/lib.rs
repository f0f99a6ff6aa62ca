//! rosterlink engine: keeps the verification mapping consistent with both
//! directories.
//!
//! - [`fetch`]: bounded-time snapshot fetchers for both sides
//! - [`ledger`]: the in-memory mapping behind a single-writer lock, backed
//!   by a [`MappingStore`](rosterlink_store::MappingStore)
//! - [`reconcile`]: destructive reconciliation (unmark, drop mappings)
//! - [`claim`]: additive verification (record mapping, grant marker)
//!
//! Reconciliation never creates a mapping and the claim handler never
//! removes one, except to undo its own write when the marker grant fails.

pub mod claim;
pub mod error;
pub mod fetch;
pub mod latest;
pub mod ledger;
pub mod reconcile;

pub use claim::{decide_claim, ClaimHandler, ClaimResult};
pub use error::{EngineError, FetchError};
pub use fetch::{bounded_call, fetch_directory, fetch_membership};
pub use latest::LatestDirectory;
pub use ledger::{LedgerTxn, VerificationLedger};
pub use reconcile::{
    plan_reconciliation, Correction, PlannedRemoval, ReconciliationEngine, ReconciliationPlan,
    ReconciliationReport, RemovalReason, RevokeOutcome,
};
