//! The rosterlink bridge node.
//!
//! Runs reconciliation on a fixed period, turns verification channel
//! posts into claims, and optionally serves `/metrics` and `/health`.

pub mod config;
pub mod error;
pub mod intake;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod scheduler;
pub mod shutdown;
pub mod status;

pub use config::BridgeConfig;
pub use error::NodeError;
pub use intake::{reply_for, ClaimIntake};
pub use logging::{init_logging, LogFormat};
pub use metrics::BridgeMetrics;
pub use node::BridgeNode;
pub use scheduler::Scheduler;
pub use shutdown::ShutdownController;
pub use status::{BridgeStatus, CycleSummary, HealthReport, StatusState};
