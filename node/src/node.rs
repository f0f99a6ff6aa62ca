//! Top-level bridge node that wires every component together.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use rosterlink_community::{ChatClient, ClaimChannel, CommunityApi};
use rosterlink_directory::{DirectorySource, MediaServerClient};
use rosterlink_engine::{LatestDirectory, VerificationLedger};
use rosterlink_store::{JsonFileStore, MappingStore};

use crate::status::{self, StatusState};
use crate::{
    BridgeConfig, BridgeMetrics, BridgeStatus, ClaimIntake, NodeError, Scheduler,
    ShutdownController,
};

/// How long [`BridgeNode::stop`] waits for tasks to finish their current
/// cycle or claim.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// The running bridge.
///
/// Owns the ledger, the latest directory snapshot and every background
/// task: the reconciliation scheduler, the claim intake and the optional
/// status server.
pub struct BridgeNode {
    pub config: BridgeConfig,
    pub shutdown: Arc<ShutdownController>,
    pub metrics: Arc<BridgeMetrics>,
    pub status: Arc<BridgeStatus>,
    ledger: Arc<VerificationLedger>,
    latest: Arc<LatestDirectory>,
    directory: Arc<dyn DirectorySource>,
    community: Arc<dyn CommunityApi>,
    channel: Arc<dyn ClaimChannel>,
    task_handles: Vec<JoinHandle<()>>,
}

impl BridgeNode {
    /// Build a node against the real media server, chat API and mapping file.
    ///
    /// Fails if the config is invalid, the chat API cannot resolve the
    /// community, or the mapping file exists but cannot be read.
    pub async fn new(config: BridgeConfig) -> Result<Self, NodeError> {
        config.validate()?;

        let directory = Arc::new(MediaServerClient::new(
            config.media_server_url.clone(),
            config.media_server_token.clone(),
            config.request_timeout(),
        )?);
        let chat = Arc::new(ChatClient::connect(config.chat_settings()).await?);
        tracing::info!(guild = chat.guild_id(), "connected to chat community");

        let store = Arc::new(JsonFileStore::new(config.mapping_file.clone()));
        Self::with_parts(config, directory, chat.clone(), chat, store)
    }

    /// Build a node from explicit collaborators.
    pub fn with_parts(
        config: BridgeConfig,
        directory: Arc<dyn DirectorySource>,
        community: Arc<dyn CommunityApi>,
        channel: Arc<dyn ClaimChannel>,
        store: Arc<dyn MappingStore>,
    ) -> Result<Self, NodeError> {
        let ledger = Arc::new(VerificationLedger::open(store)?);
        tracing::info!(mappings = ledger.len(), "verification ledger loaded");

        let metrics = Arc::new(BridgeMetrics::new());
        metrics.mappings.set(ledger.len() as i64);

        Ok(Self {
            config,
            shutdown: Arc::new(ShutdownController::new()),
            metrics,
            status: Arc::new(BridgeStatus::new()),
            ledger,
            latest: Arc::new(LatestDirectory::new()),
            directory,
            community,
            channel,
            task_handles: Vec::new(),
        })
    }

    pub fn ledger(&self) -> &Arc<VerificationLedger> {
        &self.ledger
    }

    pub fn latest_directory(&self) -> &Arc<LatestDirectory> {
        &self.latest
    }

    /// Warm up the directory and spawn all background tasks.
    pub async fn spawn_tasks(&mut self) -> Result<(), NodeError> {
        let scheduler = Scheduler::new(
            self.directory.clone(),
            self.community.clone(),
            self.ledger.clone(),
            self.latest.clone(),
            self.metrics.clone(),
            self.status.clone(),
            self.config.reconcile_interval(),
            self.config.request_timeout(),
            self.config.roster_timeout(),
        );
        let warm = scheduler.warm_up().await;

        if self.config.enable_status_server {
            let state = StatusState {
                metrics: self.metrics.clone(),
                ledger: self.ledger.clone(),
                status: self.status.clone(),
            };
            let port = self.config.status_port;
            let shutdown_rx = self.shutdown.subscribe();
            let handle = tokio::spawn(async move {
                if let Err(e) = status::serve(port, state, shutdown_rx).await {
                    tracing::error!(error = %e, "status server stopped");
                }
            });
            self.task_handles.push(handle);
        }

        let intake = ClaimIntake::new(
            self.channel.clone(),
            self.community.clone(),
            self.ledger.clone(),
            self.latest.clone(),
            self.metrics.clone(),
            self.config.claim_poll_interval(),
            self.config.request_timeout(),
        );
        let shutdown_rx = self.shutdown.subscribe();
        self.task_handles
            .push(tokio::spawn(intake.run(shutdown_rx)));

        let shutdown_rx = self.shutdown.subscribe();
        self.task_handles
            .push(tokio::spawn(scheduler.run(warm, shutdown_rx)));

        tracing::info!(
            interval_secs = self.config.reconcile_interval_secs,
            "rosterlink bridge started"
        );
        Ok(())
    }

    /// Spawn all tasks and run until SIGINT or SIGTERM.
    pub async fn start(&mut self) -> Result<(), NodeError> {
        self.spawn_tasks().await?;
        self.shutdown.wait_for_signal().await;
        Ok(())
    }

    /// Signal shutdown and wait for every task to finish.
    pub async fn stop(&mut self) -> Result<(), NodeError> {
        tracing::info!("stopping rosterlink bridge");
        self.shutdown.shutdown();

        let handles: Vec<_> = self.task_handles.drain(..).collect();
        let wait_all = async {
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::warn!(error = %e, "bridge task panicked");
                }
            }
        };

        if tokio::time::timeout(SHUTDOWN_TIMEOUT, wait_all).await.is_err() {
            tracing::warn!("shutdown timed out, some tasks may not have completed");
            return Err(NodeError::ShutdownTimeout);
        }

        tracing::info!(mappings = self.ledger.len(), "rosterlink bridge stopped");
        Ok(())
    }
}
