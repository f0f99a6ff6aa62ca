//! Claim intake: turns messages in the verification channel into claims.
//!
//! The channel is polled every `poll_interval`. Each new message is
//! handled in order:
//! - posts by bots are deleted and ignored;
//! - blank posts are deleted without a reply;
//! - anything else is a claim for the trimmed text, answered privately.
//!
//! The message is deleted whatever the outcome. Failures to delete or to
//! reply are logged and never affect the claim.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};

use rosterlink_community::{ChannelMessage, ClaimChannel, CommunityApi, CommunityError, MessageId};
use rosterlink_engine::{
    bounded_call, ClaimHandler, ClaimResult, EngineError, LatestDirectory, VerificationLedger,
};
use rosterlink_types::ExternalIdentity;

use crate::BridgeMetrics;

pub const REPLY_NOT_FOUND: &str = "That user does not exist!";
pub const REPLY_ALREADY_VERIFIED: &str = "That user is already verified!";
pub const REPLY_REQUESTER_VERIFIED: &str = "You are already verified as another user!";
pub const REPLY_UNAVAILABLE: &str =
    "Verification is unavailable right now, please try again later.";

/// Private reply for a claim outcome.
pub fn reply_for(outcome: &Result<ClaimResult, EngineError>) -> String {
    match outcome {
        Ok(ClaimResult::Granted(mapping)) => {
            format!("You are now verified as `{}`!", mapping.external)
        }
        Ok(ClaimResult::NotFound) => REPLY_NOT_FOUND.to_string(),
        Ok(ClaimResult::AlreadyVerified) => REPLY_ALREADY_VERIFIED.to_string(),
        Ok(ClaimResult::RequesterAlreadyVerified { .. }) => REPLY_REQUESTER_VERIFIED.to_string(),
        Err(_) => REPLY_UNAVAILABLE.to_string(),
    }
}

pub struct ClaimIntake {
    channel: Arc<dyn ClaimChannel>,
    handler: ClaimHandler,
    ledger: Arc<VerificationLedger>,
    latest: Arc<LatestDirectory>,
    metrics: Arc<BridgeMetrics>,
    poll_interval: Duration,
    call_timeout: Duration,
    /// Newest message already handled.
    cursor: Option<MessageId>,
}

impl ClaimIntake {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        channel: Arc<dyn ClaimChannel>,
        community: Arc<dyn CommunityApi>,
        ledger: Arc<VerificationLedger>,
        latest: Arc<LatestDirectory>,
        metrics: Arc<BridgeMetrics>,
        poll_interval: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            channel,
            handler: ClaimHandler::new(community, call_timeout),
            ledger,
            latest,
            metrics,
            poll_interval,
            call_timeout,
            cursor: None,
        }
    }

    pub fn cursor(&self) -> Option<MessageId> {
        self.cursor
    }

    /// Poll until shutdown. A claim in progress is finished first.
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval_at(Instant::now(), self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    tracing::debug!("claim intake shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.poll_once().await {
                        tracing::warn!(error = %e, "failed to poll claim channel");
                    }
                }
            }
        }
    }

    /// Fetch and handle every message newer than the cursor.
    ///
    /// Returns how many messages were handled.
    pub async fn poll_once(&mut self) -> Result<usize, CommunityError> {
        let poll = self.channel.poll_messages(self.cursor);
        let messages = bounded_call("claim poll", self.call_timeout, poll).await?;

        let mut handled = 0;
        for message in messages {
            if self.cursor.is_some_and(|cursor| message.id <= cursor) {
                continue;
            }
            self.cursor = Some(message.id);
            self.process(&message).await;
            handled += 1;
        }
        Ok(handled)
    }

    /// Handle one message. Returns the claim outcome, or `None` when the
    /// message carried no claim.
    pub async fn process(&self, message: &ChannelMessage) -> Option<Result<ClaimResult, EngineError>> {
        if message.author_is_bot {
            self.delete(message).await;
            return None;
        }

        let claimed = message.content.trim();
        if claimed.is_empty() {
            self.delete(message).await;
            return None;
        }

        tracing::debug!(
            requester = %message.author,
            name = %message.author_name,
            claimed,
            "verification claim received"
        );
        let outcome = self.claim(ExternalIdentity::new(claimed), message).await;
        match &outcome {
            Ok(result) => self.metrics.record_claim(result),
            Err(e) => {
                self.metrics.claims_failed.inc();
                tracing::warn!(requester = %message.author, claimed, error = %e, "claim failed");
            }
        }
        self.metrics.mappings.set(self.ledger.len() as i64);

        self.delete(message).await;
        self.reply(message, &reply_for(&outcome)).await;
        Some(outcome)
    }

    async fn claim(
        &self,
        claimed: ExternalIdentity,
        message: &ChannelMessage,
    ) -> Result<ClaimResult, EngineError> {
        let directory = self.latest.get().ok_or(EngineError::DirectoryUnavailable)?;
        self.handler
            .handle_claim(&claimed, message.author, &directory, &self.ledger)
            .await
    }

    async fn delete(&self, message: &ChannelMessage) {
        let call = self.channel.delete_message(message.id);
        if let Err(e) = bounded_call("message delete", self.call_timeout, call).await {
            tracing::warn!(message = %message.id, error = %e, "failed to delete claim message");
        }
    }

    async fn reply(&self, message: &ChannelMessage, text: &str) {
        let call = self.channel.send_private(message.author, text);
        if let Err(e) = bounded_call("private reply", self.call_timeout, call).await {
            tracing::warn!(member = %message.author, error = %e, "failed to send private reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosterlink_types::{MemberId, VerificationMapping};

    #[test]
    fn granted_reply_names_the_account() {
        let outcome = Ok(ClaimResult::Granted(VerificationMapping::new(
            "alice",
            MemberId::new(1),
        )));
        assert_eq!(reply_for(&outcome), "You are now verified as `alice`!");
    }

    #[test]
    fn rejections_have_fixed_replies() {
        assert_eq!(reply_for(&Ok(ClaimResult::NotFound)), REPLY_NOT_FOUND);
        assert_eq!(
            reply_for(&Ok(ClaimResult::AlreadyVerified)),
            REPLY_ALREADY_VERIFIED
        );
        assert_eq!(
            reply_for(&Err(EngineError::DirectoryUnavailable)),
            REPLY_UNAVAILABLE
        );
    }
}
