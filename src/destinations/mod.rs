//! Destination Lifecycle (§4.8) — pre-live reconciliation for YouTube-class
//! destinations, plus the peripheral health watchdog.
//!
//! Grounded on the pack's YouTube broadcast-lifecycle reference client
//! (`youtube_api/broadcasts.rs`): a status enum matching the platform's
//! states, a trait-based client so the reconciliation algorithm is testable
//! without a real OAuth round-trip, and "refresh token on 401, retry once."

mod client;
mod watchdog;

pub use client::{
    AccessTokenProvider, BroadcastStatus, GoogleOAuthTokenProvider, HttpYouTubeClient, NullYouTubeClient,
    YouTubeClient, YouTubeClientError,
};
pub use watchdog::{DestinationWatchdog, StreamHealthCheck, WatchdogValidation, YouTubeStreamHealthCheck};

use crate::model::Destination;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum ReconciliationOutcome {
    /// OAuth not connected or broadcast id absent.
    Skipped,
    /// Broadcast is (now) in `testing` or `live`.
    Ready,
    /// A transition failed; the caller proceeds with the stream anyway.
    Warning(String),
}

const INTERMEDIATE_STATE_WAIT: Duration = Duration::from_secs(5);

pub struct DestinationLifecycle {
    client: Arc<dyn YouTubeClient>,
}

impl DestinationLifecycle {
    pub fn new(client: Arc<dyn YouTubeClient>) -> Self {
        Self { client }
    }

    /// The algorithm of §4.8: `skip` / already-`live` / `testing→live` /
    /// `complete→testing→live` / failure-is-a-warning-not-a-block.
    pub async fn reconcile(&self, destination: &Destination) -> ReconciliationOutcome {
        let Some(youtube) = &destination.youtube else {
            return ReconciliationOutcome::Skipped;
        };
        let Some(broadcast_id) = &youtube.broadcast_id else {
            return ReconciliationOutcome::Skipped;
        };
        if youtube.oauth_refresh_token.is_none() {
            return ReconciliationOutcome::Skipped;
        }

        let status = match self.client.get_broadcast_status(broadcast_id).await {
            Ok(status) => status,
            Err(e) => {
                warn!(destination_id = destination.id, "failed to fetch broadcast status: {}", e);
                return ReconciliationOutcome::Warning(e.to_string());
            }
        };

        match status {
            BroadcastStatus::Live => ReconciliationOutcome::Ready,
            BroadcastStatus::Testing => self.transition_to_live(destination.id, broadcast_id).await,
            BroadcastStatus::Complete => self.reconcile_from_complete(destination.id, broadcast_id).await,
            other => {
                ReconciliationOutcome::Warning(format!("broadcast in unexpected state {:?}, not attempting transition", other))
            }
        }
    }

    async fn transition_to_live(&self, destination_id: i64, broadcast_id: &str) -> ReconciliationOutcome {
        match self.client.transition_broadcast(broadcast_id, BroadcastStatus::Live).await {
            Ok(()) => ReconciliationOutcome::Ready,
            Err(e) => {
                warn!(destination_id, "failed to transition broadcast to live: {}", e);
                ReconciliationOutcome::Warning(e.to_string())
            }
        }
    }

    async fn reconcile_from_complete(&self, destination_id: i64, broadcast_id: &str) -> ReconciliationOutcome {
        if let Err(e) = self.client.transition_broadcast(broadcast_id, BroadcastStatus::Testing).await {
            warn!(destination_id, "failed to transition broadcast to testing: {}", e);
            return ReconciliationOutcome::Warning(e.to_string());
        }

        let deadline = tokio::time::Instant::now() + INTERMEDIATE_STATE_WAIT;
        while tokio::time::Instant::now() < deadline {
            if matches!(self.client.get_broadcast_status(broadcast_id).await, Ok(BroadcastStatus::Testing)) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        self.transition_to_live(destination_id, broadcast_id).await
    }
}
