//! Per-destination health watchdog (§4.8, peripheral). Polls platform
//! stream health on its own schedule and, on sustained unhealthiness,
//! invokes reconciliation — but never touches the Timeline Executor
//! directly, preserving the separation §9 calls out explicitly.

use crate::destinations::{BroadcastStatus, DestinationLifecycle, ReconciliationOutcome, YouTubeClient};
use crate::events::{Event, EventBus};
use crate::model::Destination;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of an on-demand `destinations.validate_watchdog` call (§6.1):
/// the stream-health check and a reconciliation pass, run once rather than
/// on the watchdog's periodic schedule.
#[derive(Debug, Clone)]
pub struct WatchdogValidation {
    pub stream_check: bool,
    pub broadcast_check: ReconciliationOutcome,
    pub status: String,
}

/// A stream-health check abstracted behind a trait so the watchdog is
/// testable without a real platform API call.
#[async_trait::async_trait]
pub trait StreamHealthCheck: Send + Sync {
    async fn is_healthy(&self, destination: &Destination) -> bool;
}

pub struct DestinationWatchdog {
    lifecycle: Arc<DestinationLifecycle>,
    health_check: Arc<dyn StreamHealthCheck>,
    bus: Arc<EventBus>,
}

impl DestinationWatchdog {
    pub fn new(lifecycle: Arc<DestinationLifecycle>, health_check: Arc<dyn StreamHealthCheck>, bus: Arc<EventBus>) -> Self {
        Self { lifecycle, health_check, bus }
    }

    pub fn spawn(self: Arc<Self>, destination: Destination) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut consecutive_unhealthy = 0u32;
            loop {
                tokio::time::sleep(std::time::Duration::from_secs(destination.watchdog.check_interval_secs)).await;

                let healthy = self.health_check.is_healthy(&destination).await;
                if healthy {
                    consecutive_unhealthy = 0;
                    continue;
                }

                consecutive_unhealthy += 1;
                warn!(
                    destination_id = destination.id,
                    consecutive_unhealthy, "destination stream health check failed"
                );

                if consecutive_unhealthy >= destination.watchdog.unhealthy_threshold {
                    info!(destination_id = destination.id, "unhealthy threshold reached, invoking reconciliation");
                    let outcome = self.lifecycle.reconcile(&destination).await;
                    self.bus.publish(Event::DestinationReconciled {
                        destination_id: destination.id,
                        outcome: format!("{:?}", outcome),
                    });
                    consecutive_unhealthy = 0;
                }
            }
        })
    }

    /// `destinations.validate_watchdog(destination_id)` (§6.1): a one-shot
    /// check outside the periodic schedule, used by the UI's "test this
    /// destination" action.
    pub async fn validate(&self, destination: &Destination) -> WatchdogValidation {
        let stream_check = self.health_check.is_healthy(destination).await;
        let broadcast_check = self.lifecycle.reconcile(destination).await;
        let status = match (&stream_check, &broadcast_check) {
            (true, ReconciliationOutcome::Ready) => "ok".to_string(),
            (true, ReconciliationOutcome::Skipped) => "stream ok, no broadcast lifecycle configured".to_string(),
            (false, _) => "stream check failed".to_string(),
            (_, ReconciliationOutcome::Warning(reason)) => format!("broadcast check warned: {reason}"),
        };
        WatchdogValidation { stream_check, broadcast_check, status }
    }
}

/// Treats a destination as healthy when its YouTube broadcast is `testing`
/// or `live`; destinations with no broadcast configured are reported
/// healthy (nothing to watch). Grounded on the same client used for
/// reconciliation — the watchdog has no independent RTMP-ingest probe, so
/// broadcast status is the only signal available for platform health.
pub struct YouTubeStreamHealthCheck {
    client: Arc<dyn YouTubeClient>,
}

impl YouTubeStreamHealthCheck {
    pub fn new(client: Arc<dyn YouTubeClient>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl StreamHealthCheck for YouTubeStreamHealthCheck {
    async fn is_healthy(&self, destination: &Destination) -> bool {
        let Some(youtube) = &destination.youtube else {
            return true;
        };
        let Some(broadcast_id) = &youtube.broadcast_id else {
            return true;
        };
        matches!(
            self.client.get_broadcast_status(broadcast_id).await,
            Ok(BroadcastStatus::Testing) | Ok(BroadcastStatus::Live)
        )
    }
}
