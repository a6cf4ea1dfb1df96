use crate::config::Config;
use crate::destinations::DestinationWatchdog;
use crate::health::HealthMonitor;
use crate::ptz::PtzController;
use crate::router::StreamRouter;
use crate::store::{SqliteCameraRepository, SqliteDestinationRepository, SqliteTimelineRepository};
use std::sync::Arc;

/// Everything a handler needs, grouped the way the teacher's `AppState`
/// groups its `SharedState` fields: one `Arc` per long-lived collaborator,
/// cheap to clone, no interior knowledge of the HTTP layer.
pub struct AppState {
    pub config: Config,
    pub router: Arc<StreamRouter>,
    pub ptz: Arc<PtzController>,
    pub health: Arc<HealthMonitor>,
    pub watchdog: Arc<DestinationWatchdog>,
    pub cameras: Arc<SqliteCameraRepository>,
    pub destinations: Arc<SqliteDestinationRepository>,
    pub timelines: Arc<SqliteTimelineRepository>,
}
