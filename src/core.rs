//! Process-wide wiring (§9): a single `Core` value constructed once at
//! startup and carried through `Init → Run → Shutdown`. Every long-lived
//! collaborator (relay pool, timeline executor table, stream router,
//! preview health) is a field here rather than a free-standing singleton.

use crate::config::Config;
use crate::destinations::{
    DestinationLifecycle, DestinationWatchdog, GoogleOAuthTokenProvider, HttpYouTubeClient, NullYouTubeClient,
    YouTubeClient, YouTubeStreamHealthCheck,
};
use crate::encoder::EncoderDriver;
use crate::events::EventBus;
use crate::health::HealthMonitor;
use crate::media_server::MediaServerClient;
use crate::ptz::PtzController;
use crate::relay::RelayPool;
use crate::router::StreamRouter;
use crate::store::{CameraRepository, DestinationRepository, SqliteCameraRepository, SqliteDestinationRepository, SqliteTimelineRepository};
use crate::timeline::TimelineExecutor;
use crate::web::AppState;
use anyhow::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

pub struct Core {
    pub config: Config,
    pub app_state: Arc<AppState>,
    health_task: JoinHandle<()>,
    watchdog_tasks: Vec<JoinHandle<()>>,
}

impl Core {
    /// Init: opens the store, constructs every collaborator, and spawns the
    /// process-wide background tasks (Camera Health Monitor, per-destination
    /// watchdogs).
    pub async fn init(config: Config) -> Result<Self> {
        let pool = crate::store::connect(&config.database_url).await?;

        let bus = Arc::new(EventBus::new());
        let driver = Arc::new(EncoderDriver::with_tokio_spawner(bus.clone()));
        let relay_pool = Arc::new(RelayPool::new(driver.clone(), bus.clone(), config.relay.encoder_binary.clone()));
        let ptz = Arc::new(PtzController::new());
        let health = Arc::new(HealthMonitor::new(bus.clone(), relay_pool.clone()));
        let executor = Arc::new(TimelineExecutor::new(
            driver.clone(),
            bus.clone(),
            relay_pool.clone(),
            ptz.clone(),
            config.relay.encoder_binary.clone(),
        ));
        let media_server = Arc::new(MediaServerClient::new(
            config.preview.preview_rtmp_host.clone(),
            config.preview.preview_hls_port,
            config.preview.preview_api_port,
        ));

        let youtube_client = build_youtube_client(&config);
        let destination_lifecycle = Arc::new(DestinationLifecycle::new(youtube_client.clone()));
        let router = Arc::new(StreamRouter::new(executor, media_server, destination_lifecycle.clone(), bus.clone()));
        let stream_health_check = Arc::new(YouTubeStreamHealthCheck::new(youtube_client));
        let watchdog = Arc::new(DestinationWatchdog::new(destination_lifecycle, stream_health_check, bus));

        let cameras_repo = Arc::new(SqliteCameraRepository::new(pool.clone()));
        let destinations_repo = Arc::new(SqliteDestinationRepository::new(pool.clone()));
        let timelines_repo = Arc::new(SqliteTimelineRepository::new(pool.clone()));

        let known_cameras = CameraRepository::list(&*cameras_repo).await?;
        info!(count = known_cameras.len(), "starting camera health monitor");
        let health_task = health.clone().spawn(known_cameras);

        let known_destinations = DestinationRepository::list(&*destinations_repo).await?;
        info!(count = known_destinations.len(), "starting destination watchdogs");
        let watchdog_tasks = known_destinations
            .into_iter()
            .map(|destination| watchdog.clone().spawn(destination))
            .collect();

        let app_state = Arc::new(AppState {
            config: config.clone(),
            router,
            ptz,
            health,
            watchdog,
            cameras: cameras_repo,
            destinations: destinations_repo,
            timelines: timelines_repo,
        });

        Ok(Self { config, app_state, health_task, watchdog_tasks })
    }

    /// Run: serves the command-control API until the process is asked to
    /// shut down (ctrl-c or a terminating signal).
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.server.bind_ip, self.config.server.web_port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(%addr, "command-control API listening");

        let app = crate::web::router(self.app_state.clone());
        let health_task = self.health_task;
        let watchdog_tasks = self.watchdog_tasks;

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("shutdown signal received");
            })
            .await?;

        Self::shutdown(health_task, watchdog_tasks).await;
        Ok(())
    }

    /// Shutdown: cancels every supervisor task. Subprocesses owned by those
    /// tasks are reaped by their own wait/kill tasks, which are dropped along
    /// with the `TimelineExecutor`/`RelayPool` they belong to.
    async fn shutdown(health_task: JoinHandle<()>, watchdog_tasks: Vec<JoinHandle<()>>) {
        health_task.abort();
        for task in watchdog_tasks {
            task.abort();
        }
        info!("core shutdown complete");
    }
}

fn build_youtube_client(config: &Config) -> Arc<dyn YouTubeClient> {
    let oauth = &config.youtube_oauth;
    match (&oauth.client_id, &oauth.client_secret, &oauth.refresh_token) {
        (Some(client_id), Some(client_secret), Some(refresh_token)) => {
            let token_provider = Arc::new(GoogleOAuthTokenProvider::new(
                client_id.clone(),
                client_secret.clone(),
                refresh_token.clone(),
            ));
            Arc::new(HttpYouTubeClient::new(
                "https://www.googleapis.com/youtube/v3".to_string(),
                token_provider,
            ))
        }
        _ => {
            info!("no YouTube OAuth credentials configured; destination reconciliation will warn and proceed");
            Arc::new(NullYouTubeClient)
        }
    }
}
