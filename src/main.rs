//! Interval Coach - an interval training timer served over HTTP
//!
//! This is the main entry point for the interval-coach application.

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use interval_coach::{
    api::create_router,
    config::Config,
    services::{CommandAudioEngine, DesktopNotifier, FixedBudgetHost},
    state::{AppState, Session},
    tasks::{foreground_clock_task, wake_detector_task},
    utils::shutdown_signal,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("interval_coach={},tower_http=info", config.log_level()))
        .init();

    info!("Starting interval-coach server v{}", env!("CARGO_PKG_VERSION"));
    let workout = config.workout();
    info!(
        "Configuration: host={}, port={}, phase={}s, sets={}, start={}",
        config.host,
        config.port,
        workout.phase_duration(),
        workout.sets,
        workout.start_intensity
    );

    let session = Session::new(workout, config.timing()?, config.tone_duration())?;

    let audio = Arc::new(CommandAudioEngine::new(
        config.tone_command.clone(),
        config.tone_file.clone(),
        config.tone_duration(),
        config.speech_command.clone(),
    ));
    let notifier = Arc::new(DesktopNotifier::new(config.notify_command.clone()));
    let lifecycle_host = Arc::new(FixedBudgetHost::new(
        config.background_budget(),
        config.background_renewals,
    ));

    // Create application state
    let state = Arc::new(AppState::new(
        config.port,
        config.host.clone(),
        session,
        audio,
        notifier,
        lifecycle_host,
    ));

    // Drive the timer while in the foreground
    tokio::spawn(foreground_clock_task(Arc::clone(&state)));

    // Replay host sleeps that arrive without a lifecycle event
    tokio::spawn(wake_detector_task(Arc::clone(&state)));

    // Create HTTP router with all endpoints
    let app = create_router(state);

    // Bind to the specified address
    let addr = config.address();
    let listener = TcpListener::bind(&addr).await?;

    info!("Server running on http://{}", addr);
    info!("Endpoints:");
    info!("  PUT  /workout/config    - Replace the workout while idle");
    info!("  POST /workout/start     - Start or continue the workout");
    info!("  POST /workout/pause     - Pause the workout");
    info!("  POST /workout/stop      - Stop and return to the first set");
    info!("  POST /workout/reset     - Reset to the first set");
    info!("  POST /lifecycle/:phase  - Report active, inactive or suspended");
    info!("  GET  /status            - Check current session");
    info!("  GET  /health            - Health check");

    // Setup graceful shutdown
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
