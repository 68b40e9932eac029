use std::time::Duration;

use anyhow::Result;
use futures::future::join_all;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use herald_notification_service::config::Settings;
use herald_notification_service::queue::{create_job_store, JobStoreBackend};
use herald_notification_service::redis_pool::create_redis_pool;
use herald_notification_service::server::{create_app, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    init_tracing();

    // Load configuration
    let settings = Settings::new()?;
    tracing::info!("Configuration loaded");

    // Connect Redis when the durable backend is selected
    let redis_conn = if settings.queue.backend == "redis" {
        match create_redis_pool(&settings.redis).await {
            Ok(conn) => Some(conn),
            Err(e) => {
                tracing::warn!(error = %e, "Redis connection failed");
                None
            }
        }
    } else {
        None
    };

    // Create the job store and application state
    let store = create_job_store(&settings.queue, redis_conn);
    let state = AppState::new(settings.clone(), store.clone());
    tracing::info!("Application state initialized");

    // Shutdown signal shared by workers and background tasks
    let (shutdown_tx, _) = broadcast::channel(1);

    // Start per-channel worker pools
    let mut worker_handles = Vec::new();
    worker_handles.extend(state.email_pool.start(&shutdown_tx));
    worker_handles.extend(state.whatsapp_pool.start(&shutdown_tx));

    // Start the retention cleanup task
    let cleanup_handle = {
        let store = store.clone();
        let interval = Duration::from_secs(settings.queue.cleanup_interval_seconds);
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = store.cleanup_finished().await {
                            tracing::warn!(error = %e, "Retention cleanup failed");
                        }
                    }
                }
            }
        })
    };

    // Create Axum app
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(shutdown_tx.clone()))
        .await?;

    // Wait for background tasks to finish
    tracing::info!("Waiting for workers to finish...");
    let _ = join_all(worker_handles).await;
    let _ = cleanup_handle.await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal_handler(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    // Stop workers and background tasks
    let _ = shutdown_tx.send(());
}
