//! jobq API server: local driver, background poller, REST routes.

use jobq_api::server::{self, AppState};
use jobq_driver::LocalDriver;
use jobq_scheduler::{DriverRegistry, InMemoryScheduler, Poller, SchedulerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SchedulerConfig::from_env()?;
    tracing::info!(
        max_running = config.max_running,
        max_submit = config.max_submit,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        "scheduler configured"
    );
    let registry = DriverRegistry::new(Arc::new(LocalDriver::new()));
    let poll_interval = config.poll_interval;
    let scheduler = Arc::new(InMemoryScheduler::new(registry, config));
    let poller = Poller::spawn(Arc::clone(&scheduler), poll_interval);

    let app = server::router(Arc::new(AppState {
        scheduler: Arc::clone(&scheduler),
    }));
    let addr: SocketAddr = std::env::var("JOBQ_LISTEN")
        .unwrap_or_else(|_| "0.0.0.0:8002".to_string())
        .parse()?;
    tracing::info!("jobq API listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(addr).await?,
        app.into_make_service(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;

    poller.shutdown().await;
    let cancelled = scheduler.cancel_all().await;
    tracing::info!(cancelled, "shutdown complete");
    Ok(())
}
