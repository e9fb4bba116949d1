use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use worker::config::WorkerConfig;
use worker::handlers::build_router;
use worker::reaper::run_reaper_loop;
use worker::state::AppState;
use worker::TaskManager;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("worker=debug,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = WorkerConfig::from_env();
    info!("config del worker: {:?}", config);

    let task_manager = Arc::new(TaskManager::new(&config.node_id));

    // reaper de tareas en segundo plano
    let reaper_manager = task_manager.clone();
    let reaper_config = config.clone();
    tokio::spawn(async move {
        run_reaper_loop(reaper_manager, reaper_config).await;
    });

    let app = build_router(AppState::new(task_manager));

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("no se pudo escuchar en {}", config.bind_addr))?;
    info!(
        "worker {} escuchando en {}",
        config.node_id,
        listener.local_addr()?
    );

    axum::serve(listener, app).await?;
    Ok(())
}
