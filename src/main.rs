use haul_cycle::cycle::LoadCycleEngine;
use haul_cycle::directory::{JobDirectory, StaticDirectory, load_directory_from_path};
use haul_cycle::dispatch::Dispatcher;
use haul_cycle::events::{BroadcastPublisher, CycleEventPublisher, DEFAULT_EVENT_CAPACITY};
use haul_cycle::store::MemoryCycleStore;
use haul_cycle::{api, config, state};
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tracing::Level;

fn init_tracing(level: Level) {
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn load_directory(config: &config::Config) -> StaticDirectory {
    match config.sites_path() {
        Some(path) => match load_directory_from_path(path) {
            Ok(directory) => {
                tracing::info!(
                    path = %path.display(),
                    jobs = directory.job_count(),
                    "Site directory loaded"
                );
                directory
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load site directory, starting empty");
                StaticDirectory::new()
            }
        },
        None => {
            tracing::warn!("No site directory configured, every sample will be dropped");
            StaticDirectory::new()
        }
    }
}

fn spawn_live_count_listener(mut counts: watch::Receiver<state::LiveCounts>) {
    tokio::spawn(async move {
        while counts.changed().await.is_ok() {
            let (keys, closed) = {
                let counts = counts.borrow_and_update();
                (counts.len(), counts.values().sum::<usize>())
            };
            tracing::info!(keys, closed, "Live closed-cycle counts updated");
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_default()?;
    init_tracing(config.log_level().unwrap_or(Level::INFO));
    if config.log_level().is_none() {
        tracing::warn!(level = %config.logging.level, "Unknown log level, using info");
    }
    tracing::info!(
        app = %config.app.name,
        config_path = config::DEFAULT_CONFIG_PATH,
        "haul-cycle starting"
    );

    let directory: Arc<dyn JobDirectory> = Arc::new(load_directory(&config));
    let publisher = BroadcastPublisher::new(DEFAULT_EVENT_CAPACITY);
    let mut updates = publisher.subscribe();
    let publisher: Arc<dyn CycleEventPublisher> = Arc::new(publisher);
    let engine = LoadCycleEngine::new(Arc::new(MemoryCycleStore::new()), publisher, directory);
    let state = Arc::new(RwLock::new(state::AppState::new()));
    match state.read() {
        Ok(guard) => spawn_live_count_listener(guard.subscribe_live_counts()),
        Err(_) => tracing::warn!("State lock poisoned, live counts not followed"),
    }
    let dispatcher = Dispatcher::new(engine, state, config.dispatch_settings());

    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(update) => tracing::debug!(
                    job_id = update.job_id,
                    user_id = ?update.user_id,
                    cycles = update.cycles.len(),
                    "Cycle list updated"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Cycle update listener lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let app = api::router(dispatcher);
    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
