use skywatch_backend::config::{self, ConfigOrigin};
use skywatch_backend::model::elements::{DiskStore, ElementCache, SourceChain};
use skywatch_backend::model::orbit::Sgp4Provider;
use skywatch_backend::module::result_cache::ResultCache;
use skywatch_backend::module::scheduled::{ScheduledTaskConfig, ScheduledTaskManager};
use skywatch_backend::service::{self, AppState};

use anyhow::Result;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Config path may be given as the first argument
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let (config, origin) = config::read_config(&config_path)?;

    let _logging_guard = skywatch_backend::logging::init_logging(&config.log_dir, "skywatch-backend", &config.log_level)?;

    tracing::info!("Skywatch backend starting...");
    match origin {
        ConfigOrigin::File(path) => tracing::info!("Loaded config from {}", path.display()),
        ConfigOrigin::Defaults(path) => tracing::warn!("Config file {} not found, using defaults", path.display()),
    }
    tracing::info!("Server will listen on {}", config.server_address());

    let chain = SourceChain::from_config(&config.sources, &config.http)?;
    tracing::info!("Element sources: {}", chain.source_names().join(" -> "));

    let disk = DiskStore::new(&config.cache.data_dir);
    disk.ensure_dir().await?;

    let ttl = chrono::Duration::minutes(config.cache.element_ttl_minutes as i64);
    let cache = Arc::new(ElementCache::new(chain, disk, ttl));

    let norad_ids: Vec<_> = config.satellites.iter().map(|sat| sat.norad_id).collect();
    cache.warm_from_disk(&norad_ids).await;

    let mut task_manager = ScheduledTaskManager::new(
        ScheduledTaskConfig {
            prefetch_interval_minutes: config.cache.prefetch_interval_minutes,
            norad_ids,
            perform_initial_update: true,
        },
        cache.clone(),
    );
    task_manager.start_all();

    let state = Arc::new(AppState {
        cache,
        provider: Arc::new(Sgp4Provider::new()),
        results: ResultCache::new(std::time::Duration::from_secs(config.cache.result_ttl_seconds)),
        satellites: config.satellites.clone(),
        limits: config.limits.clone(),
    });

    let app = service::router(state);
    let listener = tokio::net::TcpListener::bind(config.server_address()).await?;
    tracing::info!("HTTP server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    task_manager.shutdown().await;
    Ok(())
}
