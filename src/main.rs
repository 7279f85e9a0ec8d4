/// API сервер для модели оценки стресса

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use stress_ml::{
    api::{self, AppState},
    config::ServiceConfig,
    StressPredictor,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env().context("invalid service configuration")?;

    // Инициализация логирования: RUST_LOG важнее LOG_LEVEL
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    // Модель загружается один раз и дальше только читается
    tracing::info!("Initializing predictor...");
    let predictor = tokio::task::spawn_blocking({
        let path = config.model_path.clone();
        let seed = config.fallback_seed;
        move || StressPredictor::load_or_fallback(path, seed)
    })
    .await
    .context("predictor initialization panicked")??;
    tracing::info!("Predictor initialized successfully ({:?})", predictor.origin());

    let state = AppState::new(Arc::new(predictor), config.environment);
    let app = api::router(state, &config);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!(
        "Starting Stress Detection API (environment={}, debug={})",
        config.environment,
        config.environment.is_development()
    );
    tracing::info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
