use std::sync::Arc;

use tower_http::{cors::CorsLayer, trace::TraceLayer};

use examina_engine::config::Config;
use examina_engine::db::Database;
use examina_engine::engine::clock::SystemClock;
use examina_engine::engine::evaluator::LlmEvaluator;
use examina_engine::engine::store::MasteryStore;
use examina_engine::engine::LearningEngine;
use examina_engine::logging;
use examina_engine::routes;
use examina_engine::state::AppState;
use examina_engine::workers::WorkerManager;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = logging::init_tracing(&config.log_level);

    let database = match Database::from_url(&config.database_url).await {
        Ok(database) => database,
        Err(err) => {
            tracing::error!(error = %err, "database initialization failed");
            return;
        }
    };

    let evaluator = LlmEvaluator::from_env();
    if !evaluator.is_available() {
        tracing::warn!("LLM evaluator not configured; submissions will need the fallback flag");
    }

    let engine = Arc::new(LearningEngine::new(
        MasteryStore::new(database.pool().clone()),
        Arc::new(evaluator),
        Arc::new(SystemClock),
    ));

    let worker_manager = WorkerManager::start(
        Arc::clone(&engine),
        config.session_cleanup_interval,
        std::time::Duration::from_secs(config.session_max_age_hours.max(1) as u64 * 3600),
    );

    let app = routes::router(AppState::new(engine))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = config.bind_addr();
    tracing::info!(%addr, "examina-engine listening");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, %addr, "bind failed");
            return;
        }
    };

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    if let Err(err) = server.await {
        tracing::error!(error = %err, "server error");
    }

    tracing::info!("HTTP server stopped, shutting down workers");
    worker_manager.stop().await;
    tracing::info!("graceful shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => tracing::error!(error = %err, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
