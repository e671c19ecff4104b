//! LessonForge API Gateway
//!
//! The main entry point for all external API requests.
//! Handles:
//! - Authentication
//! - Streaming generation sessions over WebSocket
//! - Offline generation, validation and approvals
//! - Rate limiting
//! - Observability (logging, metrics, tracing)

mod handlers;
mod middleware;

use axum::{
    extract::FromRef,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
    Router,
};
use lessonforge_common::{
    auth::JwtManager,
    cache::{Cache, CacheConfig},
    config::AppConfig,
    db::{ContentStore, DbPool, MemoryStore, Repository},
    generation::{Pipeline, QualityAssessor, SessionController},
    llm::create_language_model,
    metrics,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use middleware::rate_limit::{create_rate_limiter, spawn_pruning, UserRateLimiter};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn ContentStore>,
    pub sessions: SessionController,
    pub pipeline: Pipeline,
    pub jwt: Arc<JwtManager>,
    pub limiter: Option<Arc<UserRateLimiter>>,
}

impl FromRef<AppState> for Arc<JwtManager> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.jwt)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    init_tracing(&config);
    info!("Starting LessonForge API Gateway v{}", lessonforge_common::VERSION);

    let config = Arc::new(config);

    // Initialize metrics
    if config.observability.metrics_port > 0 {
        let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(metrics_addr)
            .set_buckets_for_metric(
                Matcher::Full(format!("{}_request_duration_seconds", metrics::METRICS_PREFIX)),
                metrics::LATENCY_BUCKETS,
            )?
            .set_buckets_for_metric(
                Matcher::Full(format!("{}_session_duration_seconds", metrics::METRICS_PREFIX)),
                metrics::GENERATION_BUCKETS,
            )?
            .set_buckets_for_metric(
                Matcher::Full(format!("{}_llm_duration_seconds", metrics::METRICS_PREFIX)),
                metrics::GENERATION_BUCKETS,
            )?
            .install()?;
        info!("Metrics exporter listening on {}", metrics_addr);
    }
    metrics::register_metrics();

    let store = connect_store(&config).await?;
    let model = create_language_model(&config.llm)?;

    let mut assessor = QualityAssessor::new(Arc::clone(&model), &config.llm);
    if let Some(cache_config) = CacheConfig::from_redis(&config.redis) {
        match Cache::new(cache_config).await {
            Ok(cache) => assessor = assessor.with_cache(Arc::new(cache)),
            Err(e) => warn!(error = %e, "Redis unavailable, quality results will not be cached"),
        }
    }

    let sessions = SessionController::new(
        Arc::clone(&store),
        Arc::clone(&model),
        Arc::new(assessor),
        &config.llm,
        &config.generation,
    );
    let pipeline = Pipeline::new(Arc::clone(&store), model, &config.llm, &config.generation);

    let limiter = config.rate_limit.enabled.then(|| {
        create_rate_limiter(config.rate_limit.requests_per_second, config.rate_limit.burst)
    });
    if let Some(limiter) = &limiter {
        spawn_pruning(Arc::clone(limiter), config.prune_interval());
    }

    // Create app state
    let state = AppState {
        config: config.clone(),
        store,
        sessions,
        pipeline,
        jwt: Arc::new(JwtManager::from_config(&config.auth)?),
        limiter,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    if config.observability.json_logging {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

/// Postgres with row-level security, or the in-memory store for local runs
async fn connect_store(config: &AppConfig) -> Result<Arc<dyn ContentStore>, Box<dyn std::error::Error>> {
    let url = config.database.url.trim();
    if url.is_empty() || url == "memory" {
        warn!("No database configured, using in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    }

    info!("Connecting to database...");
    let pool = DbPool::new(&config.database).await?;
    Ok(Arc::new(Repository::new(pool).with_rls_role(&config.database.rls_role)))
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // Generation routes call the language model and are rate limited per user
    let generation_routes = Router::new()
        .route("/generate/stream", get(handlers::stream::generate_stream))
        .route("/prompts/{id}/generate", post(handlers::prompts::generate_content))
        .route("/content/{id}/validate", post(handlers::content::validate_content))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit_middleware,
        ));

    // API routes
    let api_routes = Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Prompt endpoints
        .route("/sections/{id}/prompt", post(handlers::prompts::synthesize_prompt))
        .route("/prompts/{id}", patch(handlers::prompts::update_prompt))
        .route("/prompts/{id}/approve", post(handlers::prompts::approve_prompt))

        // Content and validation approvals
        .route("/content/{id}/approve", post(handlers::content::approve_content))
        .route("/validations/{id}/approve", post(handlers::content::approve_validation))

        // Stage gate
        .route("/projects/{id}/advance", post(handlers::projects::advance_project))

        // Model-backed routes run past the plain request timeout
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .merge(generation_routes);

    // Compose the app
    Router::new()
        .nest("/v1", api_routes)
        .layer(from_fn(middleware::metrics::track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
