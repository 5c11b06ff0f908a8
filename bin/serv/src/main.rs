use axum::{Router, middleware, routing::get};
use ole_api::{config::ApiConfig, state::ApiState};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from .env and environment variables
    dotenvy::dotenv().ok();
    let config = ApiConfig::from_env()?;

    ole_api::tracing::init_tracing(&config.env)?;

    // Initialize Prometheus metrics exporter
    let metrics_handle = ole_api::metrics::init_metrics()?;
    tracing::info!("Prometheus metrics exporter initialized");

    // Discover the identity provider and build the application state
    let state = ApiState::new(&config).await?;

    // Start background jobs for periodic maintenance
    let job_handles = ole_api::jobs::start_background_jobs(state.sessions.clone());
    tracing::info!("Background jobs started (expired session cleanup)");

    // Configure CORS with allowed origins from config
    let cors = ole_api::middleware::cors::create_cors_layer(config.parsed_allowed_origins());

    // Configure HTTP request/response tracing
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Metrics endpoint sits outside the session and access control layers
    let metrics_app = Router::new()
        .route("/metrics", get(ole_api::metrics::metrics_handler))
        .with_state(metrics_handle);

    let app = ole_api::router::router(&state)
        .merge(metrics_app)
        .with_state(state)
        .layer(cors)
        .layer(trace_layer)
        .layer(middleware::from_fn(ole_api::metrics::track_metrics))
        .layer(middleware::from_fn(
            ole_api::middleware::request_id::request_id_middleware,
        ));

    // Apply security headers (X-Content-Type-Options, X-Frame-Options, HSTS)
    let app =
        ole_api::middleware::security_headers::apply_security_headers(app, config.env.clone());

    tracing::info!("Environment: {:?}", config.env);
    tracing::info!(
        registration_id = %config.oidc_registration_id,
        "Login at {}/oauth2/authorization/{}",
        config.normalized_base_url(),
        config.oidc_registration_id
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server running on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for handle in job_handles {
        handle.abort();
    }
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
