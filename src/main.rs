use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

mod auth;
mod config;
mod error;
mod handlers;
mod lifecycle;
mod models;
mod shopify;
mod store;
mod upload;

use crate::config::Config;
use crate::shopify::{OrderGateway, ShopifyClient};
use crate::store::{PgStore, RequestStore};
use crate::upload::UploadStore;

/// Shared application state — cheap to clone (all heap behind Arc).
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RequestStore>,
    pub gateway: Arc<dyn OrderGateway>,
    pub uploads: UploadStore,
    pub admin_token: Option<Arc<str>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (ignored in production where env vars are injected)
    dotenv::dotenv().ok();

    // Structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,returns_service=debug".parse().unwrap()),
        )
        .with_target(false)
        .compact()
        .init();

    let config = Config::from_env()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Returns Service  — Rust + Axum      ║");
    info!("║  returns · exchanges · refunds       ║");
    info!("╚══════════════════════════════════════╝");

    info!("Connecting to PostgreSQL...");
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await?;
    info!("Database connection pool established.");

    info!("Running migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations complete.");

    let gateway = ShopifyClient::new(&config.shopify)?;
    let uploads = UploadStore::new(&config.upload_dir).await?;

    if config.admin_token.is_none() {
        warn!("ADMIN_TOKEN is not set — the admin endpoints are UNPROTECTED");
    }

    let state = AppState {
        store: Arc::new(PgStore::new(pool)),
        gateway: Arc::new(gateway),
        uploads: uploads.clone(),
        admin_token: config.admin_token.map(Arc::from),
    };

    let app = build_router(state, &uploads);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: AppState, uploads: &UploadStore) -> Router {
    // ── Admin dashboard (token-guarded) ─────────────────────────────────────
    let admin = Router::new()
        .route("/requests", get(handlers::admin::list_requests))
        .route("/requests/:id", get(handlers::admin::get_request))
        .route("/requests/:id/approve", post(handlers::admin::approve_request))
        .route("/requests/:id/reject", post(handlers::admin::reject_request))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ));

    Router::new()
        // ── Health ──────────────────────────────────────────────────────────
        .route("/health", get(handlers::health))

        // ── Customer returns flow ───────────────────────────────────────────
        .route("/api/returns/lookup", post(handlers::returns::lookup_order))
        .route(
            "/api/returns/create",
            post(handlers::returns::create_return_request)
                // Room for the evidence image on top of the form fields.
                .layer(DefaultBodyLimit::max(8 * 1024 * 1024)),
        )

        // ── Admin ───────────────────────────────────────────────────────────
        .nest("/api/returns/admin", admin)

        // ── Stored evidence images ──────────────────────────────────────────
        .nest_service("/uploads", ServeDir::new(uploads.dir()))

        // ── Middleware ──────────────────────────────────────────────────────
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
