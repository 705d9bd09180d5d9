mod auth;
mod config;
mod db;
mod error;
mod geo;
mod reports;
mod status;
mod users;
mod votes;


use axum::{
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

pub type DbPool = r2d2::Pool<r2d2_sqlite::SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub jwt_secret: String,
    pub default_radius_km: f64,
    pub max_radius_km: f64,
}

impl AppState {
    pub fn new(db: DbPool, config: &Config) -> Self {
        Self {
            db,
            jwt_secret: config.jwt_secret.clone(),
            default_radius_km: config.default_radius_km,
            max_radius_km: config.max_radius_km,
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "message": "UrbAlert API is running" }))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/health", get(health))
        // Session
        .route("/api/auth/session", post(auth::start_session))
        .route("/api/auth/me", get(auth::me).patch(auth::update_profile))
        // Admin
        .route("/api/admin/users", get(users::list_users))
        .route("/api/admin/users/{id}/role", put(users::set_role))
        // Reports
        .route(
            "/api/reports",
            get(reports::list_reports).post(reports::create_report),
        )
        .route("/api/reports/nearby", get(reports::nearby))
        .route("/api/reports/stats", get(reports::report_stats))
        .route(
            "/api/reports/{id}",
            get(reports::get_report)
                .patch(reports::update_report)
                .delete(reports::delete_report),
        )
        .route("/api/reports/{id}/status", put(status::put_status))
        // Votes
        .route(
            "/api/reports/{id}/vote",
            get(votes::get_vote).post(votes::post_vote),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,urbalert_api=debug,tower_http=info")),
        )
        .init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    };

    let manager = db::connection_manager(&config.database_url);
    let pool = r2d2::Pool::new(manager).expect("Failed to create DB pool");

    db::run_migrations(&pool).expect("Failed to run migrations");

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .cors_origin
                .parse::<axum::http::HeaderValue>()
                .expect("Invalid CORS_ORIGIN"),
        )
        .allow_methods(AllowMethods::any())
        .allow_headers(AllowHeaders::any());

    let app = router(AppState::new(pool, &config))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("UrbAlert API listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app).await.expect("Server error");
}
