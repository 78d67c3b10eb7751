pub mod auth;
pub mod error;
pub mod models;
pub mod views;
pub mod votes;

use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::JwtKeys;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub jwt: JwtKeys,
}

pub async fn connect_db(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(views::router())
        .merge(votes::router())
        .merge(auth::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> &'static str {
    "Polls backend - use /health to check status"
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    // Check DB connection
    match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => Json(serde_json::json!({
            "status": "ok",
            "database": "connected"
        })),
        Err(_) => Json(serde_json::json!({
            "status": "error",
            "database": "disconnected"
        })),
    }
}
