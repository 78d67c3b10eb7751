use std::{env, net::SocketAddr};

use polls::{AppState, app, auth::JwtKeys, connect_db};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

    // Setup database connection
    let db = connect_db(&database_url).await?;

    // Schema must exist before the first request.
    sqlx::migrate!("./migrations").run(&db).await?;

    let state = AppState {
        db,
        jwt: JwtKeys::from_secret(jwt_secret.as_bytes()),
    };

    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server running on http://{bind_addr}");

    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
