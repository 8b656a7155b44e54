use docvault_backend::{app, cache::Cache, config, features, state::AppState};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    config::init();
    let config = match config::Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(environment = %config.environment, "starting docvault backend");
    if !config.cookie_secure && !config.is_development() {
        tracing::warn!("COOKIE_SECURE is disabled outside development");
    }

    // 10 base connections + 20 overflow, recycled hourly.
    let pool = PgPoolOptions::new()
        .max_connections(30)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(10))
        .max_lifetime(std::time::Duration::from_secs(3600))
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let cache = Cache::connect(&config.redis_url).await;

    let state = AppState::build(config.clone(), pool.clone(), cache);

    features::rbac::seed::init_database(&pool, &config, &state.rbac)
        .await
        .expect("Failed to seed RBAC data");

    let router = app::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 8000));
    tracing::info!(%addr, "server listening");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listen address");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
