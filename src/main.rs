mod app;
mod auth;
mod billing;
mod config;
mod db;
mod error;
mod generation;
mod nutrition;
mod recipes;
mod state;
mod storage;

use crate::state::AppState;

fn init_logging() {
    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "recipebox=debug,axum=info,tower_http=info,sqlx=warn".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let app_state = AppState::init().await?;
    db::migrate(&app_state.db).await;

    app::serve(app::build_app(app_state)).await
}
