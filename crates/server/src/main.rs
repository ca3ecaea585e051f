use std::net::SocketAddr;

use server::{
    build_router, build_state,
    config::{load_settings, prepare_database_url},
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut settings = load_settings();
    settings.database_url = prepare_database_url(&settings.database_url)?;

    let state = build_state(&settings).await.map_err(|error| {
        error!(
            database_url = %settings.database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let app = build_router(state);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(
        %addr,
        breakdown_chance = settings.engine.breakdown_chance,
        drive_time_scale = settings.engine.drive_time_scale,
        "server listening"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
