use anyhow::Context;
use mediagrab::api::server::{ApiServer, AppState};
use mediagrab::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    mediagrab::logging::init();

    let config = ServerConfig::from_env_or_default();
    config
        .ensure_temp_dir()
        .with_context(|| format!("failed to create temp dir {}", config.temp_dir.display()))?;

    tracing::info!("temp dir: {}", config.temp_dir.display());
    tracing::info!("yt-dlp path: {}", config.ytdlp_path);

    let server = ApiServer::new(AppState::new(config));

    // Ctrl-C triggers graceful shutdown
    let cancel_token = server.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            cancel_token.cancel();
        }
    });

    server.run().await?;
    Ok(())
}
