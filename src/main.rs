use mp3rapide::config::AppConfig;
use mp3rapide::logging::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;
    init_tracing(&config.logging)?;

    tracing::info!(providers = ?config.providers, "starting mp3rapide");
    mp3rapide::run(config).await
}
