use tracing_subscriber::EnvFilter;
use usercentrics_injector::config::AppConfig;
use usercentrics_injector::server::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = AppConfig::from_env()?;
    let consent = config.load_consent()?;
    match &consent {
        Some(_) => tracing::info!(path = ?config.consent_config, "loaded consent configuration"),
        None => tracing::warn!("CONSENT_CONFIG not set; pages are served without consent assets"),
    }

    let addr = config.bind_addr;
    let state = AppState::new(config, consent);
    tracing::info!(%addr, "starting usercentrics-injector server");
    server::run(addr, state).await?;
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
