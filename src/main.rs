use trustboot::{AppConfig, AppError, Bootstrapper};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// `TRUSTBOOT_LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let json = std::env::var("TRUSTBOOT_LOG_FORMAT").is_ok_and(|v| v == "json");

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trustboot=info".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

fn main() -> anyhow::Result<()> {
    // Initialize logging first
    init_tracing();

    info!("Starting trustboot v{}", env!("CARGO_PKG_VERSION"));

    // A missing .env file is fine; real deployments set the environment directly
    if let Ok(path) = dotenvy::dotenv() {
        info!("Loaded environment from {}", path.display());
    }

    let config = AppConfig::load()?;
    info!(policy = ?config.policy, "Configuration loaded");

    let result = Bootstrapper::new(config.secrets.clone())
        .policy(config.policy)
        .bootstrap();
    result.log_summary();

    let (_result, outcome) = result.into_parts();
    if let Err(failure) = outcome {
        error!("{}", failure);
        return Err(AppError::from(failure).into());
    }

    info!("Trust material ready");
    Ok(())
}
