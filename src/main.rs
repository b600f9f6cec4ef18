use std::error::Error;

use ai_llm_service::telemetry;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Load environment variables from .env file; a missing file is fine,
    // the process environment still applies.
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(telemetry::env_filter_with_level("info", Level::INFO))
        .with(telemetry::layer())
        .with(telemetry::foreign_layer())
        .try_init()?;

    if let Err(e) = dotenv {
        tracing::debug!(error = %e, "no .env file loaded");
    }

    api::start().await?;

    Ok(())
}
