//! Storefront core server binary

use storefront_core::shared::logging::LoggingUtils;
use storefront_core::{AppConfig, AppResult, HttpServer};
use tracing::info;

#[tokio::main]
async fn main() -> AppResult<()> {
    let config = AppConfig::load()?;
    LoggingUtils::initialize(&config.logging.level)?;

    info!(
        "Starting {} v{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let server = HttpServer::new(config).await?;
    server.run().await
}
