//! Tag Exporter - device tag streams to a metrics scrape endpoint
//!
//! Configuration is read from the environment; see `ServiceConfig`.

use edgetag_core::{EdgeTagError, Result, ServiceConfig, ServiceRuntime};
use std::sync::Arc;
use tag_exporter::ExporterService;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    edgetag_telemetry::init("tag-exporter").map_err(|e| EdgeTagError::Internal(e.to_string()))?;

    info!("Starting tag exporter");

    let config = ServiceConfig::from_env().map_err(|e| {
        error!(error = %e, "Invalid configuration");
        e
    })?;

    let service = Arc::new(ExporterService::new(config)?);
    ServiceRuntime::run(service).await?;

    info!("all stopped");
    Ok(())
}
