//! Tag exporter service wiring

use async_trait::async_trait;
use edgetag_core::{
    DependencyStatus, EdgeService, EdgeTagError, HealthStatus, ReadinessStatus, Result,
    ServiceConfig,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::info;

use crate::api;
use crate::client::HttpDeviceClient;
use crate::processor::UpdateProcessor;
use crate::registry::SeriesRegistry;
use crate::session::SessionState;
use crate::supervisor::SessionSupervisor;

pub const SERVICE_ID: &str = "tag-exporter";

/// State shared between the service and its HTTP handlers
#[derive(Clone)]
pub struct ExporterState {
    pub registry: Arc<SeriesRegistry>,
    pub supervisor: Arc<SessionSupervisor>,
    start_time: Instant,
}

impl ExporterState {
    pub fn new(registry: Arc<SeriesRegistry>, supervisor: Arc<SessionSupervisor>) -> Self {
        Self {
            registry,
            supervisor,
            start_time: Instant::now(),
        }
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            healthy: true,
            service_id: SERVICE_ID.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Ready once at least one device is streaming
    pub fn readiness(&self) -> ReadinessStatus {
        let dependencies: Vec<DependencyStatus> = self
            .supervisor
            .sessions()
            .into_iter()
            .map(|session| {
                let state = session.state();
                DependencyStatus {
                    name: session.name().to_string(),
                    available: state == SessionState::Streaming,
                    state: state.to_string(),
                }
            })
            .collect();

        ReadinessStatus {
            ready: dependencies.iter().any(|d| d.available),
            dependencies,
        }
    }
}

pub struct ExporterService {
    config: ServiceConfig,
    state: ExporterState,
}

impl ExporterService {
    /// Build the registry and one device session per configured device
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let registry = Arc::new(SeriesRegistry::new());
        let processor = Arc::new(UpdateProcessor::new(registry.clone()));
        let supervisor = Arc::new(SessionSupervisor::new(processor, config.retry_backoff));

        for device in &config.devices {
            let client =
                HttpDeviceClient::new(device.clone(), config.request_timeout, config.tls_insecure)?;
            supervisor.add_device(&device.name, Arc::new(client));
        }

        info!(
            devices = config.devices.len(),
            retry_backoff_secs = config.retry_backoff.as_secs(),
            "Initialized tag exporter"
        );

        Ok(Self {
            state: ExporterState::new(registry, supervisor),
            config,
        })
    }

    pub fn state(&self) -> &ExporterState {
        &self.state
    }

    pub fn start_sessions(&self) {
        self.state.supervisor.start();
    }

    /// Serve `/metrics`, `/health` and `/ready` on `listener`
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let app = api::create_router(self.state.clone());
        axum::serve(listener, app).await?;
        Ok(())
    }
}

#[async_trait]
impl EdgeService for ExporterService {
    fn service_id(&self) -> &'static str {
        SERVICE_ID
    }

    async fn shutdown(&self) -> Result<()> {
        info!("Stopping device sessions");
        self.state.supervisor.shutdown().await;
        Ok(())
    }

    /// Binds the scrape listener before any device session starts
    async fn start(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.http_bind).await.map_err(|e| {
            EdgeTagError::Network(format!("failed to bind {}: {}", self.config.http_bind, e))
        })?;

        self.start_sessions();
        info!(addr = %self.config.http_bind, "Metrics exporter is running");
        self.serve(listener).await
    }
}
