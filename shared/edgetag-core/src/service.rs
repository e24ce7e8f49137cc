//! Service lifecycle shared by edgetag binaries

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tracing::{error, info, warn};

use crate::error::{EdgeTagError, Result};

/// Health status for liveness checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub service_id: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Readiness status for readiness checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessStatus {
    pub ready: bool,
    pub dependencies: Vec<DependencyStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub name: String,
    pub available: bool,
    pub state: String,
}

/// Lifecycle contract every long-running edgetag service implements
#[async_trait]
pub trait EdgeService: Send + Sync + 'static {
    fn service_id(&self) -> &'static str;

    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Stop background work and wait for it to finish
    async fn shutdown(&self) -> Result<()>;

    /// Start the service; may run until the process is stopped
    async fn start(&self) -> Result<()>;
}

/// Runs a service until SIGINT/SIGTERM, then shuts it down gracefully
pub struct ServiceRuntime;

impl ServiceRuntime {
    /// Returns an error when `start` fails before a shutdown signal arrives;
    /// the service is shut down first.
    pub async fn run<S: EdgeService>(service: Arc<S>) -> Result<()> {
        let start_time = Instant::now();

        info!(
            service_id = service.service_id(),
            version = service.version(),
            "Starting service"
        );

        let service_clone = service.clone();
        let mut service_handle = tokio::spawn(async move { service_clone.start().await });

        let outcome = tokio::select! {
            _ = Self::wait_for_shutdown() => {
                info!("Shutdown signal received, gracefully stopping...");
                Ok(())
            }
            joined = &mut service_handle => match joined {
                Ok(Ok(())) => {
                    warn!("Service returned before a shutdown signal");
                    Ok(())
                }
                Ok(Err(e)) => {
                    error!(error = %e, code = e.error_code(), "Service failed to run");
                    Err(e)
                }
                Err(e) => Err(EdgeTagError::Internal(format!("service task failed: {}", e))),
            },
        };

        if let Err(e) = service.shutdown().await {
            warn!("Error during shutdown: {}", e);
        }

        service_handle.abort();

        info!(
            uptime_seconds = start_time.elapsed().as_secs(),
            "Service stopped"
        );

        outcome
    }

    async fn wait_for_shutdown() {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!("Failed to listen for SIGTERM: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FailingStart {
        shutdowns: AtomicUsize,
    }

    #[async_trait]
    impl EdgeService for FailingStart {
        fn service_id(&self) -> &'static str {
            "failing-start"
        }

        async fn shutdown(&self) -> Result<()> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn start(&self) -> Result<()> {
            Err(EdgeTagError::Network("Address already in use".to_string()))
        }
    }

    #[tokio::test]
    async fn test_failed_start_stops_runtime() {
        let service = Arc::new(FailingStart::default());

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            ServiceRuntime::run(service.clone()),
        )
        .await
        .expect("runtime kept waiting after start failed");

        assert!(matches!(result, Err(EdgeTagError::Network(_))));
        assert_eq!(service.shutdowns.load(Ordering::SeqCst), 1);
    }
}
