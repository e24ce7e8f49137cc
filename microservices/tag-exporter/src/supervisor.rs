//! Runs one session per configured device and stops them together

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::client::DeviceClient;
use crate::processor::UpdateProcessor;
use crate::session::{DeviceSession, SessionHandle};

pub struct SessionSupervisor {
    processor: Arc<UpdateProcessor>,
    retry_backoff: Duration,
    cancel: watch::Sender<bool>,
    handles: Mutex<Vec<SessionHandle>>,
    pending: Mutex<Vec<DeviceSession>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionSupervisor {
    pub fn new(processor: Arc<UpdateProcessor>, retry_backoff: Duration) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            processor,
            retry_backoff,
            cancel,
            handles: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Prepare a session for `name`; it runs once [`start`](Self::start) is called
    pub fn add_device(&self, name: &str, client: Arc<dyn DeviceClient>) -> SessionHandle {
        let session = DeviceSession::new(
            name,
            client,
            self.processor.clone(),
            self.retry_backoff,
            self.cancel.subscribe(),
        );
        let handle = session.handle();
        self.handles.lock().push(handle.clone());
        self.pending.lock().push(session);
        handle
    }

    /// Spawn every prepared session as its own task
    pub fn start(&self) {
        let sessions = std::mem::take(&mut *self.pending.lock());
        let mut tasks = self.tasks.lock();
        for session in sessions {
            let name = session.handle().name().to_string();
            tasks.push(tokio::spawn(session.run()));
            info!(device = %name, "Device session started");
        }
    }

    pub fn sessions(&self) -> Vec<SessionHandle> {
        self.handles.lock().clone()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Signal cancellation, close every open connection and wait for all
    /// sessions to stop.
    ///
    /// Cancellation is set before the connections are closed: a session that
    /// opens a connection concurrently then sees the flag before it starts
    /// reading.
    pub async fn shutdown(&self) {
        self.cancel.send_replace(true);

        for handle in self.sessions() {
            if handle.close_connection() {
                info!(device = %handle.name(), "Closed active connection");
            }
        }

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                error!("Device session task failed: {}", e);
            }
        }

        self.pending.lock().clear();
        info!("All device sessions stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SeriesRegistry;
    use crate::session::tests::{wait_until, MockClient};
    use crate::session::SessionState;
    use edgetag_core::EdgeTagError;
    use std::sync::atomic::Ordering;

    fn supervisor() -> SessionSupervisor {
        let processor = Arc::new(UpdateProcessor::new(Arc::new(SeriesRegistry::new())));
        SessionSupervisor::new(processor, Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_sessions_run_independently() {
        let supervisor = supervisor();
        let healthy = Arc::new(MockClient::with_streams(vec![vec![Ok(
            br#"[{"prvdName":"p","srcName":"s","tagName":"level","dataType":"uint16","dataValue":3}]"#.to_vec(),
        )]]));
        let broken = Arc::new(MockClient {
            failing_logins: usize::MAX,
            ..Default::default()
        });

        let a = supervisor.add_device("plantA", healthy.clone());
        let b = supervisor.add_device("plantB", broken.clone());
        assert_eq!(a.state(), SessionState::Disconnected);
        supervisor.start();

        wait_until("healthy device frame", || a.frames_received() == 1).await;
        wait_until("broken device retrying", || broken.logins.load(Ordering::SeqCst) >= 3).await;
        assert_eq!(a.state(), SessionState::Streaming);
        assert_ne!(b.state(), SessionState::Streaming);
        assert_eq!(supervisor.sessions().len(), 2);

        supervisor.shutdown().await;

        assert!(supervisor.is_cancelled());
        assert_eq!(a.state(), SessionState::Stopped);
        assert_eq!(b.state(), SessionState::Stopped);
        assert_eq!(healthy.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_unblocks_every_reader() {
        let supervisor = supervisor();
        let clients: Vec<Arc<MockClient>> = (0..4).map(|_| Arc::new(MockClient::default())).collect();
        let handles: Vec<SessionHandle> = clients
            .iter()
            .enumerate()
            .map(|(i, client)| supervisor.add_device(&format!("dev{}", i), client.clone()))
            .collect();
        supervisor.start();

        for handle in &handles {
            wait_until("streaming", || handle.state() == SessionState::Streaming).await;
        }

        tokio::time::timeout(Duration::from_secs(5), supervisor.shutdown())
            .await
            .expect("shutdown hung on a blocked read");

        assert!(handles.iter().all(|h| h.state() == SessionState::Stopped));
        assert!(clients.iter().all(|c| c.closed.load(Ordering::SeqCst) == 1));
    }

    #[tokio::test]
    async fn test_stream_failure_stays_isolated() {
        let supervisor = supervisor();
        let flaky = Arc::new(MockClient::with_streams(vec![vec![Err(EdgeTagError::Stream(
            "reset".to_string(),
        ))]]));
        let steady = Arc::new(MockClient::default());

        let flaky_handle = supervisor.add_device("flaky", flaky.clone());
        let steady_handle = supervisor.add_device("steady", steady.clone());
        supervisor.start();

        wait_until("flaky reconnect", || flaky.connects.load(Ordering::SeqCst) == 2).await;
        wait_until("flaky streaming", || flaky_handle.state() == SessionState::Streaming).await;
        assert_eq!(steady.logins.load(Ordering::SeqCst), 1);
        assert_eq!(steady_handle.state(), SessionState::Streaming);

        supervisor.shutdown().await;
    }
}
