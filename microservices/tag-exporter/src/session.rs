//! Per-device session: login, connect, stream, reconnect
//!
//! ```text
//! Disconnected -> Authenticating -> Connecting -> Streaming
//!      ^               |                |             |
//!      +--- backoff ---+----------------+-------------+
//! ```
//!
//! The session stops once cancellation is observed at the top of the retry
//! loop or between frames. A read blocked on the device is only released by
//! closing the connection through [`SessionHandle::close_connection`].

use edgetag_core::EdgeTagError;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, warn};

use crate::client::{DeviceClient, TagStream};
use crate::processor::UpdateProcessor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Authenticating,
    Connecting,
    Streaming,
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Authenticating => "authenticating",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[derive(Default)]
struct SessionStats {
    login_attempts: AtomicU64,
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
}

/// Shared view of a device session, held by the supervisor
#[derive(Clone)]
pub struct SessionHandle {
    name: Arc<str>,
    state: Arc<RwLock<SessionState>>,
    closer: Arc<Mutex<Option<Arc<Notify>>>>,
    stats: Arc<SessionStats>,
}

impl SessionHandle {
    fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            state: Arc::new(RwLock::new(SessionState::Disconnected)),
            closer: Arc::new(Mutex::new(None)),
            stats: Arc::new(SessionStats::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn login_attempts(&self) -> u64 {
        self.stats.login_attempts.load(Ordering::Relaxed)
    }

    pub fn frames_received(&self) -> u64 {
        self.stats.frames_received.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.stats.frames_dropped.load(Ordering::Relaxed)
    }

    /// Close the active connection, if any, releasing a pending read.
    /// Returns whether a connection was open.
    pub fn close_connection(&self) -> bool {
        match self.closer.lock().take() {
            Some(closer) => {
                closer.notify_one();
                true
            }
            None => false,
        }
    }

    fn set_state(&self, state: SessionState) {
        *self.state.write() = state;
    }

    fn install_closer(&self) -> Arc<Notify> {
        let closer = Arc::new(Notify::new());
        *self.closer.lock() = Some(closer.clone());
        closer
    }

    fn clear_closer(&self) {
        self.closer.lock().take();
    }
}

pub struct DeviceSession {
    handle: SessionHandle,
    client: Arc<dyn DeviceClient>,
    processor: Arc<UpdateProcessor>,
    retry_backoff: Duration,
    cancel: watch::Receiver<bool>,
}

impl DeviceSession {
    pub fn new(
        name: &str,
        client: Arc<dyn DeviceClient>,
        processor: Arc<UpdateProcessor>,
        retry_backoff: Duration,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            handle: SessionHandle::new(name),
            client,
            processor,
            retry_backoff,
            cancel,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Cancelled when the flag is set or the sender is gone
    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow() || self.cancel.has_changed().is_err()
    }

    pub async fn run(mut self) {
        let name = self.handle.name.clone();
        info!(device = %name, "Device receiver is running");

        while !self.is_cancelled() {
            self.handle.set_state(SessionState::Authenticating);
            self.handle.stats.login_attempts.fetch_add(1, Ordering::Relaxed);
            info!(device = %name, "Logging in");

            let tokens = match self.client.login().await {
                Ok(tokens) => tokens,
                Err(e) => {
                    if e.is_recoverable() {
                        warn!(device = %name, error = %e, "Login failed");
                    } else {
                        error!(device = %name, error = %e, code = e.error_code(), "Login failed");
                    }
                    self.retry_later().await;
                    continue;
                }
            };
            info!(device = %name, "Login succeeded");

            self.handle.set_state(SessionState::Connecting);
            let device_info = self.client.device_info(&tokens.api_token).await;
            info!(
                device = %name,
                model = %device_info.model_name,
                serial = %device_info.serial_number,
                version = %device_info.firmware_version,
                wan = %device_info.wan,
                "Device info"
            );
            self.processor.publish_device_info(&name, &device_info);

            let mut stream = match self.client.connect(&tokens.stream_token).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(device = %name, error = %e, "Dial failed");
                    self.retry_later().await;
                    continue;
                }
            };
            info!(device = %name, "Tag stream connected");

            // Installed before the cancellation check so a concurrent shutdown
            // either sees the closer or is seen here.
            let closer = self.handle.install_closer();
            if !self.is_cancelled() {
                self.handle.set_state(SessionState::Streaming);
                if let Err(e) = self.stream_frames(stream.as_mut(), &closer).await {
                    warn!(device = %name, error = %e, "Tag stream lost");
                }
            }
            self.handle.clear_closer();
            stream.close().await;

            self.retry_later().await;
        }

        self.handle.set_state(SessionState::Stopped);
        info!(device = %name, "Device receiver stopped");
    }

    /// Read frames until the stream fails, the connection is closed from
    /// outside, or cancellation is seen between frames.
    async fn stream_frames(
        &self,
        stream: &mut dyn TagStream,
        closer: &Notify,
    ) -> Result<(), EdgeTagError> {
        let name = self.handle.name();

        while !self.is_cancelled() {
            let frame = tokio::select! {
                frame = stream.next_frame() => frame?,
                _ = closer.notified() => {
                    info!(device = %name, "Connection closed by supervisor");
                    return Ok(());
                }
            };

            self.handle.stats.frames_received.fetch_add(1, Ordering::Relaxed);
            debug!(device = %name, payload = %String::from_utf8_lossy(&frame), "recv");

            match self.processor.process(name, &frame) {
                Ok(outcome) => {
                    debug!(
                        device = %name,
                        applied = outcome.applied,
                        rejected = outcome.rejected,
                        "Frame processed"
                    );
                }
                Err(e) => {
                    self.handle.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(device = %name, error = %e, "Dropping malformed frame");
                }
            }
        }

        Ok(())
    }

    /// Go back to `Disconnected` and wait out the backoff, waking early on
    /// cancellation
    async fn retry_later(&mut self) {
        self.handle.set_state(SessionState::Disconnected);
        if self.is_cancelled() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(self.retry_backoff) => {}
            _ = self.cancel.changed() => {}
        }
    }
}
