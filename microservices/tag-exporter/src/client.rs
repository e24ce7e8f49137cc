//! Device API client
//!
//! Login and metadata go over the device's REST API; tag updates arrive on a
//! WebSocket opened with the stream token obtained at login.

use async_trait::async_trait;
use edgetag_core::{DeviceConfig, DeviceInfo, EdgeTagError, Result};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::stream::WebSocketTagStream;

const API_TOKEN_HEADER: &str = "mx-api-token";

/// Tokens handed out by a successful login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTokens {
    pub api_token: String,
    pub stream_token: String,
}

/// Remote device collaborator used by a device session
#[async_trait]
pub trait DeviceClient: Send + Sync {
    /// Exchange credentials for an API token, then the API token for a stream token
    async fn login(&self) -> Result<SessionTokens>;

    /// Best-effort metadata fetch; failures leave fields empty
    async fn device_info(&self, api_token: &str) -> DeviceInfo;

    async fn connect(&self, stream_token: &str) -> Result<Box<dyn TagStream>>;
}

/// An open tag stream
#[async_trait]
pub trait TagStream: Send {
    /// Wait for the next frame payload. Any error ends the stream.
    async fn next_frame(&mut self) -> Result<Vec<u8>>;

    async fn close(&mut self);
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    name: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct TokenData {
    token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneralData {
    model_name: Option<String>,
    serial_number: Option<String>,
    thingspro_version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WanData {
    display_name: Option<String>,
}

/// REST + WebSocket client for one configured device
pub struct HttpDeviceClient {
    http: Client,
    device: DeviceConfig,
    request_timeout: Duration,
    tls_insecure: bool,
}

impl HttpDeviceClient {
    pub fn new(device: DeviceConfig, request_timeout: Duration, tls_insecure: bool) -> Result<Self> {
        let http = Client::builder()
            .timeout(request_timeout)
            .danger_accept_invalid_certs(tls_insecure)
            .build()
            .map_err(|e| EdgeTagError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            device,
            request_timeout,
            tls_insecure,
        })
    }

    pub fn device(&self) -> &DeviceConfig {
        &self.device
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.device.http_base(), path)
    }

    async fn read_data<T: DeserializeOwned>(response: Response) -> std::result::Result<T, String> {
        let status = response.status();
        let body = response.text().await.map_err(|e| e.to_string())?;

        if !status.is_success() {
            return Err(format!("status {}, response: {}", status, body));
        }

        serde_json::from_str::<Envelope<T>>(&body)
            .map(|envelope| envelope.data)
            .map_err(|e| format!("{}, response: {}", e, body))
    }

    async fn general(&self, api_token: &str) -> Result<GeneralData> {
        let response = self
            .http
            .get(self.url("/api/v1/device/general"))
            .header(API_TOKEN_HEADER, api_token)
            .send()
            .await
            .map_err(|e| EdgeTagError::Metadata(format!("device/general: {}", e)))?;

        Self::read_data(response)
            .await
            .map_err(|e| EdgeTagError::Metadata(format!("device/general: {}", e)))
    }

    async fn wan(&self, api_token: &str) -> Result<WanData> {
        let response = self
            .http
            .get(self.url("/api/v1/device/network/wan"))
            .header(API_TOKEN_HEADER, api_token)
            .send()
            .await
            .map_err(|e| EdgeTagError::Metadata(format!("device/network/wan: {}", e)))?;

        Self::read_data(response)
            .await
            .map_err(|e| EdgeTagError::Metadata(format!("device/network/wan: {}", e)))
    }
}

#[async_trait]
impl DeviceClient for HttpDeviceClient {
    async fn login(&self) -> Result<SessionTokens> {
        let addr = &self.device.addr;

        let response = self
            .http
            .post(self.url("/api/v1/auth"))
            .json(&LoginRequest {
                name: self.device.user(),
                password: self.device.password(),
            })
            .send()
            .await
            .map_err(|e| EdgeTagError::Auth(format!("failed to login to device {}: {}", addr, e)))?;

        let api_token = Self::read_data::<TokenData>(response)
            .await
            .map_err(|e| EdgeTagError::Auth(format!("failed to get token of device {}: {}", addr, e)))?
            .token;

        let response = self
            .http
            .get(self.url("/api/v1/auth/websocket-token"))
            .header(API_TOKEN_HEADER, &api_token)
            .send()
            .await
            .map_err(|e| {
                EdgeTagError::Auth(format!("failed to get websocket token of device {}: {}", addr, e))
            })?;

        let stream_token = Self::read_data::<TokenData>(response)
            .await
            .map_err(|e| {
                EdgeTagError::Auth(format!("failed to get websocket token of device {}: {}", addr, e))
            })?
            .token;

        debug!(device = %self.device.name, "Obtained API and stream tokens");

        Ok(SessionTokens {
            api_token,
            stream_token,
        })
    }

    async fn device_info(&self, api_token: &str) -> DeviceInfo {
        let mut info = DeviceInfo::default();

        let general = match self.general(api_token).await {
            Ok(general) => general,
            Err(e) => {
                warn!(device = %self.device.name, error = %e, "Failed to fetch device info");
                return info;
            }
        };
        info.model_name = general.model_name.unwrap_or_default();
        info.serial_number = general.serial_number.unwrap_or_default();
        info.firmware_version = general.thingspro_version.unwrap_or_default();

        match self.wan(api_token).await {
            Ok(wan) => info.wan = wan.display_name.unwrap_or_default(),
            Err(e) => {
                warn!(device = %self.device.name, error = %e, "Failed to fetch WAN info");
            }
        }

        info
    }

    async fn connect(&self, stream_token: &str) -> Result<Box<dyn TagStream>> {
        let stream = WebSocketTagStream::connect(
            &self.device.stream_url(stream_token),
            self.device.tls_enable,
            self.tls_insecure,
            self.request_timeout,
        )
        .await
        .map_err(|e| EdgeTagError::Connection(format!("dial {}: {}", self.device.addr, e)))?;

        Ok(Box::new(stream))
    }
}
