//! Configuration management for the exporter

use crate::error::{EdgeTagError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::time::Duration;

const DEFAULT_USER: &str = "admin";
const DEFAULT_PASSWORD: &str = "admin@123";

/// Path of the tag streaming endpoint on the device
pub const STREAM_PATH: &str = "/api/v1/http/1";

/// One remote device to stream tags from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    #[serde(rename = "tlsEnable", default)]
    pub tls_enable: bool,
    pub addr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl DeviceConfig {
    pub fn new(name: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tls_enable: false,
            addr: addr.into(),
            user: None,
            password: None,
        }
    }

    /// Login name, falling back to the factory default
    pub fn user(&self) -> &str {
        match self.user.as_deref() {
            Some(user) if !user.is_empty() => user,
            _ => DEFAULT_USER,
        }
    }

    pub fn password(&self) -> &str {
        match self.password.as_deref() {
            Some(password) if !password.is_empty() => password,
            _ => DEFAULT_PASSWORD,
        }
    }

    pub fn http_base(&self) -> String {
        let scheme = if self.tls_enable { "https" } else { "http" };
        format!("{}://{}", scheme, self.addr)
    }

    pub fn stream_url(&self, stream_token: &str) -> String {
        let scheme = if self.tls_enable { "wss" } else { "ws" };
        format!("{}://{}{}?token={}", scheme, self.addr, STREAM_PATH, stream_token)
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub http_bind: String,
    pub devices: Vec<DeviceConfig>,
    pub retry_backoff: Duration,
    pub request_timeout: Duration,
    pub tls_insecure: bool,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        let devices_json = env::var("DEVICES")
            .map_err(|_| EdgeTagError::Config("DEVICES is not set".to_string()))?;

        Ok(Self {
            http_bind: env::var("HTTP_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            devices: Self::parse_devices(&devices_json)?,
            retry_backoff: Duration::from_secs(
                env::var("RETRY_BACKOFF_SECS")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .map_err(|e| EdgeTagError::Config(format!("Invalid RETRY_BACKOFF_SECS: {}", e)))?,
            ),
            request_timeout: Duration::from_secs(
                env::var("REQUEST_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .map_err(|e| {
                        EdgeTagError::Config(format!("Invalid REQUEST_TIMEOUT_SECS: {}", e))
                    })?,
            ),
            tls_insecure: match env::var("TLS_INSECURE") {
                Ok(value) => parse_flag("TLS_INSECURE", &value)?,
                Err(_) => true,
            },
        })
    }

    /// Parse and validate the device list
    pub fn parse_devices(json: &str) -> Result<Vec<DeviceConfig>> {
        if json.trim().is_empty() {
            return Err(EdgeTagError::Config("device list is empty".to_string()));
        }

        let devices: Vec<DeviceConfig> = serde_json::from_str(json)
            .map_err(|e| EdgeTagError::Config(format!("Invalid DEVICES: {}", e)))?;

        if devices.is_empty() {
            return Err(EdgeTagError::Config("device list is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for device in &devices {
            if device.name.trim().is_empty() || device.addr.trim().is_empty() {
                return Err(EdgeTagError::Config(format!(
                    "device entry needs both name and addr (name={:?}, addr={:?})",
                    device.name, device.addr
                )));
            }
            if !seen.insert(device.name.as_str()) {
                return Err(EdgeTagError::Config(format!(
                    "duplicate device name: {}",
                    device.name
                )));
            }
        }

        Ok(devices)
    }
}

/// Accepts `true`/`false`/`1`/`0`, case-insensitive
pub(crate) fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(EdgeTagError::Config(format!(
            "Invalid {}: expected true or false, got {:?}",
            name, other
        ))),
    }
}
