//! Edgetag Core - Shared domain types and service infrastructure
//!
//! This crate provides:
//! - Tag update wire types and the typed tag value
//! - Device descriptors and process configuration
//! - Error handling utilities
//! - The service lifecycle runtime

pub mod config;
pub mod domain;
pub mod error;
pub mod service;

pub use config::{DeviceConfig, ServiceConfig};
pub use domain::*;
pub use error::{EdgeTagError, Result};
pub use service::{DependencyStatus, EdgeService, HealthStatus, ReadinessStatus, ServiceRuntime};
