//! Tag Exporter
//!
//! Streams tag updates from remote devices and exposes the latest value of
//! every tag as a named, labeled series on a scrape endpoint.
//!
//! - `coercion`: typed tag value to `f64`
//! - `key`: series name and labels for a tag update
//! - `registry`: lazily created series, rendered for scraping
//! - `processor`: applies decoded frames to the registry
//! - `session` / `supervisor`: per-device login, stream and reconnect loop

pub mod api;
pub mod client;
pub mod coercion;
pub mod key;
pub mod processor;
pub mod registry;
pub mod service;
pub mod session;
pub mod stream;
pub mod supervisor;

pub use client::{DeviceClient, HttpDeviceClient, SessionTokens, TagStream};
pub use key::{derive_key, lower_camel, SeriesCategory, SeriesKey};
pub use processor::{BatchOutcome, UpdateProcessor};
pub use registry::{RegistryError, SeriesHandle, SeriesRegistry, SeriesSnapshot};
pub use service::{ExporterService, ExporterState};
pub use session::{DeviceSession, SessionHandle, SessionState};
pub use supervisor::SessionSupervisor;
