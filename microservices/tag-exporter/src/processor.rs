//! Applies decoded tag batches to the series registry

use edgetag_core::{DeviceInfo, EdgeTagError, Result, TagUpdate};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::coercion::coerce_tag;
use crate::key::SeriesKey;
use crate::registry::{RegistryError, SeriesRegistry};

pub const DEVICE_INFO_SERIES: &str = "deviceInfo";

const DEVICE_INFO_LABELS: [&str; 5] = [
    "device",
    "modelName",
    "serialNumber",
    "thingsproVersion",
    "wan",
];

/// Counts for one processed batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub applied: usize,
    pub rejected: usize,
}

pub struct UpdateProcessor {
    registry: Arc<SeriesRegistry>,
}

impl UpdateProcessor {
    pub fn new(registry: Arc<SeriesRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SeriesRegistry> {
        &self.registry
    }

    /// Decode a frame and apply every tag update in it.
    ///
    /// A frame that does not decode is dropped as a whole. Once decoded, a
    /// rejected update does not stop the rest of the batch.
    pub fn process(&self, origin: &str, payload: &[u8]) -> Result<BatchOutcome> {
        let tags = TagUpdate::decode_batch(payload).map_err(|e| {
            EdgeTagError::Decode(format!("failed to unmarshal payload from {}: {}", origin, e))
        })?;

        let mut outcome = BatchOutcome::default();
        for tag in &tags {
            match self.apply(origin, tag) {
                Ok(()) => outcome.applied += 1,
                Err(e) => {
                    debug!(device = %origin, tag = %tag, error = %e, "Tag update rejected");
                    outcome.rejected += 1;
                }
            }
        }

        Ok(outcome)
    }

    /// Derive, coerce and store a single tag update
    pub fn apply(&self, origin: &str, tag: &TagUpdate) -> std::result::Result<(), RegistryError> {
        let key = SeriesKey::derive(origin, tag);
        let value = coerce_tag(tag);
        let series = self.registry.get_or_create(&key.name, key.label_names())?;
        self.registry.set_value(&series, value, key.label_values)
    }

    /// Publish the informational `deviceInfo` series for a device
    pub fn publish_device_info(&self, origin: &str, info: &DeviceInfo) {
        let result = self
            .registry
            .get_or_create(DEVICE_INFO_SERIES, &DEVICE_INFO_LABELS)
            .and_then(|series| {
                series.set(
                    0.0,
                    vec![
                        origin.to_string(),
                        info.model_name.clone(),
                        info.serial_number.clone(),
                        info.firmware_version.clone(),
                        info.wan.clone(),
                    ],
                )
            });

        if let Err(e) = result {
            warn!(device = %origin, error = %e, "Failed to publish device info");
        }
    }
}
