//! Series name and label derivation for tag updates
//!
//! Providers publish connection-scoped telemetry under `$connection_<id>`.
//! The category picked here decides both the name prefix and the label
//! schema, so a key is only ever registered with one arity.

use edgetag_core::TagUpdate;

pub const CONNECTION_PROVIDER_PREFIX: &str = "$connection_";

const STORE_SOURCE_PREFIX: &str = "store";
const MESSAGE_GROUP_SOURCE_PREFIX: &str = "messageGroup";

/// Every tag update falls into exactly one category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesCategory {
    ConnectionStore,
    ConnectionMessageGroup,
    ConnectionGeneric,
    Plain,
}

impl SeriesCategory {
    pub fn classify(provider_name: &str, source_name: &str) -> Self {
        if !provider_name.starts_with(CONNECTION_PROVIDER_PREFIX) {
            return Self::Plain;
        }
        if source_name.starts_with(STORE_SOURCE_PREFIX) {
            Self::ConnectionStore
        } else if source_name.starts_with(MESSAGE_GROUP_SOURCE_PREFIX) {
            Self::ConnectionMessageGroup
        } else {
            Self::ConnectionGeneric
        }
    }

    /// Label names of the series schema, `device` first
    pub fn label_names(self) -> &'static [&'static str] {
        match self {
            Self::ConnectionStore => &["device", "connection", "store"],
            Self::ConnectionMessageGroup => &["device", "connection", "messageGroup"],
            Self::ConnectionGeneric => &["device", "connection"],
            Self::Plain => &["device"],
        }
    }

    pub fn arity(self) -> usize {
        self.label_names().len()
    }

    fn name_prefix(self) -> Option<&'static str> {
        match self {
            Self::ConnectionStore => Some("store"),
            Self::ConnectionMessageGroup => Some("messageGroup"),
            Self::ConnectionGeneric => Some("connection"),
            Self::Plain => None,
        }
    }
}

/// Derived identity of the series a tag update writes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesKey {
    pub name: String,
    pub category: SeriesCategory,
    pub label_values: Vec<String>,
}

impl SeriesKey {
    pub fn derive(origin: &str, tag: &TagUpdate) -> Self {
        let category = SeriesCategory::classify(&tag.provider_name, &tag.source_name);

        let name = match category.name_prefix() {
            Some(prefix) => lower_camel(&format!("{} {}", prefix, tag.tag_name)),
            None => lower_camel(&tag.tag_name),
        };

        let connection_id = tag
            .provider_name
            .strip_prefix(CONNECTION_PROVIDER_PREFIX)
            .unwrap_or(&tag.provider_name);

        let label_values = match category {
            SeriesCategory::ConnectionStore | SeriesCategory::ConnectionMessageGroup => vec![
                origin.to_string(),
                connection_id.to_string(),
                tag.source_name.clone(),
            ],
            SeriesCategory::ConnectionGeneric => {
                vec![origin.to_string(), connection_id.to_string()]
            }
            SeriesCategory::Plain => vec![origin.to_string()],
        };

        debug_assert_eq!(label_values.len(), category.arity());

        Self {
            name,
            category,
            label_values,
        }
    }

    pub fn label_names(&self) -> &'static [&'static str] {
        self.category.label_names()
    }

    pub fn arity(&self) -> usize {
        self.category.arity()
    }
}

pub fn derive_key(origin: &str, tag: &TagUpdate) -> SeriesKey {
    SeriesKey::derive(origin, tag)
}

/// Convert a space/underscore/dash/dot separated phrase into lowerCamelCase.
///
/// ASCII letters and digits are kept, a letter following a separator or a
/// digit is upper-cased, runs of capitals are folded to lower case after
/// their first letter, and every other byte is dropped.
pub fn lower_camel(input: &str) -> String {
    let s = input.trim();
    let mut out = String::with_capacity(s.len());
    let mut cap_next = false;
    let mut prev_is_cap = false;

    for (i, &b) in s.as_bytes().iter().enumerate() {
        let is_cap = b.is_ascii_uppercase();
        let is_low = b.is_ascii_lowercase();

        let mut c = b;
        if cap_next {
            if is_low {
                c = b.to_ascii_uppercase();
            }
        } else if i == 0 {
            if is_cap {
                c = b.to_ascii_lowercase();
            }
        } else if prev_is_cap && is_cap {
            c = b.to_ascii_lowercase();
        }
        prev_is_cap = is_cap;

        if is_cap || is_low {
            out.push(c as char);
            cap_next = false;
        } else if b.is_ascii_digit() {
            out.push(c as char);
            cap_next = true;
        } else {
            cap_next = matches!(b, b'_' | b' ' | b'-' | b'.');
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgetag_core::DataType;

    fn tag(provider: &str, source: &str, name: &str) -> TagUpdate {
        TagUpdate {
            provider_name: provider.to_string(),
            source_name: source.to_string(),
            tag_name: name.to_string(),
            value: serde_json::Value::Null,
            timestamp: 0,
            data_type: DataType::Double,
            description: None,
            event_severity: None,
            event_user: None,
        }
    }

    #[test]
    fn test_lower_camel() {
        assert_eq!(lower_camel("temperature"), "temperature");
        assert_eq!(lower_camel("store count"), "storeCount");
        assert_eq!(lower_camel("messageGroup sentCount"), "messageGroupSentCount");
        assert_eq!(lower_camel("connection tx_bytes"), "connectionTxBytes");
        assert_eq!(lower_camel("Temperature"), "temperature");
        assert_eq!(lower_camel("CPU Usage"), "cpuUsage");
        assert_eq!(lower_camel("  disk.free-space "), "diskFreeSpace");
        assert_eq!(lower_camel("stage2count"), "stage2Count");
        assert_eq!(lower_camel("temp (°C)"), "tempC");
        assert_eq!(lower_camel(""), "");
    }

    #[test]
    fn test_plain_category() {
        let key = derive_key("plantFloor1", &tag("deviceA", "sensor", "temperature"));
        assert_eq!(key.category, SeriesCategory::Plain);
        assert_eq!(key.name, "temperature");
        assert_eq!(key.label_values, vec!["plantFloor1"]);
        assert_eq!(key.label_names(), &["device"]);
    }

    #[test]
    fn test_connection_store_category() {
        let key = derive_key("deviceX", &tag("$connection_azure1", "store1", "count"));
        assert_eq!(key.category, SeriesCategory::ConnectionStore);
        assert_eq!(key.name, "storeCount");
        assert_eq!(key.label_values, vec!["deviceX", "azure1", "store1"]);
        assert_eq!(key.arity(), 3);
    }

    #[test]
    fn test_connection_message_group_category() {
        let key = derive_key("d", &tag("$connection_mqtt", "messageGroup2", "sent"));
        assert_eq!(key.category, SeriesCategory::ConnectionMessageGroup);
        assert_eq!(key.name, "messageGroupSent");
        assert_eq!(key.label_values, vec!["d", "mqtt", "messageGroup2"]);
        assert_eq!(key.label_names(), &["device", "connection", "messageGroup"]);
    }

    #[test]
    fn test_connection_generic_category() {
        let key = derive_key("d", &tag("$connection_azure1", "status", "state"));
        assert_eq!(key.category, SeriesCategory::ConnectionGeneric);
        assert_eq!(key.name, "connectionState");
        assert_eq!(key.label_values, vec!["d", "azure1"]);
    }

    #[test]
    fn test_same_tag_name_differs_by_category() {
        let plain = derive_key("d", &tag("system", "status", "status"));
        let connection = derive_key("d", &tag("$connection_a", "status", "status"));
        assert_ne!(plain.name, connection.name);
    }

    #[test]
    fn test_prefix_must_be_leading() {
        assert_eq!(
            SeriesCategory::classify("my$connection_x", "store1"),
            SeriesCategory::Plain
        );
        assert_eq!(
            SeriesCategory::classify("$connection_x", "mystore"),
            SeriesCategory::ConnectionGeneric
        );
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let inputs = [
            ("$connection_a", "store9", "Bytes Sent"),
            ("$connection_a", "messageGroupX", "count"),
            ("$connection_", "", "x"),
            ("modbus", "store1", "value"),
        ];
        for (provider, source, name) in inputs {
            let t = tag(provider, source, name);
            let first = derive_key("origin", &t);
            for _ in 0..3 {
                assert_eq!(derive_key("origin", &t), first);
            }
            assert_eq!(first.label_values.len(), first.arity());
        }
    }
}
