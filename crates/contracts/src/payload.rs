//! EventPayload - producer output, dispatcher input
//!
//! One timestamped batch of labelled measurements.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single labelled reading inside a payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Measured value
    pub value: f64,
    /// Physical unit (e.g. "V", "A")
    pub unit: String,
    /// Logical group the reading belongs to (e.g. "Array", "Battery")
    pub group: String,
}

impl Measurement {
    pub fn new(value: f64, unit: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            value,
            unit: unit.into(),
            group: group.into(),
        }
    }
}

/// Timestamped measurement batch.
///
/// Never mutated once handed to a dispatcher; retries resubmit the same value.
/// Measurements live in a `BTreeMap` so encoding order is deterministic.
///
/// # Examples
/// ```
/// use chrono::Utc;
/// use contracts::{EventPayload, Measurement};
///
/// let payload = EventPayload::new("solar", Utc::now())
///     .with_measurement("Array Voltage", Measurement::new(53.41, "V", "Array"));
/// assert_eq!(payload.len(), 1);
/// assert_eq!(payload.measurement("Array Voltage").unwrap().unit, "V");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    /// Producing subsystem
    pub source: String,

    /// When the batch was taken
    #[serde(alias = "at")]
    pub timestamp: DateTime<Utc>,

    /// label -> reading
    #[serde(default, alias = "data")]
    pub measurements: BTreeMap<String, Measurement>,
}

impl EventPayload {
    /// Create an empty payload
    pub fn new(source: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            source: source.into(),
            timestamp,
            measurements: BTreeMap::new(),
        }
    }

    /// Add a measurement (builder style). A repeated label replaces the earlier reading.
    pub fn with_measurement(mut self, label: impl Into<String>, measurement: Measurement) -> Self {
        self.measurements.insert(label.into(), measurement);
        self
    }

    /// Look up a measurement by label
    pub fn measurement(&self, label: &str) -> Option<&Measurement> {
        self.measurements.get(label)
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    /// RFC 3339 timestamp with a `Z` suffix, as sent to downstream services
    pub fn timestamp_rfc3339(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> EventPayload {
        let at = Utc.with_ymd_and_hms(2016, 5, 1, 12, 30, 0).unwrap();
        EventPayload::new("solar", at)
            .with_measurement("Array Voltage", Measurement::new(53.41, "V", "Array"))
            .with_measurement("Array Current", Measurement::new(1.4, "A", "Array"))
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let payload = sample();
        let first = serde_json::to_string(&payload).unwrap();
        let second = serde_json::to_string(&payload.clone()).unwrap();
        assert_eq!(first, second);
        // BTreeMap keeps labels sorted
        assert!(first.find("Array Current").unwrap() < first.find("Array Voltage").unwrap());
    }

    #[test]
    fn test_deserialize_accepts_legacy_field_names() {
        let json = r#"{
            "source": "solar",
            "at": "2016-05-01T12:30:00Z",
            "data": {
                "Array Current": { "group": "Array", "unit": "A", "value": 1.4 }
            }
        }"#;
        let payload: EventPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.source, "solar");
        assert_eq!(payload.len(), 1);
        assert_eq!(payload.measurement("Array Current").unwrap().value, 1.4);
    }

    #[test]
    fn test_timestamp_has_z_suffix() {
        let payload = sample();
        assert_eq!(payload.timestamp_rfc3339(), "2016-05-01T12:30:00.000000Z");
    }

    #[test]
    fn test_repeated_label_replaces() {
        let payload = sample().with_measurement("Array Voltage", Measurement::new(50.0, "V", "Array"));
        assert_eq!(payload.len(), 2);
        assert_eq!(payload.measurement("Array Voltage").unwrap().value, 50.0);
    }
}
