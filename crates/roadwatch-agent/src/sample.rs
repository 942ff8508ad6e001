// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sensor sample model
//!
//! A [`Sample`] bundles one GPS fix and one accelerometer reading taken on the
//! same collector tick. Either part may be absent when the sensor had nothing
//! to report (no fix yet, bus error). The JSON form is what gets persisted in
//! the durable queue and posted verbatim to the collector.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// MPU-6050 sensitivity in the +/-2g range (LSB per g).
pub const ACCEL_SCALE_FACTOR: f64 = 16384.0;

/// Standard gravity used for the raw -> m/s^2 conversion.
pub const GRAVITY_MS2: f64 = 9.81;

/// Durable queue key, assigned when a sample is appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// GPS fix extracted from a `$GPGGA` sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    /// UTC time of fix, `HH:MM:SS`
    pub time: String,

    /// Signed decimal degrees (south is negative)
    pub latitude: f64,

    /// Signed decimal degrees (west is negative)
    pub longitude: f64,

    /// Antenna altitude above mean sea level (meters)
    pub altitude: f64,

    /// Satellites used for the fix
    #[serde(rename = "satellites")]
    pub satellite_count: u32,
}

/// Accelerometer reading carrying both raw register values and m/s^2.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccelReading {
    #[serde(rename = "x_raw")]
    pub raw_x: i16,
    #[serde(rename = "y_raw")]
    pub raw_y: i16,
    #[serde(rename = "z_raw")]
    pub raw_z: i16,
    #[serde(rename = "x")]
    pub x_ms2: f64,
    #[serde(rename = "y")]
    pub y_ms2: f64,
    #[serde(rename = "z")]
    pub z_ms2: f64,
}

impl AccelReading {
    /// Build a reading from raw register values, deriving the m/s^2 fields.
    pub fn from_raw(raw_x: i16, raw_y: i16, raw_z: i16) -> Self {
        Self {
            raw_x,
            raw_y,
            raw_z,
            x_ms2: raw_to_ms2(raw_x),
            y_ms2: raw_to_ms2(raw_y),
            z_ms2: raw_to_ms2(raw_z),
        }
    }
}

/// Convert a raw MPU-6050 accelerometer value to m/s^2.
pub fn raw_to_ms2(raw: i16) -> f64 {
    (f64::from(raw) / ACCEL_SCALE_FACTOR) * GRAVITY_MS2
}

/// One timestamped sensor reading bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Queue key; `None` until the sample is persisted
    #[serde(skip)]
    pub id: Option<RecordId>,

    /// Capture instant
    #[serde(with = "timestamp_format")]
    pub timestamp: DateTime<Utc>,

    pub gps: Option<GpsFix>,

    pub accelerometer: Option<AccelReading>,
}

impl Sample {
    /// Create an empty sample stamped with the current time.
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    /// Create an empty sample stamped with `timestamp`.
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            id: None,
            timestamp,
            gps: None,
            accelerometer: None,
        }
    }

    pub fn with_gps(mut self, gps: GpsFix) -> Self {
        self.gps = Some(gps);
        self
    }

    pub fn with_accelerometer(mut self, accel: AccelReading) -> Self {
        self.accelerometer = Some(accel);
        self
    }

    /// Timestamp text as stored in the queue's `timestamp` column.
    pub fn timestamp_text(&self) -> String {
        format_timestamp(&self.timestamp)
    }

    /// Serialize to the JSON payload stored in the queue.
    pub fn to_payload(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a stored payload, attaching the queue id it was stored under.
    pub fn from_payload(id: RecordId, payload: &str) -> serde_json::Result<Self> {
        let mut sample: Sample = serde_json::from_str(payload)?;
        sample.id = Some(id);
        Ok(sample)
    }
}

/// Fixed-width UTC form so lexical order matches chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

mod timestamp_format {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&text)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap()
    }

    #[test]
    fn test_raw_to_ms2() {
        assert_eq!(raw_to_ms2(0), 0.0);
        assert!((raw_to_ms2(16384) - 9.81).abs() < 1e-9);
        assert!((raw_to_ms2(-8192) + 4.905).abs() < 1e-9);
    }

    #[test]
    fn test_accel_keeps_raw_and_converted() {
        let accel = AccelReading::from_raw(1000, -13000, -7000);
        assert_eq!(accel.raw_y, -13000);
        assert!((accel.y_ms2 - raw_to_ms2(-13000)).abs() < f64::EPSILON);
    }

    #[test]
    fn test_payload_uses_collector_keys() {
        let sample = Sample::at(fixed_time())
            .with_gps(GpsFix {
                time: "09:26:53".to_string(),
                latitude: -4.325,
                longitude: 15.31,
                altitude: 280.0,
                satellite_count: 7,
            })
            .with_accelerometer(AccelReading::from_raw(1, 2, 3));

        let value: serde_json::Value = serde_json::from_str(&sample.to_payload().unwrap()).unwrap();
        assert_eq!(value["timestamp"], "2025-03-14T09:26:53.000000Z");
        assert_eq!(value["gps"]["satellites"], 7);
        assert_eq!(value["accelerometer"]["x_raw"], 1);
        assert!(value["accelerometer"]["z"].is_f64());
        assert!(value.get("id").is_none());
    }

    #[test]
    fn test_absent_gps_serializes_as_null() {
        let sample = Sample::at(fixed_time()).with_accelerometer(AccelReading::from_raw(0, 0, 0));
        let value: serde_json::Value = serde_json::from_str(&sample.to_payload().unwrap()).unwrap();
        assert!(value["gps"].is_null());
    }

    #[test]
    fn test_from_payload_attaches_id() {
        let sample = Sample::at(fixed_time());
        let parsed = Sample::from_payload(RecordId(12), &sample.to_payload().unwrap()).unwrap();
        assert_eq!(parsed.id, Some(RecordId(12)));
        assert_eq!(parsed.timestamp, sample.timestamp);
    }

    #[test]
    fn test_timestamp_text_sorts_chronologically() {
        let earlier = Sample::at(fixed_time());
        let later = Sample::at(fixed_time() + chrono::Duration::milliseconds(1500));
        assert!(earlier.timestamp_text() < later.timestamp_text());
    }
}
