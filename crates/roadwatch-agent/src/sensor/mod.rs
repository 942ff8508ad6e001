// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sensor sources
//!
//! Abstracts the physical sensors behind [`SensorSource`] so the collector
//! loop never depends on a concrete driver.
//!
//! # Implementations
//!
//! - [`HardwareSource`] -- serial NMEA GPS receiver + MPU-6050 on I2C (unix)
//! - [`SimulatedSource`] -- seeded pseudo-random readings

#[cfg(unix)]
pub mod gps;
#[cfg(unix)]
pub mod hardware;
#[cfg(unix)]
pub mod mpu6050;
pub mod nmea;
pub mod simulated;

#[cfg(unix)]
pub use hardware::HardwareSource;
pub use simulated::SimulatedSource;

use crate::sample::{AccelReading, GpsFix, Sample};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transient, field-scoped sensor failure.
#[derive(Debug, Error)]
pub enum SensorReadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sensor disconnected: {0}")]
    Disconnected(&'static str),

    #[error("malformed sensor data: {0}")]
    Malformed(String),
}

/// Which sensor source the agent runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Try hardware, fall back to simulation
    #[default]
    Auto,
    /// Require real sensors
    Hardware,
    /// Simulated readings only
    Simulated,
}

/// Result of one poll: the partial sample plus any per-field failures.
#[derive(Debug)]
pub struct SensorPoll {
    pub sample: Sample,
    pub gps_error: Option<SensorReadError>,
    pub accel_error: Option<SensorReadError>,
}

/// Sensor source trait
///
/// Each read must return within the sampling interval. `Ok(None)` means the
/// sensor had nothing to report this tick (no fix, sensor not fitted).
pub trait SensorSource: Send {
    /// Read the most recent GPS fix, if any.
    fn read_gps(&mut self) -> Result<Option<GpsFix>, SensorReadError>;

    /// Read the accelerometer, if fitted.
    fn read_accelerometer(&mut self) -> Result<Option<AccelReading>, SensorReadError>;

    /// Poll every sensor into a freshly stamped sample.
    ///
    /// A failing sensor leaves its field absent; the other fields are still
    /// populated.
    fn poll(&mut self) -> SensorPoll {
        let mut sample = Sample::now();

        let gps_error = match self.read_gps() {
            Ok(fix) => {
                sample.gps = fix;
                None
            }
            Err(e) => Some(e),
        };

        let accel_error = match self.read_accelerometer() {
            Ok(reading) => {
                sample.accelerometer = reading;
                None
            }
            Err(e) => Some(e),
        };

        SensorPoll {
            sample,
            gps_error,
            accel_error,
        }
    }

    /// Release device handles. Called once when the collector stops.
    fn release(&mut self) {}

    /// Short name for logs
    fn name(&self) -> &'static str;
}

impl<S: SensorSource + ?Sized> SensorSource for Box<S> {
    fn read_gps(&mut self) -> Result<Option<GpsFix>, SensorReadError> {
        (**self).read_gps()
    }

    fn read_accelerometer(&mut self) -> Result<Option<AccelReading>, SensorReadError> {
        (**self).read_accelerometer()
    }

    fn poll(&mut self) -> SensorPoll {
        (**self).poll()
    }

    fn release(&mut self) {
        (**self).release();
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlakyGps;

    impl SensorSource for FlakyGps {
        fn read_gps(&mut self) -> Result<Option<GpsFix>, SensorReadError> {
            Err(SensorReadError::Disconnected("gps"))
        }

        fn read_accelerometer(&mut self) -> Result<Option<AccelReading>, SensorReadError> {
            Ok(Some(AccelReading::from_raw(10, 20, 30)))
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    #[test]
    fn test_poll_isolates_field_failures() {
        let mut source = FlakyGps;
        let poll = source.poll();

        assert!(poll.sample.gps.is_none());
        assert!(poll.gps_error.is_some());
        assert_eq!(poll.sample.accelerometer.unwrap().raw_z, 30);
        assert!(poll.accel_error.is_none());
        assert!(poll.sample.id.is_none());
    }

    #[test]
    fn test_boxed_source_delegates() {
        let mut source: Box<dyn SensorSource> = Box::new(FlakyGps);
        assert_eq!(source.name(), "flaky");
        assert!(source.poll().gps_error.is_some());
    }
}
