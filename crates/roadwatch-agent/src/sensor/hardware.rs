// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hardware sensor source: serial GPS plus MPU-6050.

use super::gps::GpsReceiver;
use super::mpu6050::Mpu6050;
use super::{SensorReadError, SensorSource};
use crate::sample::{AccelReading, GpsFix};
use std::path::Path;

/// Physical sensors. Either one may be missing; a missing sensor simply
/// leaves its field absent in every sample.
pub struct HardwareSource {
    gps: Option<GpsReceiver>,
    accel: Option<Mpu6050>,
}

impl HardwareSource {
    /// Open whatever sensors are present.
    ///
    /// Fails only when neither sensor can be opened.
    pub fn open(
        gps_device: impl AsRef<Path>,
        gps_baud: u32,
        i2c_bus: impl AsRef<Path>,
        mpu_address: u16,
    ) -> Result<Self, SensorReadError> {
        let gps_device = gps_device.as_ref();
        let i2c_bus = i2c_bus.as_ref();

        let gps = match GpsReceiver::open(gps_device, gps_baud) {
            Ok(gps) => Some(gps),
            Err(e) => {
                tracing::warn!("GPS unavailable on {}: {}", gps_device.display(), e);
                None
            }
        };

        let accel = match Mpu6050::open(i2c_bus, mpu_address) {
            Ok(accel) => Some(accel),
            Err(e) => {
                tracing::warn!("MPU-6050 unavailable on {}: {}", i2c_bus.display(), e);
                None
            }
        };

        Self::from_parts(gps, accel)
    }

    /// Assemble from already-opened sensors.
    pub fn from_parts(
        gps: Option<GpsReceiver>,
        accel: Option<Mpu6050>,
    ) -> Result<Self, SensorReadError> {
        if gps.is_none() && accel.is_none() {
            return Err(SensorReadError::Disconnected("no sensors available"));
        }
        Ok(Self { gps, accel })
    }

    pub fn has_gps(&self) -> bool {
        self.gps.is_some()
    }

    pub fn has_accelerometer(&self) -> bool {
        self.accel.is_some()
    }
}

impl SensorSource for HardwareSource {
    fn read_gps(&mut self) -> Result<Option<GpsFix>, SensorReadError> {
        match self.gps.as_mut() {
            Some(gps) => gps.latest_fix(),
            None => Ok(None),
        }
    }

    fn read_accelerometer(&mut self) -> Result<Option<AccelReading>, SensorReadError> {
        match self.accel.as_mut() {
            Some(accel) => accel.read().map(Some),
            None => Ok(None),
        }
    }

    fn release(&mut self) {
        if let Some(mut gps) = self.gps.take() {
            gps.close();
            tracing::info!("Closed GPS device {}", gps.device());
        }
        if self.accel.take().is_some() {
            tracing::info!("Closed I2C bus");
        }
    }

    fn name(&self) -> &'static str {
        "hardware"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::time::Duration;

    struct IdleSerial;

    impl Read for IdleSerial {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            std::thread::sleep(Duration::from_millis(5));
            Ok(0)
        }
    }

    #[test]
    fn test_requires_at_least_one_sensor() {
        assert!(HardwareSource::from_parts(None, None).is_err());
        assert!(HardwareSource::open("/nonexistent/tty", 9600, "/nonexistent/i2c", 0x68).is_err());
    }

    #[test]
    fn test_gps_only_leaves_accelerometer_absent() {
        let gps = GpsReceiver::from_reader(IdleSerial, "idle");
        let mut source = HardwareSource::from_parts(Some(gps), None).unwrap();
        assert!(source.has_gps());
        assert!(!source.has_accelerometer());

        let poll = source.poll();
        assert!(poll.sample.gps.is_none());
        assert!(poll.sample.accelerometer.is_none());
        assert!(poll.gps_error.is_none());
        assert!(poll.accel_error.is_none());

        source.release();
        assert!(!source.has_gps());
    }
}
