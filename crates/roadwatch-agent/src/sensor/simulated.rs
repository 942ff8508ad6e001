// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Simulated sensor source for bench runs without hardware.

use super::{SensorReadError, SensorSource};
use crate::sample::{AccelReading, GpsFix};
use chrono::Utc;

/// Home position the simulated GPS wanders around (Kinshasa).
pub const HOME_LATITUDE: f64 = -4.3250;
pub const HOME_LONGITUDE: f64 = 15.3100;
pub const HOME_ALTITUDE: f64 = 280.0;

const POSITION_JITTER_DEG: f64 = 0.01;
const ALTITUDE_JITTER_M: f64 = 5.0;

/// Pseudo-random readings in the ranges a mounted sensor produces at rest.
pub struct SimulatedSource {
    rng: fastrand::Rng,
}

impl SimulatedSource {
    pub fn new() -> Self {
        Self {
            rng: fastrand::Rng::new(),
        }
    }

    /// Deterministic sequence for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
        }
    }

    fn jitter(&mut self, span: f64) -> f64 {
        (self.rng.f64() * 2.0 - 1.0) * span
    }
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorSource for SimulatedSource {
    fn read_gps(&mut self) -> Result<Option<GpsFix>, SensorReadError> {
        Ok(Some(GpsFix {
            time: Utc::now().format("%H:%M:%S").to_string(),
            latitude: HOME_LATITUDE + self.jitter(POSITION_JITTER_DEG),
            longitude: HOME_LONGITUDE + self.jitter(POSITION_JITTER_DEG),
            altitude: HOME_ALTITUDE + self.jitter(ALTITUDE_JITTER_M),
            satellite_count: self.rng.u32(4..=12),
        }))
    }

    fn read_accelerometer(&mut self) -> Result<Option<AccelReading>, SensorReadError> {
        Ok(Some(AccelReading::from_raw(
            self.rng.i16(-2000..=2000),
            self.rng.i16(-14000..=-12000),
            self.rng.i16(-8000..=-6000),
        )))
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readings_stay_in_range() {
        let mut source = SimulatedSource::with_seed(7);

        for _ in 0..200 {
            let poll = source.poll();
            let gps = poll.sample.gps.unwrap();
            let accel = poll.sample.accelerometer.unwrap();

            assert!((gps.latitude - HOME_LATITUDE).abs() <= POSITION_JITTER_DEG);
            assert!((gps.longitude - HOME_LONGITUDE).abs() <= POSITION_JITTER_DEG);
            assert!((gps.altitude - HOME_ALTITUDE).abs() <= ALTITUDE_JITTER_M);
            assert!((4..=12).contains(&gps.satellite_count));

            assert!((-2000..=2000).contains(&accel.raw_x));
            assert!((-14000..=-12000).contains(&accel.raw_y));
            assert!((-8000..=-6000).contains(&accel.raw_z));
            assert!(poll.gps_error.is_none() && poll.accel_error.is_none());
        }
    }

    #[test]
    fn test_seeded_sources_agree() {
        let mut a = SimulatedSource::with_seed(42);
        let mut b = SimulatedSource::with_seed(42);

        assert_eq!(
            a.read_accelerometer().unwrap(),
            b.read_accelerometer().unwrap()
        );
    }
}
