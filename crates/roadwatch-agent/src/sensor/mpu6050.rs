// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MPU-6050 accelerometer over the Linux I2C character device.

use super::SensorReadError;
use crate::sample::AccelReading;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// Default 7-bit bus address (AD0 low).
pub const MPU_ADDR: u16 = 0x68;

const PWR_MGMT_1: u8 = 0x6B;
const ACCEL_XOUT_H: u8 = 0x3B;

/// `ioctl` request selecting the slave address (linux/i2c-dev.h).
const I2C_SLAVE: libc::c_ulong = 0x0703;

/// MPU-6050 handle bound to one bus address.
pub struct Mpu6050 {
    bus: File,
    bus_path: String,
}

impl Mpu6050 {
    /// Open the bus, select `address` and wake the sensor.
    pub fn open(bus_path: impl AsRef<Path>, address: u16) -> Result<Self, SensorReadError> {
        let bus_path = bus_path.as_ref();
        let bus = OpenOptions::new().read(true).write(true).open(bus_path)?;

        // SAFETY: `bus` keeps the descriptor open; I2C_SLAVE takes the address
        // by value.
        let rc = unsafe {
            libc::ioctl(
                bus.as_raw_fd(),
                I2C_SLAVE as _,
                libc::c_ulong::from(address),
            )
        };
        if rc < 0 {
            return Err(std::io::Error::last_os_error().into());
        }

        let mut mpu = Self {
            bus,
            bus_path: bus_path.display().to_string(),
        };
        mpu.wake()?;
        tracing::info!("MPU-6050 initialized on {} (0x{:02x})", mpu.bus_path, address);
        Ok(mpu)
    }

    /// Clear the sleep bit in PWR_MGMT_1.
    fn wake(&mut self) -> Result<(), SensorReadError> {
        self.bus.write_all(&[PWR_MGMT_1, 0])?;
        Ok(())
    }

    /// Burst-read the three acceleration registers.
    pub fn read(&mut self) -> Result<AccelReading, SensorReadError> {
        self.bus.write_all(&[ACCEL_XOUT_H])?;
        let mut regs = [0u8; 6];
        self.bus.read_exact(&mut regs)?;
        Ok(decode_accel(&regs))
    }
}

/// Registers are big-endian two's complement, X/Y/Z in order.
fn decode_accel(regs: &[u8; 6]) -> AccelReading {
    AccelReading::from_raw(
        i16::from_be_bytes([regs[0], regs[1]]),
        i16::from_be_bytes([regs[2], regs[3]]),
        i16::from_be_bytes([regs[4], regs[5]]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_signed_registers() {
        let reading = decode_accel(&[0x03, 0xE8, 0xCD, 0x38, 0x80, 0x00]);

        assert_eq!(reading.raw_x, 1000);
        assert_eq!(reading.raw_y, -13000);
        assert_eq!(reading.raw_z, i16::MIN);
        assert!((reading.x_ms2 - 1000.0 / 16384.0 * 9.81).abs() < 1e-9);
    }

    #[test]
    fn test_open_missing_bus_fails() {
        assert!(Mpu6050::open("/nonexistent/i2c-9", MPU_ADDR).is_err());
    }
}
