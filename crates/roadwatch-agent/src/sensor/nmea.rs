// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! NMEA 0183 `$GPGGA` parsing.
//!
//! ```text
//! $GPGGA,hhmmss.ss,ddmm.mmmm,N,dddmm.mmmm,E,q,ss,h.h,alt,M,geo,M,age,ref*cs
//!        1         2         3 4          5 6 7  8   9
//! ```

use crate::sample::GpsFix;

/// Sentence prefix handled by [`parse_gpgga`].
pub const GPGGA_PREFIX: &str = "$GPGGA";

const MIN_FIELDS: usize = 15;

/// Parse a `$GPGGA` sentence into a fix.
///
/// Returns `None` for other sentence types, truncated sentences, or any
/// unparsable field (a receiver without a fix sends empty fields).
pub fn parse_gpgga(sentence: &str) -> Option<GpsFix> {
    let sentence = sentence.trim();
    if !sentence.starts_with(GPGGA_PREFIX) {
        return None;
    }

    // Drop the checksum suffix from the last field
    let body = sentence.split('*').next()?;
    let parts: Vec<&str> = body.split(',').collect();
    if parts.len() < MIN_FIELDS {
        return None;
    }

    let time = parse_time(parts[1])?;
    let latitude = parse_coordinate(parts[2], 2, parts[3], 'S')?;
    let longitude = parse_coordinate(parts[4], 3, parts[5], 'W')?;
    let satellite_count = parts[7].parse().ok()?;
    let altitude = parse_finite(parts[9])?;

    Some(GpsFix {
        time,
        latitude,
        longitude,
        altitude,
        satellite_count,
    })
}

fn parse_time(field: &str) -> Option<String> {
    let hms = field.get(..6)?;
    if !hms.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(format!("{}:{}:{}", &hms[..2], &hms[2..4], &hms[4..6]))
}

/// `f64` parse that refuses `NaN` and infinities.
fn parse_finite(field: &str) -> Option<f64> {
    field.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// `degree_digits` is 2 for latitude (`ddmm.mmmm`) and 3 for longitude.
fn parse_coordinate(
    field: &str,
    degree_digits: usize,
    hemisphere: &str,
    negative: char,
) -> Option<f64> {
    let degrees = parse_finite(field.get(..degree_digits)?)?;
    let minutes = parse_finite(field.get(degree_digits..)?)?;
    let value = degrees + minutes / 60.0;

    if hemisphere.starts_with(negative) {
        Some(-value)
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KINSHASA: &str = "$GPGGA,092653.00,0419.5000,S,01518.6000,E,1,08,0.9,280.4,M,12.1,M,,*47";

    #[test]
    fn test_parse_southern_eastern_fix() {
        let fix = parse_gpgga(KINSHASA).unwrap();

        assert_eq!(fix.time, "09:26:53");
        assert!((fix.latitude - -4.325).abs() < 1e-9);
        assert!((fix.longitude - 15.31).abs() < 1e-9);
        assert!((fix.altitude - 280.4).abs() < 1e-9);
        assert_eq!(fix.satellite_count, 8);
    }

    #[test]
    fn test_parse_northern_western_fix() {
        let line = "$GPGGA,123519,4807.038,N,01131.000,W,1,08,0.9,545.4,M,46.9,M,,*47\r\n";
        let fix = parse_gpgga(line).unwrap();

        assert!((fix.latitude - (48.0 + 7.038 / 60.0)).abs() < 1e-9);
        assert!((fix.longitude - -(11.0 + 31.0 / 60.0)).abs() < 1e-9);
        assert_eq!(fix.time, "12:35:19");
    }

    #[test]
    fn test_reject_other_sentences() {
        let rmc = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";
        assert!(parse_gpgga(rmc).is_none());
        assert!(parse_gpgga("").is_none());
    }

    #[test]
    fn test_reject_truncated_sentence() {
        assert!(parse_gpgga("$GPGGA,123519,4807.038,N,01131.000,E,1,08").is_none());
    }

    #[test]
    fn test_reject_empty_fix_fields() {
        // Receiver powered up without a fix
        assert!(parse_gpgga("$GPGGA,,,,,,0,00,99.99,,,,,,*48").is_none());
    }

    #[test]
    fn test_reject_non_finite_numbers() {
        let nan_altitude = "$GPGGA,092653.00,0419.5000,S,01518.6000,E,1,08,0.9,NaN,M,12.1,M,,*47";
        assert!(parse_gpgga(nan_altitude).is_none());

        let inf_minutes = "$GPGGA,092653.00,04inf,S,01518.6000,E,1,08,0.9,280.4,M,12.1,M,,*47";
        assert!(parse_gpgga(inf_minutes).is_none());

        let inf_altitude = "$GPGGA,092653.00,0419.5000,S,01518.6000,E,1,08,0.9,-inf,M,12.1,M,,*47";
        assert!(parse_gpgga(inf_altitude).is_none());
    }
}
