//! Air-quality classification of CO2 concentrations.
//!
//! A single fixed policy is applied to the raw ppm value: readings up to
//! [`GOOD_MAX_PPM`] are `Good`, up to [`REGULAR_MAX_PPM`] are `Regular`, and
//! anything above is `Poor`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Highest concentration (inclusive) still classified as `Good`
pub const GOOD_MAX_PPM: f64 = 720.0;

/// Highest concentration (inclusive) still classified as `Regular`
pub const REGULAR_MAX_PPM: f64 = 1137.0;

/// Air-quality label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AirStatus {
    Good,
    Regular,
    Poor,
    /// No reading has been classified yet, or a stored record was unreadable
    Unknown,
}

impl AirStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AirStatus::Good => "Good",
            AirStatus::Regular => "Regular",
            AirStatus::Poor => "Poor",
            AirStatus::Unknown => "Unknown",
        }
    }
}

impl Default for AirStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

impl fmt::Display for AirStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unrecognized air status label: {0}")]
pub struct UnknownStatusLabel(pub String);

impl FromStr for AirStatus {
    type Err = UnknownStatusLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Good" => Ok(AirStatus::Good),
            "Regular" => Ok(AirStatus::Regular),
            "Poor" => Ok(AirStatus::Poor),
            "Unknown" => Ok(AirStatus::Unknown),
            other => Err(UnknownStatusLabel(other.to_string())),
        }
    }
}

/// A value together with the label derived from it
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Classification {
    pub value: f64,
    pub status: AirStatus,
}

/// Classify a concentration in ppm.
///
/// The value is rounded to one decimal place first and the status is
/// derived from the rounded value, so `status` always agrees with the
/// `value` that gets published and logged.
pub fn classify(raw_ppm: f64) -> Classification {
    let value = round_one_decimal(raw_ppm);
    let status = if value <= GOOD_MAX_PPM {
        AirStatus::Good
    } else if value <= REGULAR_MAX_PPM {
        AirStatus::Regular
    } else {
        AirStatus::Poor
    };

    Classification { value, status }
}

/// Values too large to scale keep their raw form so the result stays finite
fn round_one_decimal(value: f64) -> f64 {
    let rounded = (value * 10.0).round() / 10.0;
    if rounded.is_finite() {
        rounded
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_boundaries() {
        assert_eq!(classify(720.0).status, AirStatus::Good);
        assert_eq!(classify(721.0).status, AirStatus::Regular);
        assert_eq!(classify(1137.0).status, AirStatus::Regular);
        assert_eq!(classify(1138.0).status, AirStatus::Poor);
    }

    #[test]
    fn test_low_and_negative_values_are_good() {
        assert_eq!(classify(0.0).status, AirStatus::Good);
        assert_eq!(classify(-15.0).status, AirStatus::Good);
    }

    #[test]
    fn test_rounding_decides_the_boundary() {
        // 720.04 rounds down to 720.0 and must stay Good
        let c = classify(720.04);
        assert_eq!(c.value, 720.0);
        assert_eq!(c.status, AirStatus::Good);

        let c = classify(720.06);
        assert_eq!(c.value, 720.1);
        assert_eq!(c.status, AirStatus::Regular);
    }

    #[test]
    fn test_huge_values_stay_finite() {
        let c = classify(1.7e308);
        assert!(c.value.is_finite());
        assert_eq!(c.value, 1.7e308);
        assert_eq!(c.status, AirStatus::Poor);

        let c = classify(-1.7e308);
        assert!(c.value.is_finite());
        assert_eq!(c.status, AirStatus::Good);
    }

    #[test]
    fn test_classify_is_deterministic() {
        for v in [350.0, 719.9, 900.0, 1137.04, 2500.0] {
            assert_eq!(classify(v), classify(v));
        }
    }

    #[test]
    fn test_status_label_roundtrip() {
        for status in [
            AirStatus::Good,
            AirStatus::Regular,
            AirStatus::Poor,
            AirStatus::Unknown,
        ] {
            assert_eq!(status.as_str().parse::<AirStatus>().unwrap(), status);
        }
        assert!("Bueno".parse::<AirStatus>().is_err());
    }
}
