// Device line decoding
//
// The board prints newline-terminated JSON records such as `{"CO2": 612.4}`,
// mixed with boot banners, partial writes and line noise. Anything that does
// not open a record is noise; a record that fails to parse is rejected.

use chrono::{DateTime, Local};
use serde::Deserialize;
use thiserror::Error;

/// One parsed sample from the device
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub raw_value: f64,
    pub received_at: DateTime<Local>,
}

/// Outcome of decoding one raw device line
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    Reading(Reading),
    /// Empty line or text that does not open a record
    Noise,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PayloadError {
    #[error("Invalid JSON record: {0}")]
    InvalidJson(String),

    #[error("CO2 field is not numeric: {0}")]
    NonNumeric(String),
}

/// Wire payload; any other fields the firmware sends are ignored
#[derive(Debug, Deserialize)]
struct DevicePayload {
    #[serde(rename = "CO2", default)]
    co2: Concentration,
}

/// Firmware revisions print the concentration either as a number or as text
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Concentration {
    Number(f64),
    Text(String),
}

impl Default for Concentration {
    fn default() -> Self {
        Concentration::Number(0.0)
    }
}

impl Concentration {
    fn into_ppm(self) -> Result<f64, PayloadError> {
        match self {
            Concentration::Number(v) => Ok(v),
            Concentration::Text(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or(PayloadError::NonNumeric(s)),
        }
    }
}

/// Decode raw bytes, dropping invalid UTF-8 sequences instead of failing
pub fn decode_ignoring_invalid(bytes: &[u8]) -> String {
    bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()
}

/// Parse one raw line from the device.
///
/// A record with no `CO2` field yields a reading of `0`.
pub fn parse_line(bytes: &[u8]) -> Result<LineOutcome, PayloadError> {
    let text = decode_ignoring_invalid(bytes);
    let trimmed = text.trim();

    if trimmed.is_empty() || !trimmed.starts_with('{') {
        return Ok(LineOutcome::Noise);
    }

    let payload: DevicePayload = serde_json::from_str(trimmed).map_err(|e| {
        if e.is_data() {
            PayloadError::NonNumeric(e.to_string())
        } else {
            PayloadError::InvalidJson(e.to_string())
        }
    })?;

    let raw_value = payload.co2.into_ppm()?;

    Ok(LineOutcome::Reading(Reading {
        raw_value,
        received_at: Local::now(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_of(line: &[u8]) -> f64 {
        match parse_line(line).unwrap() {
            LineOutcome::Reading(r) => r.raw_value,
            LineOutcome::Noise => panic!("expected a reading for {:?}", line),
        }
    }

    #[test]
    fn test_parses_integer_and_float_values() {
        assert_eq!(value_of(b"{\"CO2\": 450}\r\n"), 450.0);
        assert_eq!(value_of(b"  {\"CO2\": 612.4, \"temp\": 21}  "), 612.4);
    }

    #[test]
    fn test_numeric_text_is_accepted() {
        assert_eq!(value_of(b"{\"CO2\": \"833.5\"}"), 833.5);
    }

    #[test]
    fn test_missing_field_defaults_to_zero() {
        assert_eq!(value_of(b"{\"temp\": 21.5}"), 0.0);
    }

    #[test]
    fn test_noise_is_skipped() {
        let lines: [&[u8]; 5] = [b"", b"   \r\n", b"garbage", b"MQ135 warming up...", b"CO2=450"];
        for line in lines {
            assert_eq!(parse_line(line).unwrap(), LineOutcome::Noise);
        }
    }

    #[test]
    fn test_malformed_records_are_rejected() {
        assert!(matches!(
            parse_line(b"{malformed"),
            Err(PayloadError::InvalidJson(_))
        ));
        assert!(matches!(
            parse_line(b"{\"CO2\": 45"),
            Err(PayloadError::InvalidJson(_))
        ));
        assert!(matches!(
            parse_line(b"{\"CO2\": \"high\"}"),
            Err(PayloadError::NonNumeric(_))
        ));
        assert!(matches!(
            parse_line(b"{\"CO2\": true}"),
            Err(PayloadError::NonNumeric(_))
        ));
        assert!(matches!(
            parse_line(b"{\"CO2\": null}"),
            Err(PayloadError::NonNumeric(_))
        ));
    }

    #[test]
    fn test_invalid_utf8_is_dropped() {
        let line = b"\xff\xfe{\"CO2\": 7\xc300}";
        assert_eq!(decode_ignoring_invalid(line), "{\"CO2\": 700}");
        assert_eq!(value_of(line), 700.0);
    }
}
