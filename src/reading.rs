use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::sync::Arc;

/// One measurement as reported by the `/sensor_data` endpoint
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Reading {

    /// Identifier of the device that took the measurement
    pub device_id: String,

    /// ISO-8601 time of the measurement on the device, second resolution
    pub timestamp: String,

    /// Temperature in degrees Celsius
    pub temperature: f64,

    /// RMS voltage in Volts
    pub voltage: f64,

    /// RMS current in Amperes
    pub current: f64,

    /// Real power in Watts
    pub watts: f64,

    /// Device status code, absent on older firmware
    #[serde(default)]
    pub status_code: Option<i64>,
}

impl Reading {

    /// Time of the measurement, parsed from `timestamp`
    pub fn measured_on(&self) -> Option<NaiveDateTime> {
        parse_timestamp(&self.timestamp)
    }
}

/// Parse the timestamp formats emitted by the devices.
///
/// RFC 3339 with an offset is normalised to UTC; naive timestamps (with `T`
/// or a space between date and time) are taken as they are.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(value) {
        return Some(with_offset.naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
}

/// Numeric field of a reading that can be plotted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Temperature,
    Voltage,
    Current,
    Watts,
}

impl Field {

    pub fn value_of(&self, reading: &Reading) -> f64 {
        match self {
            Field::Temperature => reading.temperature,
            Field::Voltage => reading.voltage,
            Field::Current => reading.current,
            Field::Watts => reading.watts,
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Field::Temperature => write!(f, "Temperature (°C)"),
            Field::Voltage => write!(f, "Voltage (V)"),
            Field::Current => write!(f, "Current (A)"),
            Field::Watts => write!(f, "Watts (W)"),
        }
    }
}

/// The readings of the last successful poll, newest first.
///
/// The buffer is shared immutably; a poll builds a new one and swaps it in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingBuffer {
    readings: Arc<[Reading]>,
}

impl ReadingBuffer {

    /// Build a buffer from a server response, keeping the server's order
    pub fn from_server(readings: Vec<Reading>) -> Result<ReadingBuffer, MalformedReading> {
        if let Some(bad) = readings.iter().find(|r| r.measured_on().is_none()) {
            return Err(MalformedReading {
                device_id: bad.device_id.clone(),
                timestamp: bad.timestamp.clone(),
            });
        }
        Ok(ReadingBuffer { readings: readings.into() })
    }

    /// Whether the newest-first contract of the server holds
    pub fn is_descending(&self) -> bool {
        self.readings.windows(2).all(|pair| {
            match (pair[0].measured_on(), pair[1].measured_on()) {
                (Some(newer), Some(older)) => newer >= older,
                _ => false,
            }
        })
    }

    /// Whether both buffers share the same allocation
    pub fn ptr_eq(&self, other: &ReadingBuffer) -> bool {
        Arc::ptr_eq(&self.readings, &other.readings)
    }
}

impl Deref for ReadingBuffer {
    type Target = [Reading];

    fn deref(&self) -> &[Reading] {
        &self.readings
    }
}

/// A reading whose timestamp cannot be parsed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("reading of {device_id} has an unparseable timestamp {timestamp:?}")]
pub struct MalformedReading {
    pub device_id: String,
    pub timestamp: String,
}

#[cfg(test)]
pub(crate) fn reading(timestamp: &str, watts: f64) -> Reading {
    Reading {
        device_id: "dev-1".to_string(),
        timestamp: timestamp.to_string(),
        temperature: 21.5,
        voltage: 230.0,
        current: watts / 230.0,
        watts,
        status_code: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_timestamp_formats() {
        let expected = NaiveDateTime::parse_from_str("2025-03-01 10:00:02", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(parse_timestamp("2025-03-01T10:00:02"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-01 10:00:02"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-01T11:00:02+01:00"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn server_json_without_status_code_is_accepted() {
        let body = r#"[{"device_id":"a","timestamp":"2025-03-01T10:00:02",
            "temperature":20.0,"voltage":231.2,"current":0.5,"watts":115.6}]"#;
        let readings: Vec<Reading> = serde_json::from_str(body).unwrap();
        assert_eq!(readings[0].status_code, None);
        assert_eq!(readings[0].watts, 115.6);
    }

    #[test]
    fn buffer_rejects_unparseable_timestamp() {
        let readings = vec![reading("2025-03-01T10:00:02", 5.0), reading("garbage", 5.0)];
        let err = ReadingBuffer::from_server(readings).unwrap_err();
        assert_eq!(err.timestamp, "garbage");
    }

    #[test]
    fn buffer_keeps_server_order() {
        let readings = vec![
            reading("2025-03-01T10:00:02", 5.0),
            reading("2025-03-01T10:00:01", 6.0),
        ];
        let buffer = ReadingBuffer::from_server(readings.clone()).unwrap();
        assert_eq!(&buffer[..], &readings[..]);
        assert!(buffer.is_descending());

        let ascending = ReadingBuffer::from_server(readings.into_iter().rev().collect()).unwrap();
        assert!(!ascending.is_descending());
    }
}
