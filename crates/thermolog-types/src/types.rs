//! Core types for temperature/humidity readings.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::RangeError;

/// Wall-clock time in whole seconds since the Unix epoch.
pub type Timestamp = i64;

/// Lowest temperature the sensor can report, in °C.
pub const MIN_TEMPERATURE: f32 = -40.0;
/// Highest temperature the sensor can report, in °C.
pub const MAX_TEMPERATURE: f32 = 125.0;
/// Lowest relative humidity, in %.
pub const MIN_HUMIDITY: f32 = 0.0;
/// Highest relative humidity, in %.
pub const MAX_HUMIDITY: f32 = 100.0;

/// Wall-clock times at or below this value are treated as "not yet
/// synchronized" (roughly November 2023).
pub const DEFAULT_EPOCH_FLOOR: Timestamp = 1_700_000_000;

/// A raw measurement straight from the sensor, not yet validated or timestamped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Temperature in degrees Celsius.
    pub temperature: f32,
    /// Relative humidity percentage.
    pub humidity: f32,
}

impl Sample {
    /// Create a new sample.
    pub fn new(temperature: f32, humidity: f32) -> Self {
        Self {
            temperature,
            humidity,
        }
    }

    /// Check the sample against the sensor's physical range.
    ///
    /// NaN fails both comparisons and is therefore rejected too.
    ///
    /// # Examples
    ///
    /// ```
    /// use thermolog_types::Sample;
    ///
    /// assert!(Sample::new(21.5, 48.0).validate().is_ok());
    /// assert!(Sample::new(130.0, 48.0).validate().is_err());
    /// assert!(Sample::new(21.5, f32::NAN).validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), RangeError> {
        if !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&self.temperature) {
            return Err(RangeError::Temperature {
                value: self.temperature,
                min: MIN_TEMPERATURE,
                max: MAX_TEMPERATURE,
            });
        }
        if !(MIN_HUMIDITY..=MAX_HUMIDITY).contains(&self.humidity) {
            return Err(RangeError::Humidity {
                value: self.humidity,
                min: MIN_HUMIDITY,
                max: MAX_HUMIDITY,
            });
        }
        Ok(())
    }

    /// Validate the sample and stamp it with a time, producing a storable reading.
    pub fn at(self, timestamp: Timestamp) -> Result<Reading, RangeError> {
        self.validate()?;
        Ok(Reading {
            timestamp,
            temperature: self.temperature,
            humidity: self.humidity,
        })
    }
}

/// One timestamped measurement, the unit of the reading log.
///
/// Serializes to the compact JSON projection served by the HTTP API:
/// `{"ts": 1700000000, "tempC": 21.5, "humidity": 48.0}`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Reading {
    /// Seconds since the Unix epoch.
    #[cfg_attr(feature = "serde", serde(rename = "ts"))]
    pub timestamp: Timestamp,
    /// Temperature in degrees Celsius.
    #[cfg_attr(feature = "serde", serde(rename = "tempC"))]
    pub temperature: f32,
    /// Relative humidity percentage.
    pub humidity: f32,
}

impl Reading {
    /// Create a reading without range checks.
    ///
    /// Use [`Sample::at`] on the acquisition path; this constructor exists for
    /// decoding records that were validated when they were written.
    pub fn new(timestamp: Timestamp, temperature: f32, humidity: f32) -> Self {
        Self {
            timestamp,
            temperature,
            humidity,
        }
    }

    /// Whether this reading falls inside a window starting at `cutoff`.
    #[inline]
    pub fn is_at_or_after(&self, cutoff: Timestamp) -> bool {
        self.timestamp >= cutoff
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ts={} T={:.2}°C H={:.2}%",
            self.timestamp, self.temperature, self.humidity
        )
    }
}
