//! Shared types for the thermolog temperature/humidity logger.
//!
//! This crate holds the reading model used by both the storage layer
//! (thermolog-store) and the sampling/HTTP service (thermolog-service).
//!
//! # Features
//!
//! - [`Sample`]: a raw sensor measurement, validated at the producer boundary
//! - [`Reading`]: a timestamped, storable measurement
//! - Sensor bounds and the epoch floor used to detect an unsynchronized clock
//!
//! # Example
//!
//! ```
//! use thermolog_types::{Reading, Sample};
//!
//! let reading = Sample::new(21.0, 49.5).at(1_700_000_120).unwrap();
//! assert_eq!(reading, Reading::new(1_700_000_120, 21.0, 49.5));
//! ```

pub mod error;
pub mod types;

pub use error::{RangeError, RangeResult};
pub use types::{
    DEFAULT_EPOCH_FLOOR, MAX_HUMIDITY, MAX_TEMPERATURE, MIN_HUMIDITY, MIN_TEMPERATURE, Reading,
    Sample, Timestamp,
};

#[cfg(test)]
mod tests {
    use super::*;

    // --- Sample validation tests ---

    #[test]
    fn test_sample_within_bounds() {
        assert!(Sample::new(20.0, 50.0).validate().is_ok());
        assert!(Sample::new(MIN_TEMPERATURE, MIN_HUMIDITY).validate().is_ok());
        assert!(Sample::new(MAX_TEMPERATURE, MAX_HUMIDITY).validate().is_ok());
    }

    #[test]
    fn test_sample_temperature_out_of_range() {
        let err = Sample::new(-40.5, 50.0).validate().unwrap_err();
        assert!(matches!(err, RangeError::Temperature { .. }));

        let err = Sample::new(125.1, 50.0).validate().unwrap_err();
        assert!(matches!(err, RangeError::Temperature { .. }));
    }

    #[test]
    fn test_sample_humidity_out_of_range() {
        let err = Sample::new(20.0, -0.1).validate().unwrap_err();
        assert!(matches!(err, RangeError::Humidity { .. }));

        let err = Sample::new(20.0, 100.5).validate().unwrap_err();
        assert!(matches!(err, RangeError::Humidity { .. }));
    }

    #[test]
    fn test_sample_nan_rejected() {
        assert!(Sample::new(f32::NAN, 50.0).validate().is_err());
        assert!(Sample::new(20.0, f32::NAN).validate().is_err());
        assert!(Sample::new(f32::INFINITY, 50.0).validate().is_err());
    }

    #[test]
    fn test_sample_at_produces_reading() {
        let reading = Sample::new(20.5, 51.0).at(1_700_000_060).unwrap();
        assert_eq!(reading.timestamp, 1_700_000_060);
        assert_eq!(reading.temperature, 20.5);
        assert_eq!(reading.humidity, 51.0);
    }

    #[test]
    fn test_sample_at_rejects_invalid() {
        assert!(Sample::new(200.0, 51.0).at(1_700_000_060).is_err());
    }

    // --- Reading tests ---

    #[test]
    fn test_reading_cutoff_is_inclusive() {
        let reading = Reading::new(1060, 20.5, 51.0);
        assert!(reading.is_at_or_after(1060));
        assert!(reading.is_at_or_after(0));
        assert!(!reading.is_at_or_after(1061));
    }

    #[test]
    fn test_reading_display() {
        let reading = Reading::new(1120, 21.0, 49.5);
        assert_eq!(reading.to_string(), "ts=1120 T=21.00°C H=49.50%");
    }

    #[test]
    fn test_range_error_display() {
        let err = Sample::new(130.0, 50.0).validate().unwrap_err();
        assert_eq!(err.to_string(), "temperature 130 °C is outside [-40, 125]");
    }

    // --- Serialization tests ---

    #[test]
    fn test_reading_serialization() {
        let reading = Reading::new(1120, 21.0, 49.5);
        let json = serde_json::to_string(&reading).unwrap();
        assert_eq!(json, r#"{"ts":1120,"tempC":21.0,"humidity":49.5}"#);
    }

    #[test]
    fn test_reading_deserialization() {
        let json = r#"{"ts":1000,"tempC":20.0,"humidity":50.0}"#;
        let reading: Reading = serde_json::from_str(json).unwrap();
        assert_eq!(reading, Reading::new(1000, 20.0, 50.0));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn in_range_samples_always_validate(
                t in MIN_TEMPERATURE..=MAX_TEMPERATURE,
                h in MIN_HUMIDITY..=MAX_HUMIDITY,
            ) {
                prop_assert!(Sample::new(t, h).validate().is_ok());
            }

            #[test]
            fn too_hot_samples_never_validate(t in 125.01f32..1000.0, h in 0.0f32..=100.0) {
                prop_assert!(Sample::new(t, h).validate().is_err());
            }
        }
    }
}
