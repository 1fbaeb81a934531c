//! Error types for thermolog-types.

use thiserror::Error;

/// A sensor sample that must not be persisted.
///
/// Samples are checked once, at the producer boundary, so a log never holds
/// values outside the sensor's physical range.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum RangeError {
    /// Temperature is NaN or outside the supported range.
    #[error("temperature {value} °C is outside [{min}, {max}]")]
    Temperature { value: f32, min: f32, max: f32 },

    /// Humidity is NaN or outside 0-100 %RH.
    #[error("humidity {value} % is outside [{min}, {max}]")]
    Humidity { value: f32, min: f32, max: f32 },
}

/// Result type alias using thermolog-types' RangeError type.
pub type RangeResult<T> = std::result::Result<T, RangeError>;
