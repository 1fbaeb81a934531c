//! Sampling loop and HTTP API for the thermolog temperature/humidity logger.
//!
//! This crate provides a service that:
//! - Samples a temperature/humidity sensor on a fixed cadence
//! - Appends valid, timestamped readings to the reading log
//! - Compacts the log down to the retention window every few hours
//! - Exposes the log over a small JSON API
//!
//! # REST API Endpoints
//!
//! - `GET /api/health` - Service health check
//! - `GET /api/latest` - Most recent reading
//! - `GET /api/history?since=<epoch>` - Readings at or after a timestamp
//! - `GET /api/history?days=<n>` - Readings from the last `n` days
//! - `GET /api/history` - Readings inside the retention window
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/thermolog/server.toml`:
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:8080"
//!
//! [storage]
//! path = "/var/lib/thermolog/readings.csv"
//!
//! [sampling]
//! interval_secs = 60
//! compact_interval_secs = 21600
//!
//! [retention]
//! days = 7
//!
//! [sensor]
//! kind = "hwmon"
//! hwmon_path = "/sys/class/hwmon/hwmon2"
//! ```

pub mod api;
pub mod clock;
pub mod config;
pub mod sampler;
pub mod sensor;
pub mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    ClockConfig, Config, ConfigError, RetentionConfig, SamplingConfig, SensorConfig, SensorKind,
    ServerConfig, StorageConfig,
};
pub use sampler::{CompactOutcome, SampleOutcome, Sampler};
pub use sensor::{HwmonSensor, MockSensor, SensorError, SensorProvider};
pub use state::{AppState, SamplerStats};
