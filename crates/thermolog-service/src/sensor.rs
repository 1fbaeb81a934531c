//! Sensor providers.
//!
//! The sampler only needs "give me a temperature/humidity pair, or tell me
//! it failed". [`SensorProvider`] abstracts over the real hardware and the
//! [`MockSensor`] used in tests and demos.
//!
//! Range checks are not the provider's job: the sampler validates every
//! [`Sample`] before it is stored.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use thermolog_types::Sample;
use tokio::sync::RwLock;

use crate::config::{SensorConfig, SensorKind};

/// Jitter applied by the configured mock sensor.
const MOCK_JITTER: f32 = 0.3;

/// Errors from a sensor read.
#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    /// A sysfs attribute could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// A sysfs attribute held something other than an integer.
    #[error("Unexpected value '{value}' in {path}")]
    Parse { path: PathBuf, value: String },
    /// The sensor reported a failure.
    #[error("Sensor unavailable: {0}")]
    Unavailable(String),
}

/// Something that can produce a temperature/humidity sample.
#[async_trait]
pub trait SensorProvider: Send + Sync {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    /// Take one measurement.
    async fn read(&self) -> Result<Sample, SensorError>;
}

/// Build the provider selected in the configuration.
pub fn from_config(config: &SensorConfig) -> Arc<dyn SensorProvider> {
    match config.kind {
        SensorKind::Hwmon => Arc::new(HwmonSensor::new(&config.hwmon_path)),
        SensorKind::Mock => Arc::new(MockSensor::default().with_jitter(MOCK_JITTER)),
    }
}

/// Linux hwmon sensor (e.g. the `aht10` driver serving AHT10/AHT20/AHT30).
///
/// Reads `temp1_input` (millidegrees Celsius) and `humidity1_input`
/// (milli-percent relative humidity) from the device directory.
#[derive(Debug, Clone)]
pub struct HwmonSensor {
    dir: PathBuf,
    name: String,
}

impl HwmonSensor {
    /// Create a provider reading from `dir`, e.g. `/sys/class/hwmon/hwmon2`.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref().to_path_buf();
        Self {
            name: format!("hwmon:{}", dir.display()),
            dir,
        }
    }

    async fn read_milli(&self, attribute: &str) -> Result<f32, SensorError> {
        let path = self.dir.join(attribute);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| SensorError::Read {
                path: path.clone(),
                source: e,
            })?;
        let value = raw.trim();
        value
            .parse::<i64>()
            .map(|milli| milli as f32 / 1000.0)
            .map_err(|_| SensorError::Parse {
                path,
                value: value.to_string(),
            })
    }
}

#[async_trait]
impl SensorProvider for HwmonSensor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read(&self) -> Result<Sample, SensorError> {
        let temperature = self.read_milli("temp1_input").await?;
        let humidity = self.read_milli("humidity1_input").await?;
        Ok(Sample::new(temperature, humidity))
    }
}

/// A scripted sensor for tests and hardware-free runs.
///
/// # Features
///
/// - **Fixed values**: returns the configured sample, optionally with jitter
/// - **Failure injection**: fail every read, or only the next N reads
#[derive(Debug)]
pub struct MockSensor {
    sample: RwLock<Sample>,
    jitter: f32,
    read_count: AtomicU32,
    should_fail: AtomicBool,
    remaining_failures: AtomicU32,
}

impl MockSensor {
    /// Create a mock sensor that always returns `sample`.
    pub fn new(sample: Sample) -> Self {
        Self {
            sample: RwLock::new(sample),
            jitter: 0.0,
            read_count: AtomicU32::new(0),
            should_fail: AtomicBool::new(false),
            remaining_failures: AtomicU32::new(0),
        }
    }

    /// Add uniform noise of up to `±jitter` to both channels.
    pub fn with_jitter(mut self, jitter: f32) -> Self {
        self.jitter = jitter.abs();
        self
    }

    /// Replace the sample returned by subsequent reads.
    pub async fn set_sample(&self, sample: Sample) {
        *self.sample.write().await = sample;
    }

    /// Make every read fail until cleared.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `count` reads, then recover.
    pub fn fail_next(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::SeqCst);
    }

    /// Number of reads attempted so far.
    pub fn read_count(&self) -> u32 {
        self.read_count.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.should_fail.load(Ordering::SeqCst)
            || self
                .remaining_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
    }

    fn noise(&self) -> f32 {
        if self.jitter == 0.0 {
            0.0
        } else {
            (rand::random::<f32>() * 2.0 - 1.0) * self.jitter
        }
    }
}

impl Default for MockSensor {
    fn default() -> Self {
        Self::new(Sample::new(21.0, 45.0))
    }
}

#[async_trait]
impl SensorProvider for MockSensor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn read(&self) -> Result<Sample, SensorError> {
        self.read_count.fetch_add(1, Ordering::SeqCst);

        if self.take_failure() {
            return Err(SensorError::Unavailable("mock failure".to_string()));
        }

        let base = *self.sample.read().await;
        Ok(Sample::new(
            base.temperature + self.noise(),
            base.humidity + self.noise(),
        ))
    }
}
