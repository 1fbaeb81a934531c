//! Background sampler.
//!
//! Drives two periodic jobs off the tokio monotonic clock: taking a sensor
//! reading and appending it to the log, and compacting the log down to the
//! retention window. Wall-clock time is only used to stamp readings and to
//! compute compaction cutoffs, never to schedule.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use thermolog_store::{CompactStats, ReadingLog, cutoff_before};
use thermolog_types::Reading;

use crate::sensor::SensorProvider;
use crate::state::AppState;

/// A trigger that fires every `interval` on a millisecond tick counter.
///
/// Each fire advances the due time by exactly one interval, so a late poll
/// does not shift later fires. If the loop falls several intervals behind,
/// successive polls fire once each until it has caught up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Periodic {
    interval_ms: u64,
    next_due_ms: u64,
}

impl Periodic {
    /// Create a trigger whose first fire is one interval after tick 0.
    pub fn new(interval: Duration) -> Self {
        let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX).max(1);
        Self {
            interval_ms,
            next_due_ms: interval_ms,
        }
    }

    /// Returns `true` if the trigger is due at `now_ms`, and schedules the next fire.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        if now_ms < self.next_due_ms {
            return false;
        }
        self.next_due_ms = self.next_due_ms.saturating_add(self.interval_ms);
        true
    }

    /// Tick at which the trigger next fires.
    pub fn next_due_ms(&self) -> u64 {
        self.next_due_ms
    }
}

/// Jobs due on a given tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Due {
    pub sample: bool,
    pub compact: bool,
}

/// The sampler's two triggers.
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    sample: Periodic,
    compact: Periodic,
}

impl Schedule {
    pub fn new(sample_every: Duration, compact_every: Duration) -> Self {
        Self {
            sample: Periodic::new(sample_every),
            compact: Periodic::new(compact_every),
        }
    }

    /// Poll both triggers. Both may fire on the same tick.
    pub fn poll(&mut self, now_ms: u64) -> Due {
        Due {
            sample: self.sample.poll(now_ms),
            compact: self.compact.poll(now_ms),
        }
    }
}

/// Errors from a store operation run on the blocking pool.
#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    #[error("Storage error: {0}")]
    Store(#[from] thermolog_store::Error),
    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// What happened to one sample attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    /// The reading was appended to the log.
    Logged(Reading),
    /// The sensor read failed.
    SensorFailed,
    /// The sensor returned an out-of-range or NaN value.
    OutOfRange,
    /// The wall clock is not synchronized yet.
    ClockNotSynced,
    /// The append failed.
    StoreFailed,
}

/// What happened to one compaction attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum CompactOutcome {
    Done(CompactStats),
    ClockNotSynced,
    Failed,
}

/// Everything the sampler did on one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub sample: Option<SampleOutcome>,
    pub compact: Option<CompactOutcome>,
}

/// Background sampler that reads the sensor and maintains the log.
pub struct Sampler {
    state: Arc<AppState>,
    sensor: Arc<dyn SensorProvider>,
    schedule: Schedule,
    /// Set once the startup compaction has run with a valid clock.
    caught_up: bool,
    consecutive_failures: u32,
}

impl Sampler {
    /// Create a sampler using the cadence from the state's configuration.
    pub fn new(state: Arc<AppState>, sensor: Arc<dyn SensorProvider>) -> Self {
        let sampling = &state.config.sampling;
        let schedule = Schedule::new(sampling.interval(), sampling.compact_interval());
        Self {
            state,
            sensor,
            schedule,
            caught_up: false,
            consecutive_failures: 0,
        }
    }

    /// Spawn the sampler loop. It runs until the stop signal is raised.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run the sampler loop on the current task.
    pub async fn run(mut self) {
        let sampling = &self.state.config.sampling;
        info!(
            "Starting sampler on {} (interval: {}s, compaction every {}s, retention {} days)",
            self.sensor.name(),
            sampling.interval_secs,
            sampling.compact_interval_secs,
            self.state.config.retention.days
        );

        let mut stop = self.state.sampler.subscribe_stop();
        let mut timer = interval(sampling.tick().max(Duration::from_millis(1)));
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let started = Instant::now();
        self.state.sampler.set_running(true);

        while !*stop.borrow() {
            tokio::select! {
                _ = timer.tick() => {
                    let now_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                    self.on_tick(now_ms).await;
                }
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.state.sampler.set_running(false);
        info!("Sampler stopped");
    }

    /// Run whatever is due at `now_ms` milliseconds since the loop started.
    pub async fn on_tick(&mut self, now_ms: u64) -> TickReport {
        let due = self.schedule.poll(now_ms);
        let mut report = TickReport::default();

        if due.sample {
            report.sample = Some(self.sample().await);
        }

        if !self.caught_up && self.state.clock.is_synced() {
            info!("Wall clock is valid, running startup compaction");
            let outcome = self.compact().await;
            // Retried on the next tick until a pass completes
            self.caught_up = matches!(outcome, CompactOutcome::Done(_));
            report.compact = Some(outcome);
        } else if due.compact {
            report.compact = Some(self.compact().await);
        }

        report
    }

    /// Take one reading and append it to the log.
    pub async fn sample(&mut self) -> SampleOutcome {
        let sample = match self.sensor.read().await {
            Ok(sample) => {
                self.consecutive_failures = 0;
                sample
            }
            Err(e) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures <= 3 {
                    warn!(
                        "Failed to read {}: {} (attempt {})",
                        self.sensor.name(),
                        e,
                        self.consecutive_failures
                    );
                } else if self.consecutive_failures == 4 {
                    error!(
                        "Failed to read {} after {} attempts, will continue trying silently",
                        self.sensor.name(),
                        self.consecutive_failures
                    );
                }
                self.state.sampler.stats.write().await.sensor_failures += 1;
                return SampleOutcome::SensorFailed;
            }
        };

        let Some(now) = self.state.clock.now() else {
            debug!("Time not valid, skipped logging");
            self.state.sampler.stats.write().await.clock_skips += 1;
            return SampleOutcome::ClockNotSynced;
        };

        let reading = match sample.at(now) {
            Ok(reading) => reading,
            Err(e) => {
                warn!("Sensor read invalid, skipped: {}", e);
                self.state.sampler.stats.write().await.rejected += 1;
                return SampleOutcome::OutOfRange;
            }
        };
        match self.with_log(move |log| log.append(&reading)).await {
            Ok(()) => {
                debug!("Logged {}", reading);
                self.state.sampler.stats.write().await.record_logged(&reading);
                SampleOutcome::Logged(reading)
            }
            Err(e) => {
                error!("Failed to append reading: {}", e);
                self.state.sampler.stats.write().await.append_failures += 1;
                SampleOutcome::StoreFailed
            }
        }
    }

    /// Compact the log down to the retention window ending now.
    pub async fn compact(&self) -> CompactOutcome {
        let Some(now) = self.state.clock.now() else {
            debug!("Time not valid, skipped compaction");
            self.state.sampler.stats.write().await.clock_skips += 1;
            return CompactOutcome::ClockNotSynced;
        };

        let cutoff = cutoff_before(now, self.state.config.retention.window());
        match self.with_log(move |log| log.compact(cutoff)).await {
            Ok(stats) => {
                let mut sampler_stats = self.state.sampler.stats.write().await;
                sampler_stats.compactions += 1;
                sampler_stats.last_compaction = Some(stats);
                CompactOutcome::Done(stats)
            }
            Err(e) => {
                error!("Compaction failed: {}", e);
                self.state.sampler.stats.write().await.compaction_failures += 1;
                CompactOutcome::Failed
            }
        }
    }

    /// Run a write operation on the blocking pool while holding the write lock.
    async fn with_log<T, F>(&self, op: F) -> Result<T, SamplerError>
    where
        F: FnOnce(&ReadingLog) -> thermolog_store::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let log = Arc::clone(&self.state.log).write_owned().await;
        Ok(tokio::task::spawn_blocking(move || op(&log)).await??)
    }
}
