use crate::config::EstimatorConfig;
use crate::filter::{Madgwick, OrientationFilter};
use crate::quaternion::Quaternion;
use crate::sensor::SensorSource;
use crate::types::{Correction, SensorSample};
use crate::{ImuvizError, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Published orientations must be within this distance of unit norm.
const UNIT_EPSILON: f64 = 1e-6;

/// Lifecycle of the background loop. There is no paused state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatorState {
    Idle = 0,
    Running = 1,
    Stopped = 2,
}

impl EstimatorState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => EstimatorState::Idle,
            1 => EstimatorState::Running,
            _ => EstimatorState::Stopped,
        }
    }
}

/// Loop health counters, read without touching the orientation lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EstimatorStats {
    /// Cycles started, successful or not.
    pub cycles: u64,
    /// Samples folded into the published orientation.
    pub updates: u64,
    /// Updates that ran gyro-only because accel/mag were unusable.
    pub degraded_updates: u64,
    /// Updates discarded because the filter produced an invalid orientation.
    pub rejected_updates: u64,
    pub read_failures: u64,
    pub reconnects: u64,
    /// Cycles whose work took longer than the target period.
    pub overruns: u64,
    pub consecutive_failures: u64,
    /// Set once `fault_threshold` reads in a row have failed.
    pub faulted: bool,
}

#[derive(Default)]
struct Counters {
    state: AtomicU8,
    cycles: AtomicU64,
    updates: AtomicU64,
    degraded_updates: AtomicU64,
    rejected_updates: AtomicU64,
    read_failures: AtomicU64,
    reconnects: AtomicU64,
    overruns: AtomicU64,
    consecutive_failures: AtomicU64,
    faulted: AtomicBool,
}

impl Counters {
    fn set_state(&self, state: EstimatorState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn snapshot(&self) -> EstimatorStats {
        EstimatorStats {
            cycles: self.cycles.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            degraded_updates: self.degraded_updates.load(Ordering::Relaxed),
            rejected_updates: self.rejected_updates.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            faulted: self.faulted.load(Ordering::Relaxed),
        }
    }
}

/// Marks the loop stopped however the thread exits.
struct StopOnExit(Arc<Counters>);

impl Drop for StopOnExit {
    fn drop(&mut self) {
        self.0.set_state(EstimatorState::Stopped);
    }
}

/// Filter state and the last orientation handed to consumers. Both live
/// behind one mutex so a snapshot never sees a half-applied update.
struct Shared {
    filter: Box<dyn OrientationFilter + Send>,
    published: Quaternion,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to a running orientation estimation loop.
///
/// A dedicated thread samples the sensor at the configured rate, runs the
/// filter and publishes the result. Consumers call [`snapshot`] from any
/// thread at any rate; the lock is only held for a filter update or a copy,
/// never across a sensor read.
///
/// [`snapshot`]: OrientationEstimator::snapshot
pub struct OrientationEstimator {
    shared: Arc<Mutex<Shared>>,
    counters: Arc<Counters>,
    /// Never sent on; dropping it disconnects the channel and stops the loop.
    shutdown: Option<Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
    period: Duration,
}

impl OrientationEstimator {
    /// Start estimating with the Madgwick filter.
    pub fn start<S>(source: S, config: EstimatorConfig) -> Result<OrientationEstimator>
    where
        S: SensorSource + Send + 'static,
    {
        config.validate()?;
        let filter = Madgwick::new(config.initial_orientation, config.sample_period(), config.beta);
        Self::with_filter(source, filter, config)
    }

    /// Start estimating with a caller-supplied filter.
    ///
    /// The filter's current orientation is published first; if it is not a
    /// unit quaternion the filter is reset to `config.initial_orientation`.
    pub fn with_filter<S, F>(source: S, filter: F, config: EstimatorConfig) -> Result<OrientationEstimator>
    where
        S: SensorSource + Send + 'static,
        F: OrientationFilter + Send + 'static,
    {
        config.validate()?;

        let mut filter: Box<dyn OrientationFilter + Send> = Box::new(filter);
        let current = filter.current();
        let published = if current.is_unit(UNIT_EPSILON) {
            current
        } else {
            let q = config
                .initial_orientation
                .normalized()
                .unwrap_or(Quaternion::IDENTITY);
            filter.reset(q);
            q
        };

        let shared = Arc::new(Mutex::new(Shared { filter, published }));
        let counters = Arc::new(Counters::default());
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);

        let worker = Worker {
            shared: shared.clone(),
            counters: counters.clone(),
            shutdown: shutdown_rx,
            period: config.period(),
            reconnect_delay: config.reconnect_delay,
            fault_threshold: u64::from(config.fault_threshold),
        };

        counters.set_state(EstimatorState::Running);
        let thread = std::thread::Builder::new()
            .name("imuviz-estimator".into())
            .spawn(move || worker.run(source))
            .map_err(|e| {
                counters.set_state(EstimatorState::Stopped);
                ImuvizError::Spawn(e.to_string())
            })?;

        Ok(OrientationEstimator {
            shared,
            counters,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
            period: config.period(),
        })
    }

    /// Copy of the latest published orientation. Always a finite unit quaternion.
    pub fn snapshot(&self) -> Quaternion {
        lock(&self.shared).published
    }

    pub fn state(&self) -> EstimatorState {
        EstimatorState::from_u8(self.counters.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == EstimatorState::Running
    }

    pub fn stats(&self) -> EstimatorStats {
        self.counters.snapshot()
    }

    /// Target cycle period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Stop the loop and wait for the estimator thread to finish.
    ///
    /// The loop notices the request at the top of its next cycle, so an
    /// in-flight sensor read completes first.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.shutdown.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Estimator thread panicked");
            }
        }
    }
}

impl Drop for OrientationEstimator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

enum UpdateOutcome {
    Applied(Correction),
    Rejected,
    Panicked,
}

/// State owned by the estimator thread.
struct Worker {
    shared: Arc<Mutex<Shared>>,
    counters: Arc<Counters>,
    shutdown: Receiver<()>,
    period: Duration,
    reconnect_delay: Duration,
    fault_threshold: u64,
}

impl Worker {
    fn run<S: SensorSource>(self, mut source: S) {
        let _stopped = StopOnExit(self.counters.clone());
        let unit = source.gyro_unit();

        log::info!(
            "Estimator started (period {:?}, gyro unit {:?})",
            self.period,
            unit
        );

        loop {
            match self.shutdown.try_recv() {
                Err(TryRecvError::Empty) => {}
                _ => {
                    log::info!("Estimator stopping (shutdown requested)");
                    break;
                }
            }

            let start = Instant::now();
            let mut wait = self.period;

            let read = panic::catch_unwind(AssertUnwindSafe(|| source.read()))
                .unwrap_or_else(|_| Err(ImuvizError::SensorRead("sensor read panicked".into())));

            match read {
                Ok(raw) => {
                    self.record_read_ok();
                    self.apply(&raw.into_sample(unit));
                }
                Err(e) => {
                    self.record_read_failure(&e);
                    if e.is_disconnect() {
                        self.counters.reconnects.fetch_add(1, Ordering::Relaxed);
                        let reconnect = panic::catch_unwind(AssertUnwindSafe(|| source.reconnect()))
                            .unwrap_or_else(|_| {
                                Err(ImuvizError::SensorRead("sensor reconnect panicked".into()))
                            });
                        match reconnect {
                            Ok(()) => log::info!("Sensor reconnected"),
                            Err(e) => log::warn!("Sensor reconnect failed: {}", e),
                        }
                        wait = wait.max(self.reconnect_delay);
                    }
                }
            }

            let cycles = self.counters.cycles.fetch_add(1, Ordering::Relaxed) + 1;
            if cycles % 1000 == 0 {
                log::debug!("{} estimator cycles", cycles);
            }

            // No catch-up: an overrun cycle is followed immediately by the next one.
            let elapsed = start.elapsed();
            match wait.checked_sub(elapsed) {
                Some(remaining) if !remaining.is_zero() => {
                    match self.shutdown.recv_timeout(remaining) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => continue,
                    }
                }
                Some(_) => {}
                None => {
                    self.counters.overruns.fetch_add(1, Ordering::Relaxed);
                    log::trace!("Cycle overran by {:?}", elapsed - wait);
                }
            }
        }
    }

    fn apply(&self, sample: &SensorSample) {
        let outcome = {
            let mut guard = lock(&self.shared);
            let Shared { filter, published } = &mut *guard;

            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| filter.step(sample))) {
                Ok(applied) if !applied.is_empty() && filter.current().is_unit(UNIT_EPSILON) => {
                    *published = filter.current();
                    UpdateOutcome::Applied(applied)
                }
                Ok(_) => UpdateOutcome::Rejected,
                Err(_) => UpdateOutcome::Panicked,
            };
            if !matches!(outcome, UpdateOutcome::Applied(_)) {
                filter.reset(*published);
            }
            outcome
        };

        match outcome {
            UpdateOutcome::Applied(applied) => {
                self.counters.updates.fetch_add(1, Ordering::Relaxed);
                if applied.is_gyro_only() {
                    self.counters.degraded_updates.fetch_add(1, Ordering::Relaxed);
                    log::trace!("Gyro-only update (accel/mag unusable)");
                }
            }
            UpdateOutcome::Rejected => {
                self.counters.rejected_updates.fetch_add(1, Ordering::Relaxed);
                log::debug!("Filter produced an invalid orientation, keeping last published value");
            }
            UpdateOutcome::Panicked => {
                self.counters.rejected_updates.fetch_add(1, Ordering::Relaxed);
                log::error!("Filter panicked, restored last published orientation");
            }
        }
    }

    fn record_read_ok(&self) {
        let failures = self.counters.consecutive_failures.swap(0, Ordering::Relaxed);
        if self.counters.faulted.swap(false, Ordering::Relaxed) {
            log::info!("Sensor recovered after {} failed reads", failures);
        }
    }

    fn record_read_failure(&self, e: &ImuvizError) {
        self.counters.read_failures.fetch_add(1, Ordering::Relaxed);
        let failures = self.counters.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures == self.fault_threshold {
            self.counters.faulted.store(true, Ordering::Relaxed);
            log::error!(
                "Sensor faulted: {} consecutive read failures (last: {}), still retrying",
                failures,
                e
            );
        } else {
            log::warn!("Sensor read failed ({} in a row): {}", failures, e);
        }
    }
}
