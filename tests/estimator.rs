//! Threaded behavior of the estimator: snapshot atomicity, rate limiting and
//! fault tolerance, driven by scripted sensor sources.

use imuviz::{
    AngularUnit, Correction, EstimatorConfig, ImuvizError, Madgwick, OrientationEstimator,
    OrientationFilter, Quaternion, RawSample, SensorSample, SensorSource, Vector3,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn level_sample(gyro: Vector3) -> RawSample {
    RawSample {
        gyro,
        accel: Vector3::new(0.0, 0.0, 1.0),
        mag: Vector3::new(0.4, 0.0, -0.6),
    }
}

/// Poll `cond` until it holds or `timeout` expires.
fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Records the start time of every read; latency can be changed on the fly.
struct TimedSource {
    reads: Arc<Mutex<Vec<Instant>>>,
    latency_us: Arc<AtomicU64>,
}

impl SensorSource for TimedSource {
    fn read(&mut self) -> imuviz::Result<RawSample> {
        self.reads.lock().unwrap().push(Instant::now());
        let latency = self.latency_us.load(Ordering::Relaxed);
        if latency > 0 {
            std::thread::sleep(Duration::from_micros(latency));
        }
        Ok(level_sample(Vector3::new(0.0, 0.0, 0.2)))
    }

    fn gyro_unit(&self) -> AngularUnit {
        AngularUnit::RadiansPerSecond
    }
}

fn intervals(reads: &[Instant]) -> Vec<Duration> {
    reads.windows(2).map(|w| w[1] - w[0]).collect()
}

#[test]
fn test_cycle_period_matches_target() {
    init_logger();
    let reads = Arc::new(Mutex::new(Vec::new()));
    let source = TimedSource {
        reads: reads.clone(),
        latency_us: Arc::new(AtomicU64::new(0)),
    };

    let estimator =
        OrientationEstimator::start(source, EstimatorConfig::default().with_target_hz(50.0)).unwrap();
    assert_eq!(estimator.period(), Duration::from_millis(20));
    std::thread::sleep(Duration::from_millis(1000));
    estimator.stop();

    let reads = reads.lock().unwrap();
    assert!(reads.len() >= 30, "only {} cycles in 1s at 50 Hz", reads.len());
    assert!(reads.len() <= 52, "{} cycles in 1s at 50 Hz", reads.len());

    let gaps = intervals(&reads);
    let mean = gaps.iter().sum::<Duration>() / gaps.len() as u32;
    assert!(
        mean >= Duration::from_millis(19) && mean <= Duration::from_millis(26),
        "mean period {:?}",
        mean
    );
}

#[test]
fn test_slow_reads_do_not_build_backlog() {
    init_logger();
    let reads = Arc::new(Mutex::new(Vec::new()));
    let latency = Arc::new(AtomicU64::new(40_000));
    let source = TimedSource {
        reads: reads.clone(),
        latency_us: latency.clone(),
    };

    // 100 Hz target, 40 ms reads.
    let estimator =
        OrientationEstimator::start(source, EstimatorConfig::default().with_target_hz(100.0)).unwrap();
    std::thread::sleep(Duration::from_millis(300));

    let slow_reads = reads.lock().unwrap().len();
    let stats = estimator.stats();
    assert!(stats.overruns >= 3, "overruns = {}", stats.overruns);
    // At most one cycle per read latency, never a burst.
    assert!(slow_reads <= 300 / 40 + 2, "{} reads in 300 ms", slow_reads);

    latency.store(0, Ordering::Relaxed);
    std::thread::sleep(Duration::from_millis(300));
    estimator.stop();

    let reads = reads.lock().unwrap();
    // Skip the boundary between slow and fast phases.
    let fast = &reads[(slow_reads + 1).min(reads.len())..];
    assert!(fast.len() >= 10, "only {} fast reads", fast.len());
    for gap in intervals(fast) {
        assert!(gap >= Duration::from_millis(8), "catch-up burst: gap {:?}", gap);
    }
}

/// Madgwick that logs every orientation it produces.
struct RecordingFilter {
    inner: Madgwick,
    log: Arc<Mutex<Vec<Quaternion>>>,
}

impl OrientationFilter for RecordingFilter {
    fn step(&mut self, sample: &SensorSample) -> Correction {
        let applied = self.inner.step(sample);
        self.log.lock().unwrap().push(self.inner.current());
        applied
    }

    fn current(&self) -> Quaternion {
        self.inner.current()
    }

    fn reset(&mut self, orientation: Quaternion) {
        self.inner.reset(orientation);
    }
}

fn bits(q: Quaternion) -> [u64; 4] {
    [q.w.to_bits(), q.x.to_bits(), q.y.to_bits(), q.z.to_bits()]
}

#[test]
fn test_snapshots_are_never_torn() {
    init_logger();
    let log = Arc::new(Mutex::new(Vec::new()));
    let config = EstimatorConfig::default().with_target_hz(2000.0);
    let initial = Madgwick::new(Quaternion::IDENTITY, config.sample_period(), config.beta);
    let filter = RecordingFilter {
        inner: initial.clone(),
        log: log.clone(),
    };
    // Spinning source so every published value differs.
    let source = imuviz::SyntheticSource::new(Vector3::new(120.0, -60.0, 300.0), config.sample_period());

    let estimator = Arc::new(OrientationEstimator::with_filter(source, filter, config).unwrap());

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let estimator = estimator.clone();
            std::thread::spawn(move || {
                let start = Instant::now();
                let mut seen = Vec::new();
                while start.elapsed() < Duration::from_millis(400) {
                    seen.push(estimator.snapshot());
                    if seen.len() % 64 == 0 {
                        std::thread::yield_now();
                    }
                }
                seen
            })
        })
        .collect();

    let snapshots: Vec<Quaternion> = readers
        .into_iter()
        .flat_map(|r| r.join().unwrap())
        .collect();

    match Arc::try_unwrap(estimator) {
        Ok(estimator) => estimator.stop(),
        Err(_) => panic!("reader threads still hold the estimator"),
    }

    let mut published: HashSet<[u64; 4]> = log.lock().unwrap().iter().map(|q| bits(*q)).collect();
    published.insert(bits(initial.current()));
    assert!(published.len() > 50, "writer only published {} values", published.len());

    assert!(!snapshots.is_empty());
    for q in &snapshots {
        assert!(q.is_unit(1e-6), "snapshot norm {}", q.norm());
        assert!(published.contains(&bits(*q)), "snapshot {:?} was never published", q);
    }
}

/// Fails reads according to a script, then succeeds forever.
struct ScriptedSource {
    script: Vec<Option<ImuvizError>>,
    reconnects: Arc<AtomicU64>,
}

impl SensorSource for ScriptedSource {
    fn read(&mut self) -> imuviz::Result<RawSample> {
        if self.script.is_empty() {
            return Ok(level_sample(Vector3::ZERO));
        }
        match self.script.remove(0) {
            Some(e) => Err(e),
            None => Ok(level_sample(Vector3::ZERO)),
        }
    }

    fn gyro_unit(&self) -> AngularUnit {
        AngularUnit::DegreesPerSecond
    }

    fn reconnect(&mut self) -> imuviz::Result<()> {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[test]
fn test_read_failures_fault_then_recover() {
    init_logger();
    let script = (0..6).map(|i| Some(ImuvizError::SensorRead(format!("nak {}", i)))).collect();
    let source = ScriptedSource {
        script,
        reconnects: Arc::new(AtomicU64::new(0)),
    };
    let config = EstimatorConfig::default()
        .with_target_hz(200.0)
        .with_fault_threshold(3);

    let estimator = OrientationEstimator::start(source, config).unwrap();

    assert!(wait_for(Duration::from_secs(2), || estimator.stats().updates >= 5));
    let stats = estimator.stats();
    assert_eq!(stats.read_failures, 6);
    assert_eq!(stats.consecutive_failures, 0);
    assert!(!stats.faulted, "fault flag not cleared after recovery");
    assert_eq!(stats.reconnects, 0);
    assert!(estimator.is_running());
    assert!(estimator.snapshot().is_unit(1e-9));
    estimator.stop();
}

#[test]
fn test_persistent_failure_keeps_retrying() {
    init_logger();
    let script = (0..10_000).map(|_| Some(ImuvizError::SensorRead("bus stuck".into()))).collect();
    let source = ScriptedSource {
        script,
        reconnects: Arc::new(AtomicU64::new(0)),
    };
    let config = EstimatorConfig::default()
        .with_target_hz(500.0)
        .with_fault_threshold(5);

    let estimator = OrientationEstimator::start(source, config).unwrap();

    assert!(wait_for(Duration::from_secs(2), || estimator.stats().read_failures >= 20));
    let stats = estimator.stats();
    assert!(stats.faulted);
    assert!(stats.consecutive_failures >= 20);
    assert_eq!(stats.updates, 0);
    assert!(estimator.is_running());
    assert_eq!(estimator.snapshot(), Quaternion::IDENTITY);
    estimator.stop();
}

#[test]
fn test_disconnect_triggers_reconnect() {
    init_logger();
    let reconnects = Arc::new(AtomicU64::new(0));
    let source = ScriptedSource {
        script: vec![Some(ImuvizError::Disconnected), Some(ImuvizError::Disconnected), None],
        reconnects: reconnects.clone(),
    };
    let config = EstimatorConfig::default()
        .with_target_hz(200.0)
        .with_reconnect_delay(Duration::from_millis(20));

    let estimator = OrientationEstimator::start(source, config).unwrap();

    assert!(wait_for(Duration::from_secs(2), || estimator.stats().updates >= 3));
    assert_eq!(reconnects.load(Ordering::Relaxed), 2);
    assert_eq!(estimator.stats().reconnects, 2);
    estimator.stop();
}

/// Always disconnected; every reconnect attempt panics.
struct PanickingReconnectSource {
    attempts: Arc<AtomicU64>,
}

impl SensorSource for PanickingReconnectSource {
    fn read(&mut self) -> imuviz::Result<RawSample> {
        Err(ImuvizError::Disconnected)
    }

    fn gyro_unit(&self) -> AngularUnit {
        AngularUnit::RadiansPerSecond
    }

    fn reconnect(&mut self) -> imuviz::Result<()> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        panic!("transport reopen blew up");
    }
}

#[test]
fn test_reconnect_panic_does_not_stop_loop() {
    init_logger();
    let attempts = Arc::new(AtomicU64::new(0));
    let source = PanickingReconnectSource {
        attempts: attempts.clone(),
    };
    let config = EstimatorConfig::default()
        .with_target_hz(200.0)
        .with_reconnect_delay(Duration::from_millis(10));

    let estimator = OrientationEstimator::start(source, config).unwrap();

    assert!(wait_for(Duration::from_secs(2), || attempts.load(Ordering::Relaxed) >= 3));
    assert!(estimator.is_running());
    assert!(estimator.stats().reconnects >= 3);
    assert_eq!(estimator.snapshot(), Quaternion::IDENTITY);
    estimator.stop();
}

/// Reports zero and NaN reference vectors.
struct DegenerateSource {
    n: u64,
}

impl SensorSource for DegenerateSource {
    fn read(&mut self) -> imuviz::Result<RawSample> {
        self.n += 1;
        let mag = match self.n % 3 {
            0 => Vector3::ZERO,
            1 => Vector3::new(f64::NAN, 0.0, 0.0),
            _ => Vector3::new(0.4, 0.0, -0.6),
        };
        Ok(RawSample {
            gyro: Vector3::new(30.0, 0.0, 10.0),
            accel: if self.n % 5 == 0 { Vector3::ZERO } else { Vector3::new(0.0, 0.0, 1.0) },
            mag,
        })
    }

    fn gyro_unit(&self) -> AngularUnit {
        AngularUnit::DegreesPerSecond
    }
}

#[test]
fn test_degenerate_readings_never_publish_invalid_orientation() {
    init_logger();
    let estimator = OrientationEstimator::start(
        DegenerateSource { n: 0 },
        EstimatorConfig::default().with_target_hz(500.0),
    )
    .unwrap();

    let start = Instant::now();
    while start.elapsed() < Duration::from_millis(200) {
        let q = estimator.snapshot();
        assert!(q.is_unit(1e-6), "published {:?}", q);
    }

    let stats = estimator.stats();
    assert!(stats.updates > 0);
    assert!(stats.degraded_updates > 0);
    assert_eq!(stats.rejected_updates, 0);
    estimator.stop();
}

/// Filter that misbehaves: every third step panics, every fifth returns NaN.
struct UnreliableFilter {
    inner: Madgwick,
    steps: u64,
    poisoned: bool,
}

impl OrientationFilter for UnreliableFilter {
    fn step(&mut self, sample: &SensorSample) -> Correction {
        self.steps += 1;
        if self.steps % 3 == 0 {
            panic!("filter blew up at step {}", self.steps);
        }
        self.poisoned = self.steps % 5 == 0;
        self.inner.step(sample)
    }

    fn current(&self) -> Quaternion {
        if self.poisoned {
            Quaternion::new(f64::NAN, 0.0, 0.0, 0.0)
        } else {
            self.inner.current()
        }
    }

    fn reset(&mut self, orientation: Quaternion) {
        self.poisoned = false;
        self.inner.reset(orientation);
    }
}

#[test]
fn test_filter_failures_do_not_stop_loop() {
    init_logger();
    let config = EstimatorConfig::default().with_target_hz(500.0);
    let filter = UnreliableFilter {
        inner: Madgwick::new(Quaternion::IDENTITY, config.sample_period(), config.beta),
        steps: 0,
        poisoned: false,
    };
    let source = imuviz::SyntheticSource::new(Vector3::new(0.0, 0.0, 20.0), config.sample_period());

    let estimator = OrientationEstimator::with_filter(source, filter, config).unwrap();

    assert!(wait_for(Duration::from_secs(2), || {
        let s = estimator.stats();
        s.updates >= 10 && s.rejected_updates >= 5
    }));
    assert!(estimator.is_running());
    assert!(estimator.snapshot().is_unit(1e-9));
    estimator.stop();
}
