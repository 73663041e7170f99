//! Text HUD consumer: polls the estimator at ~60 Hz and prints the
//! mount-compensated orientation of a simulated spinning body.
//!
//! Usage: cargo run --example console [seconds]
//! Tune with IMUVIZ_TARGET_HZ / IMUVIZ_BETA.

use imuviz::{EstimatorConfig, MountingCalibration, OrientationEstimator, Quaternion, SyntheticSource, Vector3};
use std::time::{Duration, Instant};

/// Sensor sits upside-down-ish on the body.
const SENSOR_MOUNTING: Quaternion = Quaternion::new(
    0.5663839027321934,
    -0.8235899489864758,
    -0.020782544029915546,
    0.021839334191962816,
);

fn main() {
    env_logger::init();

    let seconds: u64 = std::env::args()
        .nth(1)
        .and_then(|a| a.parse().ok())
        .unwrap_or(10);

    let config = match EstimatorConfig::from_env() {
        Ok(c) => c.with_initial_orientation(SENSOR_MOUNTING),
        Err(e) => {
            eprintln!("Bad configuration: {}", e);
            std::process::exit(1);
        }
    };
    let mount = MountingCalibration::new(SENSOR_MOUNTING);

    let source = SyntheticSource::new(Vector3::new(5.0, -3.0, 20.0), config.sample_period())
        .with_orientation(SENSOR_MOUNTING)
        .with_latency(Duration::from_millis(2));

    let estimator = match OrientationEstimator::start(source, config) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Failed to start estimator: {}", e);
            std::process::exit(1);
        }
    };

    println!("Orientation from simulated IMU filtered by Madgwick AHRS ({} s)", seconds);

    let start = Instant::now();
    let mut frames: u64 = 0;
    let mut last_print = Instant::now();
    let frame = Duration::from_millis(16);

    while start.elapsed() < Duration::from_secs(seconds) {
        let displayed = mount.apply(estimator.snapshot());
        frames += 1;

        if last_print.elapsed() >= Duration::from_millis(500) {
            let [roll, pitch, yaw] = displayed.to_euler().to_degrees();
            let (axis, angle) = displayed.to_axis_angle();
            println!(
                "Yaw: {:+8.2}  Pitch: {:+8.2}  Roll: {:+8.2}  |  {:6.2} deg about [{:+.3}, {:+.3}, {:+.3}]",
                yaw,
                pitch,
                roll,
                angle.to_degrees(),
                axis.x,
                axis.y,
                axis.z,
            );
            last_print = Instant::now();
        }

        std::thread::sleep(frame);
    }

    let stats = estimator.stats();
    estimator.stop();

    let elapsed = start.elapsed().as_secs_f64();
    println!();
    println!("Average framerate: {:.0}", frames as f64 / elapsed);
    println!(
        "Estimator: {} cycles, {} updates, {} degraded, {} overruns, {} read failures",
        stats.cycles, stats.updates, stats.degraded_updates, stats.overruns, stats.read_failures
    );
}
