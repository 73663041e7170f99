//! Orientation → WebSocket broadcaster.
//!
//! Runs the estimator on a simulated sensor and pushes the mount-compensated
//! orientation as JSON to every connected WebSocket client at ~60 Hz:
//!
//! {"w":0.998,"x":0.010,"y":-0.020,"z":0.050,"roll":1.2,"pitch":-2.3,"yaw":5.7,"seq":42}
//!
//! Usage:
//!   cargo run --release --example ws_broadcast
//!   Connect to ws://localhost:8765

use imuviz::{EstimatorConfig, MountingCalibration, OrientationEstimator, SyntheticSource, Vector3};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tungstenite::Message;

const PORT: u16 = 8765;

type WsClient = Arc<Mutex<tungstenite::WebSocket<TcpStream>>>;

fn main() {
    env_logger::init();

    let config = match EstimatorConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Bad configuration: {}", e);
            std::process::exit(1);
        }
    };

    let source = SyntheticSource::new(Vector3::new(0.0, 10.0, 30.0), config.sample_period());
    let estimator = match OrientationEstimator::start(source, config) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            eprintln!("Failed to start estimator: {}", e);
            std::process::exit(1);
        }
    };

    let clients: Arc<Mutex<Vec<WsClient>>> = Arc::new(Mutex::new(Vec::new()));
    let running = Arc::new(AtomicBool::new(true));

    let broadcaster = {
        let clients = clients.clone();
        let running = running.clone();
        let estimator = estimator.clone();
        std::thread::Builder::new()
            .name("imuviz-broadcast".into())
            .spawn(move || broadcast_loop(&estimator, clients, running))
            .expect("Failed to spawn broadcast thread")
    };

    let listener = TcpListener::bind(format!("0.0.0.0:{}", PORT)).unwrap_or_else(|e| {
        eprintln!("Failed to bind port {}: {}", PORT, e);
        std::process::exit(1);
    });
    eprintln!("[WS] Listening on ws://localhost:{}", PORT);

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                eprintln!("[TCP] accept error: {}", e);
                continue;
            }
        };

        // Write timeout keeps one slow client from stalling the broadcaster.
        stream.set_write_timeout(Some(Duration::from_secs(2))).ok();
        stream.set_nodelay(true).ok();

        match tungstenite::accept(stream) {
            Ok(ws) => {
                let mut list = clients.lock().unwrap();
                list.push(Arc::new(Mutex::new(ws)));
                eprintln!("[WS] Client connected ({} total)", list.len());
            }
            Err(e) => eprintln!("[WS] handshake error: {}", e),
        }
    }

    running.store(false, Ordering::Relaxed);
    let _ = broadcaster.join();
}

/// Consumer loop: snapshot, compensate, serialize, fan out.
fn broadcast_loop(estimator: &OrientationEstimator, clients: Arc<Mutex<Vec<WsClient>>>, running: Arc<AtomicBool>) {
    let mount = MountingCalibration::identity();
    let interval = Duration::from_millis(16);
    let mut seq: u64 = 0;
    let mut sent: u64 = 0;
    let mut last_report = Instant::now();

    while running.load(Ordering::Relaxed) {
        let q = mount.apply(estimator.snapshot());
        let [roll, pitch, yaw] = q.to_euler().to_degrees();
        seq += 1;

        let json = format!(
            "{{\"w\":{:.4},\"x\":{:.4},\"y\":{:.4},\"z\":{:.4},\"roll\":{:.1},\"pitch\":{:.1},\"yaw\":{:.1},\"seq\":{}}}",
            q.w, q.x, q.y, q.z, roll, pitch, yaw, seq,
        );

        let msg = Message::Text(json);
        let mut list = clients.lock().unwrap();
        let before = list.len();
        list.retain(|ws_arc| {
            let mut ws = ws_arc.lock().unwrap();
            ws.send(msg.clone()).is_ok()
        });
        if list.len() < before {
            eprintln!("[WS] Client disconnected ({} total)", list.len());
        }
        sent += list.len() as u64;
        drop(list);

        if last_report.elapsed() >= Duration::from_secs(5) {
            let stats = estimator.stats();
            eprintln!(
                "[IMU] {} updates, {} overruns, faulted={}; {} messages sent",
                stats.updates, stats.overruns, stats.faulted, sent
            );
            sent = 0;
            last_report = Instant::now();
        }

        std::thread::sleep(interval);
    }
}
