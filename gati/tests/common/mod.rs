//! Shared helpers for the simulated control loop tests
#![allow(dead_code)]

use crossbeam_channel::Receiver;
use gati::config::GatiConfig;
use gati::devices::sim::{self, SimHandles};
use gati::orchestrator::ControlLoop;
use gati::routines::RoutineLibrary;
use gati::streaming::StatusMessage;
use std::thread;
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(3);

/// Short timings so scenarios settle within a few hundred milliseconds
pub fn fast_config() -> GatiConfig {
    let mut config = GatiConfig::default();
    config.control.tick_ms = 5;
    config.control.avoid_timeout_ms = 2_000;
    config.control.intent_timeout_ms = 500;
    config.vision.capture_interval_ms = 5;
    config.vision.min_dwell_ms = 50;
    config.sim.seed = 7;
    config.sim.range_noise_cm = 0.0;
    config.sim.pixel_noise = 0.0;
    config.sim.group_ms = 20;
    config.streaming.status_interval_ms = 20;
    config
}

/// Control loop over a fully simulated platform (not started)
pub fn sim_loop(config: GatiConfig) -> (ControlLoop, SimHandles) {
    let routines = RoutineLibrary::bundled().expect("bundled routines");
    let (context, handles) = sim::build_context(&config);
    let control = ControlLoop::new(config, routines, context).expect("control loop");
    (control, handles)
}

/// Poll `cond` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(2));
    }
}

/// Drain status messages until one matches
pub fn wait_for_message(
    rx: &Receiver<StatusMessage>,
    timeout: Duration,
    mut pred: impl FnMut(&StatusMessage) -> bool,
) -> Option<StatusMessage> {
    let deadline = Instant::now() + timeout;
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match rx.recv_timeout(left) {
            Ok(msg) if pred(&msg) => return Some(msg),
            Ok(_) => {}
            Err(_) => return None,
        }
    }
    None
}
