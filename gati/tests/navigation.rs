//! Station navigation, object following and obstacle handling on the
//! simulated platform

mod common;

use common::{WAIT, fast_config, sim_loop, wait_until};
use gati::core::state::MovementState;
use gati::core::types::NavigationIntent;
use gati::motion::MotionCommand;
use gati::orchestrator::{CommandRecord, LifecyclePhase};
use serde_json::json;

fn navigate(station: &str) -> CommandRecord {
    CommandRecord::new("navigate_to_station", json!({ "station": station }))
}

fn is_forward(c: &MotionCommand) -> bool {
    matches!(*c, MotionCommand::Walk { forward, .. } if forward > 0.0)
}

#[test]
fn test_navigates_by_markers_until_arrival() {
    let (mut control, sim) = sim_loop(fast_config());
    control.start().unwrap();

    control.submit_external_command(&navigate("shelf_a")).unwrap();
    assert!(wait_until(WAIT, || {
        let state = control.status().state;
        state.movement == MovementState::Navigating
            && state.target_station.as_deref() == Some("shelf_a")
    }));

    // dock -> shelf_a is straight ahead
    sim.world.set_marker(Some("STN:dock"));
    assert!(wait_until(WAIT, || {
        control.status().state.station_id.as_deref() == Some("dock")
    }));
    sim.actuator.clear();
    assert!(wait_until(WAIT, || sim.actuator.commands().iter().any(is_forward)));

    sim.world.set_marker(Some("STN:shelf_a"));
    assert!(wait_until(WAIT, || {
        let state = control.status().state;
        state.movement == MovementState::Idle && state.station_id.as_deref() == Some("shelf_a")
    }));
    let state = control.status().state;
    assert_eq!(state.target_station, None);
    assert_eq!(state.last_qr_payload.as_deref(), Some("STN:shelf_a"));
    assert!(sim.actuator.is_neutral());
    control.stop().unwrap();
}

#[test]
fn test_station_task_ignores_visible_object() {
    let (mut control, sim) = sim_loop(fast_config());
    control.start().unwrap();
    sim.world.set_target(0.5, 0.5, 0.5);

    control.submit_external_command(&navigate("shelf_b")).unwrap();
    assert!(wait_until(WAIT, || {
        control.status().state.movement == MovementState::Navigating
    }));
    // No marker seen yet: the station task keeps scanning
    assert!(wait_until(WAIT, || {
        control.status().state.intent == Some(NavigationIntent::Scanning)
    }));
    assert_eq!(control.status().state.movement, MovementState::Navigating);
    control.stop().unwrap();
}

#[test]
fn test_follows_object_from_idle_and_drops_it() {
    let (mut control, sim) = sim_loop(fast_config());
    control.start().unwrap();
    assert!(wait_until(WAIT, || control.status().ticks > 5));
    assert_eq!(control.status().state.movement, MovementState::Idle);

    sim.world.set_target(0.5, 0.5, 0.5);
    assert!(wait_until(WAIT, || {
        control.status().state.movement == MovementState::Following
    }));
    assert!(wait_until(WAIT, || sim.actuator.commands().iter().any(is_forward)));

    sim.world.clear_target();
    assert!(wait_until(WAIT, || {
        control.status().state.movement == MovementState::Idle
    }));
    assert!(sim.actuator.is_neutral());
    control.stop().unwrap();
}

#[test]
fn test_obstacle_halts_navigation_and_resumes() {
    let (mut control, sim) = sim_loop(fast_config());
    control.start().unwrap();

    control.submit_external_command(&navigate("shelf_a")).unwrap();
    assert!(wait_until(WAIT, || {
        control.status().state.movement == MovementState::Navigating
    }));

    sim.world.set_obstacle_cm(5.0);
    assert!(wait_until(WAIT, || {
        control.status().state.movement == MovementState::Avoiding
    }));
    let state = control.status().state;
    assert!(state.obstacle_detected);
    assert!(sim.actuator.is_neutral());

    sim.world.set_obstacle_cm(150.0);
    assert!(wait_until(WAIT, || {
        control.status().state.movement == MovementState::Navigating
    }));
    assert_eq!(
        control.status().state.target_station.as_deref(),
        Some("shelf_a")
    );
    control.stop().unwrap();
}

#[test]
fn test_persistent_obstacle_gives_up() {
    let mut config = fast_config();
    config.control.avoid_timeout_ms = 100;
    let (mut control, sim) = sim_loop(config);
    control.start().unwrap();

    control.submit_external_command(&navigate("dock")).unwrap();
    assert!(wait_until(WAIT, || {
        control.status().state.movement == MovementState::Navigating
    }));
    sim.world.set_obstacle_cm(5.0);
    assert!(wait_until(WAIT, || {
        control.status().state.movement == MovementState::Stopped
    }));
    assert_eq!(control.status().state.target_station, None);
    assert!(sim.actuator.is_neutral());
    control.stop().unwrap();
}

#[test]
fn test_obstacle_blocks_auto_follow() {
    let (mut control, sim) = sim_loop(fast_config());
    sim.world.set_obstacle_cm(5.0);
    control.start().unwrap();
    assert!(wait_until(WAIT, || control.status().state.obstacle_detected));

    sim.world.set_target(0.5, 0.5, 0.5);
    assert!(wait_until(WAIT, || {
        control.status().state.intent == Some(NavigationIntent::Locked)
    }));
    assert_eq!(control.status().state.movement, MovementState::Idle);
    assert!(!sim.actuator.commands().iter().any(is_forward));
    control.stop().unwrap();
}

#[test]
fn test_dead_ranger_faults_while_navigating() {
    let (mut control, sim) = sim_loop(fast_config());
    control.start().unwrap();

    control.submit_external_command(&navigate("shelf_a")).unwrap();
    assert!(wait_until(WAIT, || {
        control.status().state.movement == MovementState::Navigating
    }));

    sim.world.set_range_failing(true);
    sim.world.set_obstacle_cm(3.0);
    assert!(wait_until(WAIT, || control.phase() == LifecyclePhase::Fault));
    let status = control.status();
    assert!(
        status.fault.as_deref().is_some_and(|f| f.contains("ultrasonic")),
        "{:?}",
        status.fault
    );
    assert_eq!(status.state.target_station, None);
    assert!(sim.actuator.is_neutral());
    assert!(wait_until(WAIT, || {
        control.status().state.obstacle_distance_cm.is_none()
    }));
    control.stop().unwrap();
}

#[test]
fn test_dead_optional_ranger_counts_as_obstacle() {
    let mut config = fast_config();
    config.control.mandatory = vec!["camera".into(), "actuator".into()];
    let (mut control, sim) = sim_loop(config);
    control.start().unwrap();

    control.submit_external_command(&navigate("shelf_a")).unwrap();
    assert!(wait_until(WAIT, || {
        control.status().state.movement == MovementState::Navigating
    }));

    sim.world.set_range_failing(true);
    assert!(wait_until(WAIT, || {
        control.status().state.movement == MovementState::Avoiding
    }));
    let state = control.status().state;
    assert!(state.obstacle_detected);
    assert_eq!(state.obstacle_distance_cm, None);
    assert!(sim.actuator.is_neutral());
    assert_eq!(control.phase(), LifecyclePhase::Running);

    sim.world.set_range_failing(false);
    assert!(wait_until(WAIT, || {
        control.status().state.movement == MovementState::Navigating
    }));
    control.stop().unwrap();
}
