//! Shared simulated environment
//!
//! Every simulated device reads the same [`SimWorld`]; tests and the demo
//! binary steer scenarios through its setters.

use crate::config::SimConfig;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Object in view, in fractions of the frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimTarget {
    pub center_x: f32,
    pub center_y: f32,
    /// Side of the square as a fraction of frame height
    pub size: f32,
}

#[derive(Debug)]
struct WorldState {
    obstacle_cm: f32,
    target: Option<SimTarget>,
    marker: Option<String>,
    light_raw: f32,
    tilt_deg: f32,
    range_failing: bool,
    camera_failing: bool,
    unavailable: HashSet<String>,
}

#[derive(Clone)]
pub struct SimWorld {
    state: Arc<Mutex<WorldState>>,
}

impl SimWorld {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(WorldState {
                obstacle_cm: config.obstacle_cm,
                target: None,
                marker: None,
                light_raw: config.light_raw,
                tilt_deg: 0.0,
                range_failing: false,
                camera_failing: false,
                unavailable: HashSet::new(),
            })),
        }
    }

    pub fn set_obstacle_cm(&self, cm: f32) {
        self.state.lock().obstacle_cm = cm;
    }

    pub fn obstacle_cm(&self) -> f32 {
        self.state.lock().obstacle_cm
    }

    pub fn set_target(&self, center_x: f32, center_y: f32, size: f32) {
        self.state.lock().target = Some(SimTarget {
            center_x,
            center_y,
            size,
        });
    }

    pub fn clear_target(&self) {
        self.state.lock().target = None;
    }

    pub fn target(&self) -> Option<SimTarget> {
        self.state.lock().target
    }

    /// Marker printed along the bottom edge of every frame
    pub fn set_marker(&self, payload: Option<&str>) {
        self.state.lock().marker = payload.map(str::to_string);
    }

    pub fn marker(&self) -> Option<String> {
        self.state.lock().marker.clone()
    }

    pub fn set_light(&self, raw: f32) {
        self.state.lock().light_raw = raw;
    }

    pub fn light_raw(&self) -> f32 {
        self.state.lock().light_raw
    }

    pub fn set_tilt_deg(&self, deg: f32) {
        self.state.lock().tilt_deg = deg;
    }

    pub fn tilt_deg(&self) -> f32 {
        self.state.lock().tilt_deg
    }

    /// Every range read times out while set
    pub fn set_range_failing(&self, failing: bool) {
        self.state.lock().range_failing = failing;
    }

    pub fn range_failing(&self) -> bool {
        self.state.lock().range_failing
    }

    /// Every capture fails while set
    pub fn set_camera_failing(&self, failing: bool) {
        self.state.lock().camera_failing = failing;
    }

    pub fn camera_failing(&self) -> bool {
        self.state.lock().camera_failing
    }

    /// Make `component` fail to open
    pub fn make_unavailable(&self, component: &str) {
        self.state.lock().unavailable.insert(component.to_string());
    }

    pub fn is_unavailable(&self, component: &str) -> bool {
        self.state.lock().unavailable.contains(component)
    }
}
