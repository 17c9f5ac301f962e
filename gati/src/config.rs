//! Configuration loading for Gati
//!
//! Every field has a serde default so a partial TOML file (or none at all)
//! yields a usable configuration for the simulated platform.

use crate::core::types::{Heading, Station};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Component names accepted in `control.mandatory`
pub const COMPONENTS: &[&str] = &["camera", "actuator", "ultrasonic", "light", "imu", "qr_reader"];

/// Main configuration structure
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatiConfig {
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub sensors: SensorsConfig,
    #[serde(default)]
    pub localizer: LocalizerConfig,
    #[serde(default = "default_stations")]
    pub stations: Vec<Station>,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub sim: SimConfig,
}

/// Control loop timing and safety settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Control tick period in milliseconds (default: 50)
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// How long an obstacle may block before giving up (default: 3000)
    #[serde(default = "default_avoid_timeout_ms")]
    pub avoid_timeout_ms: u64,

    /// Vision intents older than this are never executed (default: 1000)
    #[serde(default = "default_intent_timeout_ms")]
    pub intent_timeout_ms: u64,

    /// Start following detected objects when idle (default: true)
    #[serde(default = "default_true")]
    pub follow_on_idle: bool,

    /// Upper bound for a `move` command duration (default: 10000)
    #[serde(default = "default_max_move_ms")]
    pub max_move_ms: u64,

    /// Tilt beyond this raises a fault (default: 35.0)
    #[serde(default = "default_max_tilt_deg")]
    pub max_tilt_deg: f32,

    /// Components whose init failure forces fail-safe idle
    #[serde(default = "default_mandatory")]
    pub mandatory: Vec<String>,

    /// Routine catalog override; the bundled catalog is used when unset
    #[serde(default)]
    pub routines_file: Option<String>,

    /// Pending external command capacity (default: 32)
    #[serde(default = "default_command_queue")]
    pub command_queue: usize,
}

/// Vision policy settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(default = "default_frame_width")]
    pub frame_width: u32,

    #[serde(default = "default_frame_height")]
    pub frame_height: u32,

    /// Lock zone width as a fraction of frame width (default: 0.2)
    #[serde(default = "default_lock_zone_ratio")]
    pub lock_zone_ratio: f32,

    /// Minimum box area as a fraction of frame area to lock (default: 0.05)
    #[serde(default = "default_lock_area_ratio")]
    pub lock_area_ratio: f32,

    /// Minimum time a lock is held (default: 1500)
    #[serde(default = "default_min_dwell_ms")]
    pub min_dwell_ms: u64,

    /// Detections below this confidence are ignored (default: 0.5)
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,

    /// Longest wait for one inference (default: 200)
    #[serde(default = "default_inference_budget_ms")]
    pub inference_budget_ms: u64,

    /// Vision worker cycle period (default: 50)
    #[serde(default = "default_capture_interval_ms")]
    pub capture_interval_ms: u64,
}

/// Gait magnitudes in normalized units [-1, 1], plus nominal speeds
/// used for dead reckoning
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MotionConfig {
    #[serde(default = "default_cruise")]
    pub cruise: f32,

    /// Forward component while steering (default: 0.2)
    #[serde(default = "default_turn_forward")]
    pub turn_forward: f32,

    #[serde(default = "default_turn_yaw")]
    pub turn_yaw: f32,

    /// Yaw rate while searching (default: 0.3)
    #[serde(default = "default_search_yaw")]
    pub search_yaw: f32,

    /// m/s at forward = 1.0 (default: 0.25)
    #[serde(default = "default_max_forward_mps")]
    pub max_forward_mps: f32,

    /// m/s at lateral = 1.0 (default: 0.12)
    #[serde(default = "default_max_lateral_mps")]
    pub max_lateral_mps: f32,

    /// rad/s at yaw = 1.0 (default: 1.2)
    #[serde(default = "default_max_yaw_rps")]
    pub max_yaw_rps: f32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SensorsConfig {
    #[serde(default)]
    pub ultrasonic: UltrasonicConfig,
    #[serde(default)]
    pub light: LightConfig,
    #[serde(default)]
    pub imu: ImuConfig,
    #[serde(default)]
    pub qr_reader: QrReaderConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UltrasonicConfig {
    /// Obstacle when smoothed distance is below this (default: 10.0)
    #[serde(default = "default_threshold_cm")]
    pub threshold_cm: f32,

    /// Moving average window (default: 5)
    #[serde(default = "default_window")]
    pub window: usize,

    #[serde(default = "default_min_cm")]
    pub min_cm: f32,

    #[serde(default = "default_max_cm")]
    pub max_cm: f32,

    /// Consecutive failed reads after which the distance is unknown and
    /// treated as an obstacle (default: 5)
    #[serde(default = "default_stale_samples")]
    pub stale_samples: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LightConfig {
    /// Calibrated level below which it is dark (default: 20.0)
    #[serde(default = "default_dark_threshold")]
    pub dark_threshold: f32,

    #[serde(default = "default_gain")]
    pub gain: f32,

    #[serde(default)]
    pub offset: f32,

    #[serde(default = "default_window")]
    pub window: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImuConfig {
    #[serde(default = "default_window")]
    pub window: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QrReaderConfig {
    /// Serial device of the external scanner; unset means no scanner
    #[serde(default)]
    pub port: Option<String>,

    #[serde(default = "default_qr_baud")]
    pub baud: u32,

    /// Longest accepted payload line in bytes (default: 128)
    #[serde(default = "default_qr_max_frame")]
    pub max_frame: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocalizerConfig {
    /// Marker payload prefix, `<prefix>:<station-id>` (default: "STN")
    #[serde(default = "default_marker_prefix")]
    pub marker_prefix: String,
}

/// Command and status ports
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// TCP bind address for inbound commands (default: 0.0.0.0:5555)
    #[serde(default = "default_command_bind")]
    pub command_bind: String,

    /// UDP destination for status; unset disables the feed
    #[serde(default = "default_status_target")]
    pub status_target: Option<String>,

    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,

    /// Largest accepted command frame (default: 65536)
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log filter, overridden by RUST_LOG (default: "info")
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Simulated platform parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimConfig {
    /// Noise seed; 0 draws from entropy
    #[serde(default)]
    pub seed: u64,

    #[serde(default = "default_sim_obstacle_cm")]
    pub obstacle_cm: f32,

    #[serde(default = "default_sim_range_noise")]
    pub range_noise_cm: f32,

    /// Probability a range read times out (default: 0.0)
    #[serde(default)]
    pub range_dropout: f32,

    #[serde(default = "default_sim_light_raw")]
    pub light_raw: f32,

    #[serde(default = "default_sim_pixel_noise")]
    pub pixel_noise: f32,

    /// Duration of a simulated action group (default: 200)
    #[serde(default = "default_sim_group_ms")]
    pub group_ms: u64,
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_tick_ms() -> u64 {
    50
}
fn default_avoid_timeout_ms() -> u64 {
    3000
}
fn default_intent_timeout_ms() -> u64 {
    1000
}
fn default_max_move_ms() -> u64 {
    10_000
}
fn default_max_tilt_deg() -> f32 {
    35.0
}
fn default_mandatory() -> Vec<String> {
    vec!["camera".into(), "actuator".into(), "ultrasonic".into()]
}
fn default_command_queue() -> usize {
    32
}
fn default_frame_width() -> u32 {
    320
}
fn default_frame_height() -> u32 {
    240
}
fn default_lock_zone_ratio() -> f32 {
    0.2
}
fn default_lock_area_ratio() -> f32 {
    0.05
}
fn default_min_dwell_ms() -> u64 {
    1500
}
fn default_min_confidence() -> f32 {
    0.5
}
fn default_inference_budget_ms() -> u64 {
    200
}
fn default_capture_interval_ms() -> u64 {
    50
}
fn default_cruise() -> f32 {
    0.6
}
fn default_turn_forward() -> f32 {
    0.2
}
fn default_turn_yaw() -> f32 {
    0.5
}
fn default_search_yaw() -> f32 {
    0.3
}
fn default_max_forward_mps() -> f32 {
    0.25
}
fn default_max_lateral_mps() -> f32 {
    0.12
}
fn default_max_yaw_rps() -> f32 {
    1.2
}
fn default_threshold_cm() -> f32 {
    10.0
}
fn default_window() -> usize {
    5
}
fn default_min_cm() -> f32 {
    2.0
}
fn default_max_cm() -> f32 {
    400.0
}
fn default_stale_samples() -> u32 {
    5
}
fn default_dark_threshold() -> f32 {
    20.0
}
fn default_gain() -> f32 {
    1.0
}
fn default_qr_baud() -> u32 {
    9600
}
fn default_qr_max_frame() -> usize {
    128
}
fn default_marker_prefix() -> String {
    "STN".to_string()
}
fn default_command_bind() -> String {
    "0.0.0.0:5555".to_string()
}
fn default_status_target() -> Option<String> {
    Some("127.0.0.1:5556".to_string())
}
fn default_status_interval_ms() -> u64 {
    200
}
fn default_max_frame_bytes() -> usize {
    64 * 1024
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_sim_obstacle_cm() -> f32 {
    150.0
}
fn default_sim_range_noise() -> f32 {
    0.5
}
fn default_sim_light_raw() -> f32 {
    60.0
}
fn default_sim_pixel_noise() -> f32 {
    2.0
}
fn default_sim_group_ms() -> u64 {
    200
}

fn default_stations() -> Vec<Station> {
    vec![
        Station::new("dock")
            .with_hop("shelf_a", Heading::Forward)
            .with_hop("shelf_b", Heading::Right),
        Station::new("shelf_a")
            .with_hop("dock", Heading::Left)
            .with_hop("shelf_b", Heading::Right),
        Station::new("shelf_b")
            .with_hop("dock", Heading::Left)
            .with_hop("shelf_a", Heading::Left),
    ]
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            avoid_timeout_ms: default_avoid_timeout_ms(),
            intent_timeout_ms: default_intent_timeout_ms(),
            follow_on_idle: true,
            max_move_ms: default_max_move_ms(),
            max_tilt_deg: default_max_tilt_deg(),
            mandatory: default_mandatory(),
            routines_file: None,
            command_queue: default_command_queue(),
        }
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            frame_width: default_frame_width(),
            frame_height: default_frame_height(),
            lock_zone_ratio: default_lock_zone_ratio(),
            lock_area_ratio: default_lock_area_ratio(),
            min_dwell_ms: default_min_dwell_ms(),
            min_confidence: default_min_confidence(),
            inference_budget_ms: default_inference_budget_ms(),
            capture_interval_ms: default_capture_interval_ms(),
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            cruise: default_cruise(),
            turn_forward: default_turn_forward(),
            turn_yaw: default_turn_yaw(),
            search_yaw: default_search_yaw(),
            max_forward_mps: default_max_forward_mps(),
            max_lateral_mps: default_max_lateral_mps(),
            max_yaw_rps: default_max_yaw_rps(),
        }
    }
}

impl Default for UltrasonicConfig {
    fn default() -> Self {
        Self {
            threshold_cm: default_threshold_cm(),
            window: default_window(),
            min_cm: default_min_cm(),
            max_cm: default_max_cm(),
            stale_samples: default_stale_samples(),
        }
    }
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            dark_threshold: default_dark_threshold(),
            gain: default_gain(),
            offset: 0.0,
            window: default_window(),
        }
    }
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
        }
    }
}

impl Default for QrReaderConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud: default_qr_baud(),
            max_frame: default_qr_max_frame(),
        }
    }
}

impl Default for LocalizerConfig {
    fn default() -> Self {
        Self {
            marker_prefix: default_marker_prefix(),
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            command_bind: default_command_bind(),
            status_target: default_status_target(),
            status_interval_ms: default_status_interval_ms(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            obstacle_cm: default_sim_obstacle_cm(),
            range_noise_cm: default_sim_range_noise(),
            range_dropout: 0.0,
            light_raw: default_sim_light_raw(),
            pixel_noise: default_sim_pixel_noise(),
            group_ms: default_sim_group_ms(),
        }
    }
}

impl Default for GatiConfig {
    fn default() -> Self {
        Self {
            control: ControlConfig::default(),
            vision: VisionConfig::default(),
            motion: MotionConfig::default(),
            sensors: SensorsConfig::default(),
            localizer: LocalizerConfig::default(),
            stations: default_stations(),
            streaming: StreamingConfig::default(),
            logging: LoggingConfig::default(),
            sim: SimConfig::default(),
        }
    }
}

impl ControlConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn avoid_timeout(&self) -> Duration {
        Duration::from_millis(self.avoid_timeout_ms)
    }

    pub fn intent_timeout(&self) -> Duration {
        Duration::from_millis(self.intent_timeout_ms)
    }

    pub fn is_mandatory(&self, component: &str) -> bool {
        self.mandatory.iter().any(|m| m == component)
    }
}

impl VisionConfig {
    pub fn min_dwell(&self) -> Duration {
        Duration::from_millis(self.min_dwell_ms)
    }

    pub fn inference_budget(&self) -> Duration {
        Duration::from_millis(self.inference_budget_ms)
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }
}

impl StreamingConfig {
    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }
}

impl GatiConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: GatiConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn station(&self, id: &str) -> Option<&Station> {
        self.stations.iter().find(|s| s.id == id)
    }

    /// Reject values the control loop cannot run with
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(Error::Config(msg));

        if self.control.tick_ms == 0 {
            return bad("control.tick_ms must be > 0".into());
        }
        if self.control.command_queue == 0 {
            return bad("control.command_queue must be > 0".into());
        }
        for m in &self.control.mandatory {
            if !COMPONENTS.contains(&m.as_str()) {
                return bad(format!("control.mandatory: unknown component '{}'", m));
            }
        }
        let v = &self.vision;
        if v.frame_width == 0 || v.frame_height == 0 {
            return bad("vision frame size must be non-zero".into());
        }
        if !(v.lock_zone_ratio > 0.0 && v.lock_zone_ratio <= 1.0) {
            return bad("vision.lock_zone_ratio must be in (0, 1]".into());
        }
        if !(v.lock_area_ratio > 0.0 && v.lock_area_ratio <= 1.0) {
            return bad("vision.lock_area_ratio must be in (0, 1]".into());
        }
        if !(0.0..=1.0).contains(&v.min_confidence) {
            return bad("vision.min_confidence must be in [0, 1]".into());
        }
        if self.sensors.ultrasonic.window == 0
            || self.sensors.light.window == 0
            || self.sensors.imu.window == 0
        {
            return bad("sensor windows must be > 0".into());
        }
        if self.sensors.ultrasonic.stale_samples == 0 {
            return bad("sensors.ultrasonic.stale_samples must be > 0".into());
        }
        if self.sensors.ultrasonic.min_cm >= self.sensors.ultrasonic.max_cm {
            return bad("sensors.ultrasonic.min_cm must be below max_cm".into());
        }
        if self.localizer.marker_prefix.is_empty() || self.localizer.marker_prefix.contains(':') {
            return bad("localizer.marker_prefix must be non-empty and contain no ':'".into());
        }

        let mut ids = HashSet::new();
        for s in &self.stations {
            if !crate::localizer::is_valid_station_id(&s.id) {
                return bad(format!("invalid station id '{}'", s.id));
            }
            if !ids.insert(s.id.as_str()) {
                return bad(format!("duplicate station id '{}'", s.id));
            }
        }
        for s in &self.stations {
            for target in s.next_hop.keys() {
                if !ids.contains(target.as_str()) {
                    return bad(format!(
                        "station '{}' has a hop toward unknown station '{}'",
                        s.id, target
                    ));
                }
            }
        }
        Ok(())
    }
}
