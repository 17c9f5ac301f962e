//! Core data types shared between perception, localization and motion.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Axis-aligned bounding box in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    #[inline]
    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) * 0.5, (self.y1 + self.y2) * 0.5)
    }
}

/// One object detection. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub label: String,
    /// Confidence in [0, 1]
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: BoundingBox, label: impl Into<String>, confidence: f32) -> Self {
        Self {
            bbox,
            label: label.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn area(&self) -> f32 {
        self.bbox.area()
    }

    pub fn center(&self) -> (f32, f32) {
        self.bbox.center()
    }
}

/// A captured 8-bit grayscale image.
///
/// Owned by the vision worker for a single inference cycle.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Row-major luminance, `width * height` bytes
    pub pixels: Vec<u8>,
    pub sequence: u64,
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>, sequence: u64) -> Self {
        debug_assert_eq!(pixels.len(), (width * height) as usize);
        Self {
            width,
            height,
            pixels,
            sequence,
            captured_at: Instant::now(),
        }
    }

    /// Uniform frame filled with `value`
    pub fn filled(width: u32, height: u32, value: u8, sequence: u64) -> Self {
        Self::new(width, height, vec![value; (width * height) as usize], sequence)
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get((y * self.width + x) as usize).copied()
    }

    /// One row of pixels, or an empty slice when out of bounds
    pub fn row(&self, y: u32) -> &[u8] {
        if y >= self.height {
            return &[];
        }
        let start = (y * self.width) as usize;
        self.pixels
            .get(start..start + self.width as usize)
            .unwrap_or(&[])
    }

    pub fn area(&self) -> f32 {
        (self.width * self.height) as f32
    }
}

/// Navigation command derived from one perception cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationIntent {
    /// Target confirmed and centered; proceed toward it
    Locked,
    TurnLeft,
    TurnRight,
    /// No target; search
    Scanning,
    Stop,
}

impl NavigationIntent {
    /// True for intents produced from an actual detection
    pub fn is_detection_driven(&self) -> bool {
        matches!(
            self,
            NavigationIntent::Locked | NavigationIntent::TurnLeft | NavigationIntent::TurnRight
        )
    }
}

/// Sensor that produced a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorSource {
    Ultrasonic,
    Light,
    Imu,
    QrReader,
}

impl SensorSource {
    pub fn name(&self) -> &'static str {
        match self {
            SensorSource::Ultrasonic => "ultrasonic",
            SensorSource::Light => "light",
            SensorSource::Imu => "imu",
            SensorSource::QrReader => "qr_reader",
        }
    }
}

/// Value carried by a sensor sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SampleValue {
    Scalar(f32),
    Inertial { accel: [f32; 3], gyro: [f32; 3] },
    Text(String),
}

/// Timestamped reading tagged with its source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    pub source: SensorSource,
    /// Microseconds since the Unix epoch
    pub timestamp_us: u64,
    pub value: SampleValue,
}

impl SensorSample {
    pub fn new(source: SensorSource, value: SampleValue) -> Self {
        Self {
            source,
            timestamp_us: now_us(),
            value,
        }
    }

    pub fn scalar(&self) -> Option<f32> {
        match self.value {
            SampleValue::Scalar(v) => Some(v),
            _ => None,
        }
    }
}

/// Wall-clock time in microseconds
pub fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Station-relative heading toward the next hop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Heading {
    Forward,
    Left,
    Right,
}

/// Fixed waypoint identified by a scannable marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: String,
    /// Target station id -> heading to take from here
    #[serde(default)]
    pub next_hop: BTreeMap<String, Heading>,
}

impl Station {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            next_hop: BTreeMap::new(),
        }
    }

    pub fn with_hop(mut self, target: impl Into<String>, heading: Heading) -> Self {
        self.next_hop.insert(target.into(), heading);
        self
    }

    /// Payload printed on this station's marker
    pub fn marker_payload(&self, prefix: &str) -> String {
        format!("{}:{}", prefix, self.id)
    }
}
