//! Synthetic camera and the bottom-row marker barcode
//!
//! The last row of every frame carries the station marker as a 1-bit
//! barcode, one pixel per bit, MSB first:
//!
//! ```text
//! [0xA5 sync] [len] [payload bytes ...] [xor checksum]
//! ```
//!
//! A row of zeros means no marker in view.

use super::{NoiseGenerator, SimWorld};
use crate::core::types::Frame;
use crate::error::{Error, Result, SensorError};
use crate::localizer::MarkerDecoder;
use crate::vision::Camera;

const MARKER_SYNC: u8 = 0xA5;
const BACKGROUND: f32 = 20.0;
const TARGET: f32 = 230.0;

pub struct SimCamera {
    world: SimWorld,
    width: u32,
    height: u32,
    pixel_noise: f32,
    noise: NoiseGenerator,
    sequence: u64,
    opened: bool,
}

impl SimCamera {
    pub fn new(
        world: SimWorld,
        width: u32,
        height: u32,
        pixel_noise: f32,
        noise: NoiseGenerator,
    ) -> Self {
        Self {
            world,
            width,
            height,
            pixel_noise,
            noise,
            sequence: 0,
            opened: false,
        }
    }

    fn render(&mut self) -> Vec<u8> {
        let (w, h) = (self.width, self.height);
        let body_rows = h.saturating_sub(1);
        let square = self.world.target().map(|t| {
            let half = t.size * h as f32 / 2.0;
            let (cx, cy) = (t.center_x * w as f32, t.center_y * h as f32);
            (cx - half, cy - half, cx + half, cy + half)
        });

        let mut pixels = Vec::with_capacity((w * h) as usize);
        for y in 0..body_rows {
            for x in 0..w {
                let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
                let lit = square
                    .is_some_and(|(x1, y1, x2, y2)| px >= x1 && px < x2 && py >= y1 && py < y2);
                let base = if lit { TARGET } else { BACKGROUND };
                let value = base + self.noise.gaussian(self.pixel_noise);
                pixels.push(value.round().clamp(0.0, 255.0) as u8);
            }
        }
        if h > 0 {
            pixels.extend(encode_marker_row(self.world.marker().as_deref(), w));
        }
        pixels
    }
}

impl Camera for SimCamera {
    fn open(&mut self) -> Result<()> {
        if self.world.is_unavailable("camera") {
            return Err(Error::hardware_init("camera", "no video device"));
        }
        self.opened = true;
        log::info!("Simulated camera {}x{}", self.width, self.height);
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame> {
        if !self.opened {
            return Err(Error::NotInitialized);
        }
        if self.world.camera_failing() {
            return Err(Error::Sensor(SensorError::Read("camera disconnected".into())));
        }
        self.sequence += 1;
        let pixels = self.render();
        Ok(Frame::new(self.width, self.height, pixels, self.sequence))
    }

    fn close(&mut self) {
        self.opened = false;
    }
}

/// Barcode row for `payload`; all zeros when absent or too long for `width`
pub fn encode_marker_row(payload: Option<&str>, width: u32) -> Vec<u8> {
    let mut row = vec![0u8; width as usize];
    let Some(payload) = payload else {
        return row;
    };
    let bytes = payload.as_bytes();
    if bytes.len() > u8::MAX as usize || bytes.len() + 3 > row.len() / 8 {
        log::warn!("Marker '{}' does not fit a {} px row", payload, width);
        return row;
    }

    let mut framed = Vec::with_capacity(bytes.len() + 3);
    framed.push(MARKER_SYNC);
    framed.push(bytes.len() as u8);
    framed.extend_from_slice(bytes);
    framed.push(checksum(bytes));

    for (i, byte) in framed.iter().enumerate() {
        for bit in 0..8 {
            if byte & (0x80 >> bit) != 0 {
                row[i * 8 + bit] = 255;
            }
        }
    }
    row
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Reads the bottom-row barcode
#[derive(Debug, Default, Clone, Copy)]
pub struct BarcodeDecoder;

impl MarkerDecoder for BarcodeDecoder {
    fn decode(&mut self, frame: &Frame) -> Option<String> {
        let row = frame.row(frame.height.checked_sub(1)?);
        let bytes: Vec<u8> = row
            .chunks_exact(8)
            .map(|bits| bits.iter().fold(0u8, |acc, &p| (acc << 1) | u8::from(p >= 128)))
            .collect();

        let (&sync, rest) = bytes.split_first()?;
        if sync != MARKER_SYNC {
            return None;
        }
        let (&len, rest) = rest.split_first()?;
        let len = len as usize;
        let payload = rest.get(..len)?;
        if *rest.get(len)? != checksum(payload) {
            log::trace!("Marker checksum mismatch in frame {}", frame.sequence);
            return None;
        }
        String::from_utf8(payload.to_vec()).ok()
    }
}
