//! Brightness-blob object detector for synthetic frames

use crate::core::types::{BoundingBox, Detection, Frame};
use crate::error::Result;
use crate::vision::ObjectDetector;

/// Segments pixels at or above `threshold` into one bounding box.
/// The bottom row is reserved for the marker barcode and ignored.
#[derive(Debug, Clone)]
pub struct BlobDetector {
    pub threshold: u8,
    pub min_pixels: usize,
    pub label: String,
}

impl Default for BlobDetector {
    fn default() -> Self {
        Self {
            threshold: 128,
            min_pixels: 16,
            label: "target".to_string(),
        }
    }
}

impl ObjectDetector for BlobDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Option<Detection>> {
        let mut count = 0usize;
        let (mut x1, mut y1) = (u32::MAX, u32::MAX);
        let (mut x2, mut y2) = (0u32, 0u32);

        for y in 0..frame.height.saturating_sub(1) {
            for (x, &p) in frame.row(y).iter().enumerate() {
                if p < self.threshold {
                    continue;
                }
                let x = x as u32;
                count += 1;
                x1 = x1.min(x);
                y1 = y1.min(y);
                x2 = x2.max(x);
                y2 = y2.max(y);
            }
        }

        if count < self.min_pixels.max(1) {
            return Ok(None);
        }
        let bbox = BoundingBox::new(x1 as f32, y1 as f32, (x2 + 1) as f32, (y2 + 1) as f32);
        let fill = count as f32 / bbox.area();
        Ok(Some(Detection::new(bbox, self.label.clone(), fill)))
    }
}
