use image::imageops::{self, FilterType};

use crate::face_detector::{Encoding, FaceEncoder};
use crate::region::FaceRegion;
use crate::Frame;

/// Appearance encoder: a normalised grayscale thumbnail of the face.
///
/// Each face is reduced to `size` × `size` luma samples, centred on zero mean
/// and scaled to unit length, so Euclidean distances fall in `[0, 2]`. This
/// captures lighting-independent appearance, not identity: two different
/// people with the same light-and-shade layout encode almost identically.
/// It reports no [`FaceEncoder::identity_threshold`], so identity matching
/// refuses it; use an embedding model such as the `arcface` feature's
/// encoder for that.
#[derive(Debug, Clone, Copy)]
pub struct PatchEncoder {
    size: u32,
}

impl PatchEncoder {
    /// Default thumbnail side.
    pub const DEFAULT_SIZE: u32 = 16;

    /// Encoder with `size` × `size` thumbnails (minimum 1).
    pub fn new(size: u32) -> Self {
        Self { size: size.max(1) }
    }

    /// Length of the produced encodings.
    pub fn dimensions(&self) -> usize {
        (self.size * self.size) as usize
    }

    fn encode_one(&self, frame: &Frame, region: &FaceRegion) -> Encoding {
        let rect = region.clamp_to(frame.width(), frame.height());
        if rect.is_empty() {
            return Encoding::new(vec![0.0; self.dimensions()]);
        }

        let face = imageops::crop_imm(frame, rect.x, rect.y, rect.width, rect.height).to_image();
        let gray = imageops::grayscale(&face);
        let thumb = imageops::resize(&gray, self.size, self.size, FilterType::Triangle);

        let mut values: Vec<f32> = thumb.as_raw().iter().map(|&v| v as f32).collect();
        let mean = values.iter().sum::<f32>() / values.len() as f32;
        values.iter_mut().for_each(|v| *v -= mean);
        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            values.iter_mut().for_each(|v| *v /= norm);
        }
        Encoding::new(values)
    }
}

impl Default for PatchEncoder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SIZE)
    }
}

impl FaceEncoder for PatchEncoder {
    fn encode_faces(&self, frame: &Frame, regions: &[FaceRegion]) -> Vec<Encoding> {
        regions
            .iter()
            .map(|region| self.encode_one(frame, region))
            .collect()
    }
}
