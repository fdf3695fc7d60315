use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use tracing::debug;

use crate::error::MosaicError;
use crate::face_detector::FaceDetector;
use crate::region::FaceRegion;
use crate::Frame;

/// Tuning for the SeetaFace detector.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Path to the SeetaFace frontal model file.
    pub model_path: PathBuf,

    /// Faces smaller than this (pixels) are not reported.
    pub min_face_size: u32,

    /// Confidence threshold. Higher values trade missed faces for fewer
    /// false positives.
    pub score_thresh: f64,

    /// Shrink factor between pyramid levels, in (0, 1).
    pub pyramid_scale_factor: f32,

    /// Sliding window step (x, y) in pixels.
    pub slide_window_step: (u32, u32),
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("model/seeta_fd_frontal_v1.0.bin"),
            min_face_size: 20,
            score_thresh: 2.0,
            pyramid_scale_factor: 0.8,
            slide_window_step: (4, 4),
        }
    }
}

impl DetectorConfig {
    /// Default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set model path.
    pub fn set_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = path.into();
        self
    }

    /// Set minimum face size.
    pub fn set_min_face_size(mut self, size: u32) -> Self {
        self.min_face_size = size;
        self
    }

    /// Set score threshold.
    pub fn set_score_thresh(mut self, thresh: f64) -> Self {
        self.score_thresh = thresh;
        self
    }

    /// Set pyramid scale factor.
    pub fn set_pyramid_scale_factor(mut self, factor: f32) -> Self {
        self.pyramid_scale_factor = factor;
        self
    }

    /// Set slide window step sizes.
    pub fn set_slide_window_step(mut self, x: u32, y: u32) -> Self {
        self.slide_window_step = (x, y);
        self
    }
}

/// Face detector backed by the `rustface` crate (SeetaFace engine).
///
/// The model is read once on construction; each detection call builds a
/// fresh detector from a clone of it, so the type is `Sync`.
pub struct RustfaceDetector {
    model: rustface::Model,
    config: DetectorConfig,
}

impl RustfaceDetector {
    /// Load the model named by `config.model_path`.
    pub fn new(config: DetectorConfig) -> Result<Self, MosaicError> {
        let path = &config.model_path;
        let file = File::open(path).map_err(|e| {
            MosaicError::ModelLoadError(format!("failed to open {}: {}", path.display(), e))
        })?;
        let model = rustface::read_model(BufReader::new(file)).map_err(|e| {
            MosaicError::ModelLoadError(format!("failed to parse {}: {}", path.display(), e))
        })?;
        debug!(model = %path.display(), "loaded SeetaFace model");
        Ok(Self { model, config })
    }

    /// Settings in use.
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }
}

impl FaceDetector for RustfaceDetector {
    fn locate_faces(&self, frame: &Frame) -> Vec<FaceRegion> {
        let gray = image::imageops::grayscale(frame);
        let (width, height) = gray.dimensions();

        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(self.config.min_face_size);
        detector.set_score_thresh(self.config.score_thresh);
        detector.set_pyramid_scale_factor(self.config.pyramid_scale_factor);
        let (step_x, step_y) = self.config.slide_window_step;
        detector.set_slide_window_step(step_x, step_y);

        let faces = detector.detect(&rustface::ImageData::new(gray.as_raw(), width, height));

        faces
            .iter()
            .filter_map(|face| {
                let bbox = face.bbox();
                // SeetaFace boxes may start left of / above the frame.
                let left = bbox.x().max(0) as u32;
                let top = bbox.y().max(0) as u32;
                let right = (bbox.x() as i64 + bbox.width() as i64).clamp(0, width as i64) as u32;
                let bottom =
                    (bbox.y() as i64 + bbox.height() as i64).clamp(0, height as i64) as u32;
                FaceRegion::new(top, right, bottom, left).ok()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = DetectorConfig::new();
        assert_eq!(config.min_face_size, 20);
        assert_eq!(config.slide_window_step, (4, 4));
        assert!(config.model_path.ends_with("seeta_fd_frontal_v1.0.bin"));
    }

    #[test]
    fn config_setters_chain() {
        let config = DetectorConfig::new()
            .set_model_path("/models/seeta.bin")
            .set_min_face_size(40)
            .set_score_thresh(3.0)
            .set_pyramid_scale_factor(0.7)
            .set_slide_window_step(2, 3);
        assert_eq!(config.model_path, PathBuf::from("/models/seeta.bin"));
        assert_eq!(config.min_face_size, 40);
        assert_eq!(config.score_thresh, 3.0);
        assert_eq!(config.pyramid_scale_factor, 0.7);
        assert_eq!(config.slide_window_step, (2, 3));
    }

    #[test]
    fn missing_model_is_reported() {
        let config = DetectorConfig::new().set_model_path("/no/such/model.bin");
        let err = RustfaceDetector::new(config).err().unwrap();
        assert!(matches!(err, MosaicError::ModelLoadError(_)));
        assert!(err.to_string().contains("/no/such/model.bin"));
    }
}
