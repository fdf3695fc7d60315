use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::imageops::{self, FilterType};
use ndarray::{s, Array3, Array4};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tracing::{debug, warn};

use crate::error::MosaicError;
use crate::face_detector::{Encoding, FaceEncoder};
use crate::region::FaceRegion;
use crate::Frame;

/// Side of the square face crop ArcFace models take.
pub const ARCFACE_INPUT_SIZE: u32 = 112;

/// Euclidean distance between unit ArcFace embeddings below which two faces
/// are the same person. Equals a cosine similarity of about 0.4.
pub const ARCFACE_IDENTITY_THRESHOLD: f32 = 1.1;

/// Settings for the ONNX face-embedding model.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Path to an ArcFace-style ONNX model: `[N, 3, S, S]` in, `[N, D]` out.
    pub model_path: PathBuf,

    /// Input side `S` in pixels.
    pub input_size: u32,

    /// Threads ONNX Runtime may use inside one operator.
    pub intra_threads: usize,

    /// Match threshold reported through [`FaceEncoder::identity_threshold`].
    pub identity_threshold: f32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("model/arcface.onnx"),
            input_size: ARCFACE_INPUT_SIZE,
            intra_threads: 4,
            identity_threshold: ARCFACE_IDENTITY_THRESHOLD,
        }
    }
}

impl EncoderConfig {
    /// Default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set model path.
    pub fn set_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = path.into();
        self
    }

    /// Set the model input side (minimum 1).
    pub fn set_input_size(mut self, size: u32) -> Self {
        self.input_size = size.max(1);
        self
    }

    /// Set intra-op thread count (minimum 1).
    pub fn set_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = threads.max(1);
        self
    }

    /// Set the identity threshold. Must be positive and finite.
    pub fn set_identity_threshold(mut self, threshold: f32) -> Result<Self, MosaicError> {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(MosaicError::InvalidThreshold(threshold));
        }
        self.identity_threshold = threshold;
        Ok(self)
    }
}

/// Identity encoder running an ArcFace embedding model through ONNX Runtime.
///
/// Each face is resized to fit the model input, padded to a square, and
/// embedded; embeddings are scaled to unit length so Euclidean distance
/// tracks cosine similarity.
pub struct ArcFaceEncoder {
    session: Mutex<Session>,
    config: EncoderConfig,
}

impl ArcFaceEncoder {
    /// Load the model named by `config.model_path`.
    pub fn new(config: EncoderConfig) -> Result<Self, MosaicError> {
        let path = &config.model_path;
        if !path.is_file() {
            return Err(MosaicError::ModelLoadError(format!(
                "{} does not exist",
                path.display()
            )));
        }
        let session = Session::builder()
            .map_err(|e| load_error(path, e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| load_error(path, e))?
            .with_intra_threads(config.intra_threads)
            .map_err(|e| load_error(path, e))?
            .commit_from_file(path)
            .map_err(|e| load_error(path, e))?;

        debug!(model = %path.display(), "loaded face embedding model");
        Ok(Self {
            session: Mutex::new(session),
            config,
        })
    }

    /// Settings in use.
    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    fn embed(&self, batch: Array4<f32>) -> Result<Vec<Encoding>, MosaicError> {
        let faces = batch.shape()[0];
        let tensor = Tensor::from_array(batch).map_err(inference_error)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| MosaicError::InferenceError("session lock poisoned".into()))?;
        let outputs = session.run(ort::inputs![tensor]).map_err(inference_error)?;
        let embeddings = outputs[0]
            .try_extract_array::<f32>()
            .map_err(inference_error)?;

        let values: Vec<f32> = embeddings.iter().copied().collect();
        if faces == 0 || values.is_empty() || values.len() % faces != 0 {
            return Err(MosaicError::InferenceError(format!(
                "{} output values for {faces} faces",
                values.len()
            )));
        }
        Ok(values
            .chunks(values.len() / faces)
            .map(|embedding| Encoding::new(unit_length(embedding)))
            .collect())
    }
}

impl FaceEncoder for ArcFaceEncoder {
    fn encode_faces(&self, frame: &Frame, regions: &[FaceRegion]) -> Vec<Encoding> {
        if regions.is_empty() {
            return Vec::new();
        }
        match self.embed(face_batch(frame, regions, self.config.input_size)) {
            Ok(encodings) => encodings,
            Err(e) => {
                // the processor turns the short result into EncodingMismatch
                warn!(error = %e, faces = regions.len(), "face embedding failed");
                Vec::new()
            }
        }
    }

    fn identity_threshold(&self) -> Option<f32> {
        Some(self.config.identity_threshold)
    }
}

fn load_error(path: &Path, e: impl Display) -> MosaicError {
    MosaicError::ModelLoadError(format!("{}: {e}", path.display()))
}

fn inference_error<E: Display>(e: E) -> MosaicError {
    MosaicError::InferenceError(e.to_string())
}

/// Pack the faces into an `[N, 3, size, size]` batch scaled to `[-1, 1]`.
///
/// Each face keeps its aspect ratio and is centred; the padding is zero,
/// which is mid-grey after scaling. Faces entirely outside the frame stay
/// all-zero.
pub(crate) fn face_batch(frame: &Frame, regions: &[FaceRegion], size: u32) -> Array4<f32> {
    let side = size as usize;
    let mut batch = Array4::zeros([regions.len(), 3, side, side]);

    for (slot, region) in regions.iter().enumerate() {
        let rect = region.clamp_to(frame.width(), frame.height());
        if rect.is_empty() {
            continue;
        }
        let face = imageops::crop_imm(frame, rect.x, rect.y, rect.width, rect.height).to_image();
        let scale = f64::from(size) / f64::from(rect.width.max(rect.height));
        let width = ((f64::from(rect.width) * scale).round() as u32).clamp(1, size);
        let height = ((f64::from(rect.height) * scale).round() as u32).clamp(1, size);
        let resized = imageops::resize(&face, width, height, FilterType::Triangle);

        let (w, h) = (width as usize, height as usize);
        let pad_x = (side - w) / 2;
        let pad_y = (side - h) / 2;
        let Some(pixels) = Array3::from_shape_vec([h, w, 3], resized.into_raw()).ok() else {
            continue;
        };
        let pixels = pixels.mapv(|v| (f32::from(v) - 127.5) / 127.5);
        batch
            .slice_mut(s![slot, .., pad_y..pad_y + h, pad_x..pad_x + w])
            .assign(&pixels.permuted_axes([2, 0, 1]));
    }
    batch
}

fn unit_length(values: &[f32]) -> Vec<f32> {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        values.iter().map(|v| v / norm).collect()
    } else {
        values.to_vec()
    }
}
