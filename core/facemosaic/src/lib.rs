//! Face-selective mosaic for photos and videos: detect faces, decide which
//! ones stay sharp, pixelate the rest.
//!
//! Two flows are provided. [`ImageSession`] is the interactive one: faces are
//! listed left to right and the caller toggles the ones to keep. For video,
//! [`convert_video`] compares every face against a folder of reference photos
//! and mosaics everyone who is not on it, running full detection on every
//! third frame only. Telling people apart needs a face-embedding model; the
//! `arcface` feature provides one backed by ONNX Runtime.
//!
//! # Example
//!
//! ```no_run
//! use facemosaic::{DetectorConfig, ImageSession, PixelationFactor, RustfaceDetector};
//! use std::path::Path;
//!
//! let detector = RustfaceDetector::new(DetectorConfig::new()).unwrap();
//! let mut session = ImageSession::new(Box::new(detector));
//! session.load(Path::new("group.jpg")).unwrap();
//! session.detect().unwrap();
//! session.toggle_index(0);
//! session.commit(PixelationFactor::default()).unwrap();
//! session.save(Path::new("group_mosaic.jpg")).unwrap();
//! ```
#![warn(missing_docs)]

#[cfg(feature = "arcface")]
/// ONNX ArcFace face-embedding encoder.
pub mod arcface_backend;
/// Pipeline settings.
pub mod config;
mod error;
/// Face detection and encoding traits.
pub mod face_detector;
mod identity;
/// Still-image load and save.
pub mod media;
mod patch_encoder;
/// Region pixelation.
pub mod pixelate;
mod pipeline;
mod processor;
mod propagate;
mod region;
#[cfg(feature = "rustface")]
/// Built-in SeetaFace-based face detector backend.
pub mod rustface_backend;
mod selector;
mod session;
/// Video decode and encode through ffmpeg.
pub mod video;

/// An 8-bit RGB image; every frame in the pipeline uses this layout.
pub type Frame = image::RgbImage;

#[cfg(feature = "arcface")]
/// Identity encoder that runs an ArcFace model through ONNX Runtime.
pub use arcface_backend::{ArcFaceEncoder, EncoderConfig, ARCFACE_IDENTITY_THRESHOLD};
pub use config::{MosaicConfig, PixelationFactor};
/// Error type returned by facemosaic operations.
pub use error::{ErrorCategory, MosaicError};
pub use face_detector::{DistanceMetric, Encoding, EuclideanDistance, FaceDetector, FaceEncoder};
pub use identity::KnownIdentitySet;
pub use patch_encoder::PatchEncoder;
pub use pipeline::{convert_video, ConversionReport, VideoJob, DEFAULT_OUTPUT};
pub use pixelate::{apply_mosaic, block_average, pixelate, MosaicStyle};
pub use processor::{draw_outlines, FrameProcessor, KeyframeResult, RegionOrder};
pub use propagate::{PropagationStats, TemporalPropagator};
pub use region::{FaceDecision, FaceRegion, PixelRect, RegionKey};
#[cfg(feature = "rustface")]
/// Built-in detector that reads a SeetaFace model from disk.
pub use rustface_backend::{DetectorConfig, RustfaceDetector};
pub use selector::{IdentityMatcher, ManualSelector, DEFAULT_IDENTITY_THRESHOLD};
pub use session::ImageSession;
pub use video::{FfmpegVideo, VideoError, VideoInfo};
