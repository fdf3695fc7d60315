use std::path::PathBuf;

use thiserror::Error;

use crate::video::VideoError;

/// Coarse grouping of [`MosaicError`] variants, suitable for a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing or unreadable input, unsupported extension, missing state.
    Input,
    /// The detector or encoder produced unusable output.
    Detection,
    /// The reference identity set could not be built.
    Identity,
    /// A region or pixelation parameter is degenerate.
    Geometry,
    /// Image or video encoding/decoding failed.
    Media,
}

/// Error type returned by facemosaic operations.
#[derive(Debug, Error)]
pub enum MosaicError {
    /// An image file could not be decoded.
    #[error("failed to decode image: {0}")]
    DecodeError(String),

    /// An image could not be encoded for saving.
    #[error("failed to encode image: {0}")]
    EncodeError(String),

    /// Reading or writing a file failed.
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        /// File or folder being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file extension is not a supported image or video format.
    #[error("unsupported file extension for {}", .0.display())]
    UnsupportedExtension(PathBuf),

    /// A session operation needs an image that was never loaded.
    #[error("no image loaded")]
    NoImageLoaded,

    /// `save` was called before `commit`.
    #[error("no mosaiced image to save; commit a mosaic first")]
    NothingToSave,

    /// A required job input was not set.
    #[error("missing input: {0}")]
    MissingInput(&'static str),

    /// The encoder did not return one encoding per face.
    #[error("encoder returned {got} encodings for {expected} faces")]
    EncodingMismatch {
        /// Faces handed to the encoder.
        expected: usize,
        /// Encodings it returned.
        got: usize,
    },

    /// The reference folder holds no images.
    #[error("reference folder {} contains no images", .0.display())]
    EmptyIdentitySet(PathBuf),

    /// A reference image does not show exactly one face.
    #[error("reference image {} must contain exactly one face, found {found}", .path.display())]
    ReferenceFaceCount {
        /// The offending reference image.
        path: PathBuf,
        /// Faces detected in it.
        found: usize,
    },

    /// A face region has zero or negative width or height.
    #[error("degenerate face region (top {top}, right {right}, bottom {bottom}, left {left})")]
    DegenerateRegion {
        /// Top edge.
        top: u32,
        /// Right edge, exclusive.
        right: u32,
        /// Bottom edge, exclusive.
        bottom: u32,
        /// Left edge.
        left: u32,
    },

    /// A pixelation factor is out of range.
    #[error("pixelation factor must be between {min} and {max}, got {got}")]
    InvalidPixelation {
        /// Requested factor.
        got: u32,
        /// Smallest accepted factor.
        min: u32,
        /// Largest accepted factor.
        max: u32,
    },

    /// Keyframe spacing of zero.
    #[error("group size must be > 0")]
    InvalidGroupSize,

    /// Identity threshold that is not positive and finite.
    #[error("identity threshold must be a positive finite number, got {0}")]
    InvalidThreshold(f32),

    /// A detector or encoder model could not be loaded.
    #[error("failed to load face model: {0}")]
    ModelLoadError(String),

    /// Identity matching was asked of an encoder that only captures appearance.
    #[error("the face encoder does not produce identity embeddings; load an embedding model")]
    AppearanceOnlyEncoder,

    /// Face encoding model failed at inference time.
    #[error("face encoder inference failed: {0}")]
    InferenceError(String),

    /// ffmpeg or ffprobe failed.
    #[error(transparent)]
    Video(#[from] VideoError),
}

impl MosaicError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MosaicError::Io {
            path: path.into(),
            source,
        }
    }

    /// Which part of the pipeline the error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            MosaicError::Io { .. }
            | MosaicError::UnsupportedExtension(_)
            | MosaicError::NoImageLoaded
            | MosaicError::NothingToSave
            | MosaicError::MissingInput(_) => ErrorCategory::Input,
            MosaicError::EncodingMismatch { .. }
            | MosaicError::ModelLoadError(_)
            | MosaicError::InferenceError(_) => ErrorCategory::Detection,
            MosaicError::EmptyIdentitySet(_)
            | MosaicError::ReferenceFaceCount { .. }
            | MosaicError::InvalidThreshold(_)
            | MosaicError::AppearanceOnlyEncoder => ErrorCategory::Identity,
            MosaicError::DegenerateRegion { .. }
            | MosaicError::InvalidPixelation { .. }
            | MosaicError::InvalidGroupSize => ErrorCategory::Geometry,
            MosaicError::DecodeError(_) | MosaicError::EncodeError(_) | MosaicError::Video(_) => {
                ErrorCategory::Media
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_error_names_the_file() {
        let err = MosaicError::ReferenceFaceCount {
            path: PathBuf::from("refs/alice.png"),
            found: 0,
        };
        assert!(err.to_string().contains("refs/alice.png"));
        assert_eq!(err.category(), ErrorCategory::Identity);
    }

    #[test]
    fn categories_follow_the_taxonomy() {
        assert_eq!(MosaicError::NoImageLoaded.category(), ErrorCategory::Input);
        assert_eq!(
            MosaicError::EmptyIdentitySet(PathBuf::from("refs")).category(),
            ErrorCategory::Identity
        );
        assert_eq!(
            MosaicError::InvalidGroupSize.category(),
            ErrorCategory::Geometry
        );
        assert_eq!(
            MosaicError::Video(VideoError::NotFound).category(),
            ErrorCategory::Media
        );
        assert_eq!(
            MosaicError::AppearanceOnlyEncoder.category(),
            ErrorCategory::Identity
        );
        assert_eq!(
            MosaicError::InferenceError("bad output".into()).category(),
            ErrorCategory::Detection
        );
    }

    #[test]
    fn messages_carry_their_fields() {
        let err = MosaicError::InvalidPixelation {
            got: 2048,
            min: 1,
            max: 1024,
        };
        assert_eq!(
            err.to_string(),
            "pixelation factor must be between 1 and 1024, got 2048"
        );
        let err = MosaicError::EncodingMismatch {
            expected: 3,
            got: 2,
        };
        assert_eq!(err.to_string(), "encoder returned 2 encodings for 3 faces");
    }
}
