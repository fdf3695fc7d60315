use crate::region::FaceRegion;
use crate::Frame;

/// Pluggable face detection backend.
///
/// Implement this trait to provide a custom face detector (ONNX, dlib, etc.)
/// and pass it to [`crate::FrameProcessor::new`]. Returning an empty list is
/// a normal outcome: frames without faces pass through unchanged.
pub trait FaceDetector: Send + Sync {
    /// Locate faces in an RGB frame. Regions must lie within the frame.
    fn locate_faces(&self, frame: &Frame) -> Vec<FaceRegion>;
}

/// Fixed-length feature vector describing one face.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoding(Vec<f32>);

impl Encoding {
    /// Wrap a raw feature vector.
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Feature values.
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for a zero-length encoding.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<f32>> for Encoding {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// Pluggable face encoder.
pub trait FaceEncoder: Send + Sync {
    /// Encode each region of `frame`, returning one encoding per region in
    /// the same order.
    fn encode_faces(&self, frame: &Frame, regions: &[FaceRegion]) -> Vec<Encoding>;

    /// Distance below which two of this encoder's encodings belong to the
    /// same person.
    ///
    /// `None` (the default) marks an encoder whose output describes
    /// appearance only; [`crate::IdentityMatcher::for_encoder`] refuses it.
    fn identity_threshold(&self) -> Option<f32> {
        None
    }
}

/// Dissimilarity between two encodings; lower means more alike.
pub trait DistanceMetric: Send + Sync {
    /// Distance from a known encoding to an unknown one.
    fn distance(&self, known: &Encoding, unknown: &Encoding) -> f32;
}

/// Euclidean (L2) distance.
///
/// Features beyond the shorter vector are ignored, so mismatched lengths
/// compare on their common prefix.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanDistance;

impl DistanceMetric for EuclideanDistance {
    fn distance(&self, known: &Encoding, unknown: &Encoding) -> f32 {
        known
            .as_slice()
            .iter()
            .zip(unknown.as_slice())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    }
}
