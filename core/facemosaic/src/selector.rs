use std::collections::HashSet;

use crate::error::MosaicError;
use crate::face_detector::{DistanceMetric, Encoding, EuclideanDistance, FaceEncoder};
use crate::identity::KnownIdentitySet;
use crate::region::{FaceDecision, FaceRegion, RegionKey};

/// Encodings closer than this to a known face count as a match.
pub const DEFAULT_IDENTITY_THRESHOLD: f32 = 0.6;

/// Click-driven protected set for the interactive image flow.
///
/// Membership is keyed by [`RegionKey`], so re-sorting or re-listing the
/// same detections never moves a choice onto a different face.
#[derive(Debug, Clone, Default)]
pub struct ManualSelector {
    protected: HashSet<RegionKey>,
}

impl ManualSelector {
    /// Empty selection: every face will be mosaiced.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle the first region containing `(x, y)`.
    ///
    /// Regions are scanned in list order and the first hit wins, so for
    /// overlapping boxes the earlier one is toggled. Returns the index of the
    /// toggled region, or `None` if the point hit nothing.
    pub fn toggle_at(&mut self, regions: &[FaceRegion], x: f64, y: f64) -> Option<usize> {
        let index = regions.iter().position(|region| region.contains(x, y))?;
        self.toggle(&regions[index]);
        Some(index)
    }

    /// Flip membership of one region.
    pub fn toggle(&mut self, region: &FaceRegion) {
        let key = region.key();
        if !self.protected.remove(&key) {
            self.protected.insert(key);
        }
    }

    /// Whether the region is kept sharp.
    pub fn is_protected(&self, region: &FaceRegion) -> bool {
        self.protected.contains(&region.key())
    }

    /// Number of protected faces.
    pub fn len(&self) -> usize {
        self.protected.len()
    }

    /// True when nothing is protected.
    pub fn is_empty(&self) -> bool {
        self.protected.is_empty()
    }

    /// Forget every choice.
    pub fn clear(&mut self) {
        self.protected.clear();
    }

    /// Decisions for `regions`, in the same order.
    pub fn decisions(&self, regions: &[FaceRegion]) -> Vec<FaceDecision> {
        regions
            .iter()
            .map(|region| FaceDecision {
                region: *region,
                protect: self.is_protected(region),
            })
            .collect()
    }
}

/// Protects faces that resemble a known identity.
pub struct IdentityMatcher {
    metric: Box<dyn DistanceMetric>,
    threshold: f32,
}

impl IdentityMatcher {
    /// Euclidean distance with the default threshold of 0.6.
    pub fn new() -> Self {
        Self {
            metric: Box::new(EuclideanDistance),
            threshold: DEFAULT_IDENTITY_THRESHOLD,
        }
    }

    /// Euclidean matcher calibrated for `encoder`.
    ///
    /// `threshold` overrides the encoder's own threshold. Encoders that report
    /// none only describe appearance and are refused with
    /// [`MosaicError::AppearanceOnlyEncoder`], since they would keep strangers
    /// with a similar light-and-shade layout sharp.
    pub fn for_encoder(
        encoder: &dyn FaceEncoder,
        threshold: Option<f32>,
    ) -> Result<Self, MosaicError> {
        let calibrated = encoder
            .identity_threshold()
            .ok_or(MosaicError::AppearanceOnlyEncoder)?;
        Self::new().threshold(threshold.unwrap_or(calibrated))
    }

    /// Replace the distance metric.
    pub fn metric(mut self, metric: Box<dyn DistanceMetric>) -> Self {
        self.metric = metric;
        self
    }

    /// Set the match threshold. Must be positive and finite.
    pub fn threshold(mut self, threshold: f32) -> Result<Self, MosaicError> {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(MosaicError::InvalidThreshold(threshold));
        }
        self.threshold = threshold;
        Ok(self)
    }

    /// The configured threshold.
    pub fn current_threshold(&self) -> f32 {
        self.threshold
    }

    /// Smallest distance from `encoding` to any known face.
    ///
    /// `None` when the set is empty. NaN distances are skipped.
    pub fn nearest_distance(&self, encoding: &Encoding, known: &KnownIdentitySet) -> Option<f32> {
        known
            .encodings()
            .iter()
            .map(|candidate| self.metric.distance(candidate, encoding))
            .filter(|distance| !distance.is_nan())
            .min_by(f32::total_cmp)
    }

    /// `true` (protect) when the nearest known face is below the threshold.
    ///
    /// An empty known set means no identity can match, so every face is
    /// mosaiced.
    pub fn classify(&self, encoding: &Encoding, known: &KnownIdentitySet) -> bool {
        matches!(
            self.nearest_distance(encoding, known),
            Some(distance) if distance < self.threshold
        )
    }
}

impl Default for IdentityMatcher {
    fn default() -> Self {
        Self::new()
    }
}
