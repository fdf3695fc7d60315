use image::Rgb;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use tracing::debug;

use crate::config::MosaicConfig;
use crate::error::MosaicError;
use crate::face_detector::{FaceDetector, FaceEncoder};
use crate::identity::KnownIdentitySet;
use crate::pixelate::{apply_mosaic, MosaicStyle};
use crate::region::{sort_left_to_right, FaceDecision, FaceRegion};
use crate::selector::IdentityMatcher;
use crate::Frame;

/// Outline colour for faces that stay sharp.
pub const PROTECTED_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Outline colour for faces that will be mosaiced.
pub const TARGET_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Outline thickness in pixels, drawn inward from the region edge.
const OUTLINE_WIDTH: u32 = 3;

/// Ordering applied to detector output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionOrder {
    /// Keep whatever order the detector returned (video flow).
    Detector,
    /// Sort by left edge, stable (interactive image flow).
    LeftToRight,
}

/// Output of a fully analysed frame.
#[derive(Debug, Clone)]
pub struct KeyframeResult {
    /// The processed frame.
    pub frame: Frame,
    /// One decision per detected face, in detection order.
    pub decisions: Vec<FaceDecision>,
}

impl KeyframeResult {
    /// Face regions in detection order.
    pub fn regions(&self) -> Vec<FaceRegion> {
        self.decisions.iter().map(|d| d.region).collect()
    }
}

/// Runs detection, selection and pixelation over single frames.
pub struct FrameProcessor {
    detector: Box<dyn FaceDetector>,
    encoder: Box<dyn FaceEncoder>,
    matcher: IdentityMatcher,
    style: MosaicStyle,
}

impl FrameProcessor {
    /// Processor with the default identity matcher and block-average style.
    pub fn new(detector: Box<dyn FaceDetector>, encoder: Box<dyn FaceEncoder>) -> Self {
        Self {
            detector,
            encoder,
            matcher: IdentityMatcher::new(),
            style: MosaicStyle::BlockAverage,
        }
    }

    /// Processor using the threshold and video style from `config`.
    pub fn with_config(
        detector: Box<dyn FaceDetector>,
        encoder: Box<dyn FaceEncoder>,
        config: &MosaicConfig,
    ) -> Result<Self, MosaicError> {
        let matcher = IdentityMatcher::new().threshold(config.identity_threshold)?;
        Ok(Self::new(detector, encoder)
            .matcher(matcher)
            .style(config.video_style))
    }

    /// Replace the identity matcher.
    pub fn matcher(mut self, matcher: IdentityMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Set the mosaic applied to non-protected faces in identity mode.
    pub fn style(mut self, style: MosaicStyle) -> Self {
        self.style = style;
        self
    }

    /// The face detector.
    pub fn detector(&self) -> &dyn FaceDetector {
        self.detector.as_ref()
    }

    /// The face encoder.
    pub fn encoder(&self) -> &dyn FaceEncoder {
        self.encoder.as_ref()
    }

    /// Locate faces and order them.
    pub fn detect(&self, frame: &Frame, order: RegionOrder) -> Vec<FaceRegion> {
        let mut regions = self.detector.locate_faces(frame);
        if order == RegionOrder::LeftToRight {
            sort_left_to_right(&mut regions);
        }
        regions
    }

    /// Decide per region whether it matches a known identity.
    pub fn classify(
        &self,
        frame: &Frame,
        regions: &[FaceRegion],
        known: &KnownIdentitySet,
    ) -> Result<Vec<FaceDecision>, MosaicError> {
        if regions.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self.encoder.encode_faces(frame, regions);
        if encodings.len() != regions.len() {
            return Err(MosaicError::EncodingMismatch {
                expected: regions.len(),
                got: encodings.len(),
            });
        }

        Ok(regions
            .iter()
            .zip(&encodings)
            .map(|(region, encoding)| FaceDecision {
                region: *region,
                protect: self.matcher.classify(encoding, known),
            })
            .collect())
    }

    /// Analyse one frame.
    ///
    /// With a known identity set, faces are classified and every face that
    /// matches nobody is mosaiced. Without one (interactive flow), faces are
    /// sorted left to right, reported as not yet protected, and only outlined
    /// in red; the actual mosaic waits for an explicit commit.
    pub fn process(
        &self,
        mut frame: Frame,
        known: Option<&KnownIdentitySet>,
    ) -> Result<KeyframeResult, MosaicError> {
        match known {
            Some(known) => {
                let regions = self.detect(&frame, RegionOrder::Detector);
                let decisions = self.classify(&frame, &regions, known)?;
                self.apply_decisions(&mut frame, &decisions)?;
                debug!(
                    faces = decisions.len(),
                    protected = decisions.iter().filter(|d| d.protect).count(),
                    "analysed keyframe"
                );
                Ok(KeyframeResult { frame, decisions })
            }
            None => {
                let regions = self.detect(&frame, RegionOrder::LeftToRight);
                let decisions: Vec<FaceDecision> = regions
                    .into_iter()
                    .map(|region| FaceDecision {
                        region,
                        protect: false,
                    })
                    .collect();
                draw_outlines(&mut frame, &decisions);
                Ok(KeyframeResult { frame, decisions })
            }
        }
    }

    /// Mosaic every non-protected decision in place, without detection.
    pub fn apply_decisions(
        &self,
        frame: &mut Frame,
        decisions: &[FaceDecision],
    ) -> Result<(), MosaicError> {
        for decision in decisions.iter().filter(|d| !d.protect) {
            apply_mosaic(frame, &decision.region, self.style)?;
        }
        Ok(())
    }
}

/// Outline each face: green when protected, red otherwise.
pub fn draw_outlines(frame: &mut Frame, decisions: &[FaceDecision]) {
    for decision in decisions {
        let color = if decision.protect {
            PROTECTED_COLOR
        } else {
            TARGET_COLOR
        };
        let region = decision.region;
        for inset in 0..OUTLINE_WIDTH {
            let (width, height) = (
                region.width().saturating_sub(2 * inset),
                region.height().saturating_sub(2 * inset),
            );
            if width == 0 || height == 0 {
                break;
            }
            let rect = Rect::at((region.left() + inset) as i32, (region.top() + inset) as i32)
                .of_size(width, height);
            draw_hollow_rect_mut(frame, rect, color);
        }
    }
}
