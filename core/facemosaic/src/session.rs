use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::PixelationFactor;
use crate::error::MosaicError;
use crate::face_detector::FaceDetector;
use crate::media;
use crate::pixelate::pixelate;
use crate::processor::draw_outlines;
use crate::region::{sort_left_to_right, FaceDecision, FaceRegion};
use crate::selector::ManualSelector;
use crate::Frame;

/// Interactive still-image flow: load, detect, pick faces to keep, mosaic
/// the rest, save.
///
/// A failed operation leaves the session exactly as it was.
pub struct ImageSession {
    detector: Box<dyn FaceDetector>,
    source: Option<Frame>,
    source_path: Option<PathBuf>,
    regions: Vec<FaceRegion>,
    selector: ManualSelector,
    mosaiced: Option<Frame>,
}

impl ImageSession {
    /// Empty session using `detector`.
    pub fn new(detector: Box<dyn FaceDetector>) -> Self {
        Self {
            detector,
            source: None,
            source_path: None,
            regions: Vec::new(),
            selector: ManualSelector::new(),
            mosaiced: None,
        }
    }

    /// Load an image file, replacing any previous state.
    pub fn load(&mut self, path: &Path) -> Result<(), MosaicError> {
        let frame = media::load_image(path)?;
        self.reset_with(frame);
        self.source_path = Some(path.to_path_buf());
        info!(path = %path.display(), "image loaded");
        Ok(())
    }

    /// Use an in-memory frame, replacing any previous state.
    pub fn load_frame(&mut self, frame: Frame) {
        self.reset_with(frame);
    }

    fn reset_with(&mut self, frame: Frame) {
        self.clear();
        self.source = Some(frame);
    }

    /// Run detection on the loaded image. Faces are ordered left to right
    /// and the selection starts empty.
    pub fn detect(&mut self) -> Result<&[FaceRegion], MosaicError> {
        let source = self.source.as_ref().ok_or(MosaicError::NoImageLoaded)?;
        let mut regions = self.detector.locate_faces(source);
        sort_left_to_right(&mut regions);
        info!(faces = regions.len(), "faces detected");

        self.regions = regions;
        self.selector.clear();
        self.mosaiced = None;
        Ok(&self.regions)
    }

    /// Toggle protection of the face under image coordinates `(x, y)`.
    pub fn toggle_at(&mut self, x: f64, y: f64) -> Option<usize> {
        let hit = self.selector.toggle_at(&self.regions, x, y);
        if let Some(index) = hit {
            debug!(
                index,
                protected = self.selector.is_protected(&self.regions[index]),
                "toggled face"
            );
        }
        hit
    }

    /// Toggle from a click on a preview scaled to `display` (width, height).
    ///
    /// The point is mapped back by the per-axis ratio of original to
    /// displayed size.
    pub fn toggle_at_display(&mut self, x: f64, y: f64, display: (u32, u32)) -> Option<usize> {
        let source = self.source.as_ref()?;
        let (display_w, display_h) = display;
        if display_w == 0 || display_h == 0 {
            return None;
        }
        let scale_x = f64::from(source.width()) / f64::from(display_w);
        let scale_y = f64::from(source.height()) / f64::from(display_h);
        self.toggle_at(x * scale_x, y * scale_y)
    }

    /// Protect or unprotect a face by its index in [`regions`](Self::regions).
    pub fn toggle_index(&mut self, index: usize) -> bool {
        match self.regions.get(index) {
            Some(region) => {
                self.selector.toggle(region);
                true
            }
            None => false,
        }
    }

    /// Current decision for every detected face.
    pub fn decisions(&self) -> Vec<FaceDecision> {
        self.selector.decisions(&self.regions)
    }

    /// Source image with green (kept) and red (to mosaic) outlines.
    pub fn preview(&self) -> Result<Frame, MosaicError> {
        let mut frame = self.source.clone().ok_or(MosaicError::NoImageLoaded)?;
        draw_outlines(&mut frame, &self.decisions());
        Ok(frame)
    }

    /// Pixelate every unprotected face on a fresh copy of the source.
    ///
    /// Committing again starts from the source, so effects never stack.
    pub fn commit(&mut self, factor: PixelationFactor) -> Result<&Frame, MosaicError> {
        let mut frame = self.source.clone().ok_or(MosaicError::NoImageLoaded)?;
        let mut applied = 0;
        for decision in self.decisions().iter().filter(|d| !d.protect) {
            if pixelate(&mut frame, &decision.region, factor.get())? {
                applied += 1;
            }
        }
        info!(applied, factor = factor.get(), "mosaic committed");
        Ok(&*self.mosaiced.insert(frame))
    }

    /// Write the committed image; the format follows the extension.
    pub fn save(&self, path: &Path) -> Result<(), MosaicError> {
        let frame = self.mosaiced.as_ref().ok_or(MosaicError::NothingToSave)?;
        media::save_image(frame, path)?;
        info!(path = %path.display(), "mosaic saved");
        Ok(())
    }

    /// Drop the image, detections, selection and result.
    pub fn clear(&mut self) {
        self.source = None;
        self.source_path = None;
        self.regions.clear();
        self.selector.clear();
        self.mosaiced = None;
    }

    /// The loaded image.
    pub fn source(&self) -> Option<&Frame> {
        self.source.as_ref()
    }

    /// Where the loaded image came from, if it was read from disk.
    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Detected faces, left to right.
    pub fn regions(&self) -> &[FaceRegion] {
        &self.regions
    }

    /// The manual selection.
    pub fn selector(&self) -> &ManualSelector {
        &self.selector
    }

    /// The committed result.
    pub fn mosaiced(&self) -> Option<&Frame> {
        self.mosaiced.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{PROTECTED_COLOR, TARGET_COLOR};

    struct FixedDetector(Vec<FaceRegion>);

    impl FaceDetector for FixedDetector {
        fn locate_faces(&self, _frame: &Frame) -> Vec<FaceRegion> {
            self.0.clone()
        }
    }

    fn session() -> ImageSession {
        ImageSession::new(Box::new(FixedDetector(vec![
            FaceRegion::from_xywh(100, 20, 50, 50).unwrap(),
            FaceRegion::from_xywh(10, 20, 50, 50).unwrap(),
        ])))
    }

    fn textured() -> Frame {
        let mut img = Frame::new(200, 100);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = image::Rgb([(x * 7 % 256) as u8, (y * 11 % 256) as u8, ((x + y) % 256) as u8]);
        }
        img
    }

    #[test]
    fn operations_need_an_image() {
        let mut s = session();
        assert!(matches!(s.detect(), Err(MosaicError::NoImageLoaded)));
        assert!(matches!(s.preview(), Err(MosaicError::NoImageLoaded)));
        assert!(matches!(
            s.commit(PixelationFactor::default()),
            Err(MosaicError::NoImageLoaded)
        ));
        assert!(matches!(
            s.save(Path::new("out.png")),
            Err(MosaicError::NothingToSave)
        ));
        assert_eq!(s.toggle_at_display(1.0, 1.0, (10, 10)), None);
    }

    #[test]
    fn detect_sorts_and_resets_selection() {
        let mut s = session();
        s.load_frame(textured());
        s.detect().unwrap();
        assert_eq!(s.regions()[0].left(), 10);
        assert_eq!(s.toggle_at(30.0, 40.0), Some(0));
        assert_eq!(s.selector().len(), 1);
        s.detect().unwrap();
        assert!(s.selector().is_empty());
    }

    #[test]
    fn commit_keeps_protected_faces_sharp() {
        let original = textured();
        let mut s = session();
        s.load_frame(original.clone());
        s.detect().unwrap();
        s.toggle_at(120.0, 40.0);

        let result = s.commit(PixelationFactor::new(5).unwrap()).unwrap().clone();
        assert_eq!(result.get_pixel(120, 40), original.get_pixel(120, 40));
        assert_ne!(
            image::imageops::crop_imm(&result, 10, 20, 50, 50).to_image(),
            image::imageops::crop_imm(&original, 10, 20, 50, 50).to_image()
        );
        assert_eq!(result.get_pixel(5, 5), original.get_pixel(5, 5));
    }

    #[test]
    fn repeated_commits_do_not_compound() {
        let mut s = session();
        s.load_frame(textured());
        s.detect().unwrap();
        let factor = PixelationFactor::new(10).unwrap();
        let first = s.commit(factor).unwrap().clone();
        let second = s.commit(factor).unwrap().clone();
        assert_eq!(first, second);
    }

    #[test]
    fn display_clicks_map_back_to_image() {
        let mut s = session();
        s.load_frame(textured());
        s.detect().unwrap();
        // preview at half size: (60, 20) is (120, 40) in the image
        assert_eq!(s.toggle_at_display(60.0, 20.0, (100, 50)), Some(1));
        assert_eq!(s.toggle_at_display(99.0, 49.0, (100, 50)), None);
        assert_eq!(s.toggle_at_display(1.0, 1.0, (0, 50)), None);
    }

    #[test]
    fn preview_shows_selection_colours() {
        let mut s = session();
        s.load_frame(textured());
        s.detect().unwrap();
        assert!(s.toggle_index(1));
        assert!(!s.toggle_index(5));
        let preview = s.preview().unwrap();
        assert_eq!(*preview.get_pixel(10, 20), TARGET_COLOR);
        assert_eq!(*preview.get_pixel(100, 20), PROTECTED_COLOR);
    }

    #[test]
    fn failed_load_keeps_state() {
        let mut s = session();
        s.load_frame(textured());
        s.detect().unwrap();
        s.commit(PixelationFactor::default()).unwrap();

        assert!(s.load(Path::new("/no/such/image.png")).is_err());
        assert!(s.source().is_some());
        assert_eq!(s.regions().len(), 2);
        assert!(s.mosaiced().is_some());
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("out.png");
        media::save_image(&textured(), &input).unwrap();

        let mut s = session();
        s.load(&input).unwrap();
        assert_eq!(s.source_path(), Some(input.as_path()));
        s.detect().unwrap();
        s.commit(PixelationFactor::default()).unwrap();
        s.save(&output).unwrap();

        let saved = media::load_image(&output).unwrap();
        assert_eq!(Some(&saved), s.mosaiced());

        s.clear();
        assert!(s.source().is_none());
        assert!(s.regions().is_empty());
    }
}
