use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::MosaicError;
use crate::face_detector::{Encoding, FaceDetector, FaceEncoder};
use crate::media;

/// Encodings of the people whose faces stay sharp in identity mode.
///
/// Built once per run and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct KnownIdentitySet {
    encodings: Vec<Encoding>,
    sources: Vec<PathBuf>,
}

impl KnownIdentitySet {
    /// Wrap precomputed encodings.
    pub fn from_encodings(encodings: Vec<Encoding>) -> Self {
        Self {
            encodings,
            sources: Vec::new(),
        }
    }

    /// Build the set from a flat folder of reference photos.
    ///
    /// Files are visited in file-name order and subdirectories are ignored.
    /// Every file must decode as an image showing exactly one face; the
    /// first file that does not aborts the whole build with an error naming
    /// it. A folder without files is an error as well.
    pub fn from_folder(
        folder: &Path,
        detector: &dyn FaceDetector,
        encoder: &dyn FaceEncoder,
    ) -> Result<Self, MosaicError> {
        let paths = list_reference_files(folder)?;
        if paths.is_empty() {
            return Err(MosaicError::EmptyIdentitySet(folder.to_path_buf()));
        }

        let mut encodings = Vec::with_capacity(paths.len());
        for path in &paths {
            let frame = media::load_image(path)?;
            let regions = detector.locate_faces(&frame);
            if regions.len() != 1 {
                return Err(MosaicError::ReferenceFaceCount {
                    path: path.clone(),
                    found: regions.len(),
                });
            }

            let encoding = encoder
                .encode_faces(&frame, &regions)
                .into_iter()
                .next()
                .ok_or(MosaicError::EncodingMismatch {
                    expected: 1,
                    got: 0,
                })?;
            debug!(path = %path.display(), features = encoding.len(), "encoded reference face");
            encodings.push(encoding);
        }

        info!(
            folder = %folder.display(),
            identities = encodings.len(),
            "built known identity set"
        );
        Ok(Self {
            encodings,
            sources: paths,
        })
    }

    /// Known encodings in build order.
    pub fn encodings(&self) -> &[Encoding] {
        &self.encodings
    }

    /// Reference files the encodings came from, when built from a folder.
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Number of known identities.
    pub fn len(&self) -> usize {
        self.encodings.len()
    }

    /// True when no identity is known.
    pub fn is_empty(&self) -> bool {
        self.encodings.is_empty()
    }
}

fn list_reference_files(folder: &Path) -> Result<Vec<PathBuf>, MosaicError> {
    let entries = std::fs::read_dir(folder).map_err(|e| MosaicError::io(folder, e))?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| MosaicError::io(folder, e))?;
        let path = entry.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::FaceRegion;
    use crate::Frame;

    /// Reports one face per 10 px of red in the top-left pixel.
    struct RedCountDetector;

    impl FaceDetector for RedCountDetector {
        fn locate_faces(&self, frame: &Frame) -> Vec<FaceRegion> {
            let faces = frame.get_pixel(0, 0).0[0] / 10;
            (0..faces as u32)
                .map(|i| FaceRegion::from_xywh(i * 4, 0, 4, 4).unwrap())
                .collect()
        }
    }

    /// Encodes a face as the green value of the top-left pixel.
    struct GreenEncoder;

    impl FaceEncoder for GreenEncoder {
        fn encode_faces(&self, frame: &Frame, regions: &[FaceRegion]) -> Vec<Encoding> {
            regions
                .iter()
                .map(|_| Encoding::new(vec![frame.get_pixel(0, 0).0[1] as f32]))
                .collect()
        }
    }

    fn write_reference(dir: &Path, name: &str, faces: u8, green: u8) {
        let frame = Frame::from_pixel(16, 16, image::Rgb([faces * 10, green, 0]));
        frame.save(dir.join(name)).unwrap();
    }

    #[test]
    fn builds_in_file_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_reference(dir.path(), "b.png", 1, 20);
        write_reference(dir.path(), "a.png", 1, 10);
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let set = KnownIdentitySet::from_folder(dir.path(), &RedCountDetector, &GreenEncoder)
            .unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.encodings()[0].as_slice(), &[10.0]);
        assert_eq!(set.encodings()[1].as_slice(), &[20.0]);
        assert!(set.sources()[0].ends_with("a.png"));
    }

    #[test]
    fn empty_folder_is_identity_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = KnownIdentitySet::from_folder(dir.path(), &RedCountDetector, &GreenEncoder)
            .unwrap_err();
        assert!(matches!(err, MosaicError::EmptyIdentitySet(_)));
    }

    #[test]
    fn faceless_reference_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        write_reference(dir.path(), "alice.png", 1, 10);
        write_reference(dir.path(), "bob.png", 0, 10);

        let err = KnownIdentitySet::from_folder(dir.path(), &RedCountDetector, &GreenEncoder)
            .unwrap_err();
        match err {
            MosaicError::ReferenceFaceCount { path, found } => {
                assert!(path.ends_with("bob.png"));
                assert_eq!(found, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn crowded_reference_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_reference(dir.path(), "group.png", 2, 10);
        let err = KnownIdentitySet::from_folder(dir.path(), &RedCountDetector, &GreenEncoder)
            .unwrap_err();
        assert!(matches!(err, MosaicError::ReferenceFaceCount { found: 2, .. }));
    }

    #[test]
    fn unreadable_reference_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.png"), b"not an image").unwrap();
        let result = KnownIdentitySet::from_folder(dir.path(), &RedCountDetector, &GreenEncoder);
        assert!(result.is_err());
    }

    #[test]
    fn missing_folder_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = KnownIdentitySet::from_folder(&missing, &RedCountDetector, &GreenEncoder)
            .unwrap_err();
        assert!(matches!(err, MosaicError::Io { .. }));
    }
}
