use std::path::Path;

use facemosaic::{
    convert_video, media, Encoding, ErrorCategory, FaceDetector, FaceEncoder, FaceRegion,
    FfmpegVideo, Frame, FrameProcessor, ImageSession, KnownIdentitySet, MosaicConfig, MosaicError,
    PixelationFactor, TemporalPropagator, VideoInfo, VideoJob,
};
use image::Rgb;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const RED: [u8; 3] = [255, 0, 0];
const BLUE: [u8; 3] = [0, 0, 255];

/// Reports each candidate box that fits in the frame and is not blank at its centre.
struct MockDetector {
    candidates: Vec<FaceRegion>,
}

impl MockDetector {
    fn two_slots() -> Self {
        Self {
            candidates: vec![
                FaceRegion::from_xywh(0, 0, 40, 40).unwrap(),
                FaceRegion::from_xywh(60, 0, 40, 40).unwrap(),
            ],
        }
    }
}

impl FaceDetector for MockDetector {
    fn locate_faces(&self, frame: &Frame) -> Vec<FaceRegion> {
        self.candidates
            .iter()
            .filter(|r| r.right() <= frame.width() && r.bottom() <= frame.height())
            .filter(|r| {
                let (cx, cy) = (r.left() + r.width() / 2, r.top() + r.height() / 2);
                *frame.get_pixel(cx, cy) != WHITE
            })
            .copied()
            .collect()
    }
}

/// Encodes a face as its mean colour.
struct MeanColorEncoder;

impl FaceEncoder for MeanColorEncoder {
    fn encode_faces(&self, frame: &Frame, regions: &[FaceRegion]) -> Vec<Encoding> {
        regions
            .iter()
            .map(|r| {
                let mut sums = [0f32; 3];
                for y in r.top()..r.bottom() {
                    for x in r.left()..r.right() {
                        for (sum, v) in sums.iter_mut().zip(frame.get_pixel(x, y).0) {
                            *sum += v as f32;
                        }
                    }
                }
                let n = (r.width() * r.height()) as f32 * 255.0;
                Encoding::new(sums.iter().map(|s| s / n).collect())
            })
            .collect()
    }
}

fn paint_face(frame: &mut Frame, left: u32, base: [u8; 3]) {
    for y in 0..40 {
        for x in left..left + 40 {
            // alternate full and dimmed pixels so a mosaic is visible
            let dim = (x + y) % 2 == 1;
            let pixel = base.map(|c| if dim { c / 4 * 3 } else { c });
            frame.put_pixel(x, y, Rgb(pixel));
        }
    }
}

fn scene() -> Frame {
    let mut frame = Frame::from_pixel(100, 40, WHITE);
    paint_face(&mut frame, 0, RED);
    paint_face(&mut frame, 60, BLUE);
    frame
}

fn portrait(base: [u8; 3]) -> Frame {
    let mut frame = Frame::from_pixel(40, 40, WHITE);
    paint_face(&mut frame, 0, base);
    frame
}

fn face_pixels(frame: &Frame, left: u32) -> Frame {
    image::imageops::crop_imm(frame, left, 0, 40, 40).to_image()
}

fn processor() -> FrameProcessor {
    FrameProcessor::new(Box::new(MockDetector::two_slots()), Box::new(MeanColorEncoder))
}

fn reference_folder(faces: &[(&str, Frame)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, frame) in faces {
        media::save_image(frame, &dir.path().join(name)).unwrap();
    }
    dir
}

#[test]
fn known_faces_stay_sharp_across_a_sequence() {
    let refs = reference_folder(&[("alice.png", portrait(RED))]);
    let processor = processor();
    let known = KnownIdentitySet::from_folder(
        refs.path(),
        processor.detector(),
        processor.encoder(),
    )
    .unwrap();
    assert_eq!(known.len(), 1);

    let frames = vec![scene(); 6];
    let (out, stats) = TemporalPropagator::new(&processor)
        .process(frames, &known)
        .unwrap();

    assert_eq!(stats.keyframes, 2);
    assert_eq!(stats.reused, 4);
    let original = scene();
    for frame in &out {
        assert_eq!(face_pixels(frame, 0), face_pixels(&original, 0));
        assert_ne!(face_pixels(frame, 60), face_pixels(&original, 60));
        // background between the faces is untouched
        assert_eq!(frame.get_pixel(50, 20), &WHITE);
    }
}

#[test]
fn everyone_is_mosaiced_without_a_match() {
    let refs = reference_folder(&[("carol.png", portrait([0, 200, 0]))]);
    let processor = processor();
    let known =
        KnownIdentitySet::from_folder(refs.path(), processor.detector(), processor.encoder())
            .unwrap();

    let result = processor.process(scene(), Some(&known)).unwrap();
    assert_eq!(result.decisions.len(), 2);
    assert!(result.decisions.iter().all(|d| !d.protect));
    assert_ne!(face_pixels(&result.frame, 0), face_pixels(&scene(), 0));
}

#[test]
fn empty_reference_folder_is_an_identity_error() {
    let refs = tempfile::tempdir().unwrap();
    let processor = processor();
    let err = KnownIdentitySet::from_folder(refs.path(), processor.detector(), processor.encoder())
        .unwrap_err();
    assert!(matches!(err, MosaicError::EmptyIdentitySet(_)));
    assert_eq!(err.category(), ErrorCategory::Identity);
}

#[test]
fn reference_with_two_faces_names_the_file() {
    let refs = reference_folder(&[("alice.png", portrait(RED)), ("group.png", scene())]);
    let processor = processor();
    let err = KnownIdentitySet::from_folder(refs.path(), processor.detector(), processor.encoder())
        .unwrap_err();
    match err {
        MosaicError::ReferenceFaceCount { path, found } => {
            assert!(path.ends_with("group.png"));
            assert_eq!(found, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn reference_without_a_face_is_rejected() {
    let blank = Frame::from_pixel(40, 40, WHITE);
    let refs = reference_folder(&[("blank.png", blank)]);
    let processor = processor();
    let err = KnownIdentitySet::from_folder(refs.path(), processor.detector(), processor.encoder())
        .unwrap_err();
    assert!(matches!(err, MosaicError::ReferenceFaceCount { found: 0, .. }));
}

#[test]
fn non_image_in_reference_folder_is_rejected() {
    let refs = reference_folder(&[("alice.png", portrait(RED))]);
    std::fs::write(refs.path().join("notes.txt"), "not a face").unwrap();
    let processor = processor();
    let err = KnownIdentitySet::from_folder(refs.path(), processor.detector(), processor.encoder())
        .unwrap_err();
    assert!(matches!(err, MosaicError::UnsupportedExtension(_)));
}

#[test]
fn reference_subfolders_are_skipped() {
    let refs = reference_folder(&[("alice.png", portrait(RED))]);
    std::fs::create_dir(refs.path().join("old")).unwrap();
    let processor = processor();
    let known =
        KnownIdentitySet::from_folder(refs.path(), processor.detector(), processor.encoder())
            .unwrap();
    assert_eq!(known.len(), 1);
    assert!(known.sources()[0].ends_with("alice.png"));
}

#[test]
fn image_session_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scene.png");
    let output = dir.path().join("scene_mosaic.png");
    media::save_image(&scene(), &input).unwrap();

    let mut session = ImageSession::new(Box::new(MockDetector::two_slots()));
    session.load(&input).unwrap();
    assert_eq!(session.detect().unwrap().len(), 2);

    // keep the blue face on the right
    assert_eq!(session.toggle_at(80.0, 20.0), Some(1));
    session.commit(PixelationFactor::new(5).unwrap()).unwrap();
    session.save(&output).unwrap();

    let saved = media::load_image(&output).unwrap();
    assert_eq!(saved.dimensions(), (100, 40));
    assert_eq!(face_pixels(&saved, 60), face_pixels(&scene(), 60));
    assert_ne!(face_pixels(&saved, 0), face_pixels(&scene(), 0));
}

#[test]
fn image_session_double_toggle_restores_selection() {
    let mut session = ImageSession::new(Box::new(MockDetector::two_slots()));
    session.load_frame(scene());
    session.detect().unwrap();

    session.toggle_at(10.0, 10.0);
    session.toggle_at(10.0, 10.0);
    assert!(session.selector().is_empty());

    // a click between faces hits nothing
    assert_eq!(session.toggle_at(50.0, 20.0), None);
}

#[test]
fn session_without_faces_saves_unchanged_image() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("empty.png");
    let blank = Frame::from_pixel(100, 40, WHITE);

    let mut session = ImageSession::new(Box::new(MockDetector::two_slots()));
    session.load_frame(blank.clone());
    assert!(session.detect().unwrap().is_empty());
    session.commit(PixelationFactor::default()).unwrap();
    session.save(&output).unwrap();
    assert_eq!(media::load_image(&output).unwrap(), blank);
}

#[test]
#[ignore = "requires ffmpeg and ffprobe on PATH"]
fn convert_video_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let refs = reference_folder(&[("alice.png", portrait(RED))]);
    let input = dir.path().join("input.mkv");
    let output = dir.path().join("output.mp4");
    let still = dir.path().join("first_frame.png");

    let video = FfmpegVideo::default();
    let frames = vec![scene(); 6];
    video
        .write_video(&frames, &VideoInfo::new(100, 40, 12.0), &input, "libx264")
        .unwrap();

    let job = VideoJob::new()
        .set_input(&input)
        .set_references(refs.path())
        .set_output(&output)
        .set_first_frame(&still);
    let report = convert_video(&job, &processor(), &MosaicConfig::new(), &video).unwrap();

    assert_eq!(report.frames, 6);
    assert_eq!(report.keyframes, 2);
    assert_eq!(report.identities, 1);
    assert!(Path::new(&report.output).exists());
    assert_eq!(media::load_image(&still).unwrap().dimensions(), (100, 40));
}
