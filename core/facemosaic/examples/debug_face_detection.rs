//! Run the built-in detector over images and print what it finds.
//!
//! Usage:
//!   cargo run --example debug_face_detection -- <model.bin> <image>...
//!
//! For each image an `<name>.faces.png` with the regions outlined is written
//! next to the input.

use std::path::{Path, PathBuf};

use facemosaic::{
    draw_outlines, media, DetectorConfig, FaceDecision, FaceDetector, RustfaceDetector,
};

fn main() {
    let mut args = std::env::args().skip(1);
    let model = args
        .next()
        .expect("usage: debug_face_detection <model.bin> <image>...");
    let detector = RustfaceDetector::new(DetectorConfig::new().set_model_path(model))
        .expect("failed to load model");

    for input in args {
        let path = Path::new(&input);
        let mut frame = media::load_image(path).unwrap();
        println!("=== {input} ({}x{}) ===", frame.width(), frame.height());

        let faces = detector.locate_faces(&frame);
        if faces.is_empty() {
            println!("  NO FACES DETECTED");
            continue;
        }

        println!("  Found {} face(s):", faces.len());
        for (i, face) in faces.iter().enumerate() {
            println!(
                "    face {i}: ({}, {}) {}x{}, block-average window {} px",
                face.left(),
                face.top(),
                face.width(),
                face.height(),
                (face.width() / 20).max(1),
            );
        }

        let decisions: Vec<FaceDecision> = faces
            .into_iter()
            .map(|region| FaceDecision {
                region,
                protect: false,
            })
            .collect();
        draw_outlines(&mut frame, &decisions);

        let out = outlined_path(path);
        media::save_image(&frame, &out).unwrap();
        println!("  → {}", out.display());
        println!();
    }
}

fn outlined_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    input.with_file_name(format!("{stem}.faces.png"))
}
