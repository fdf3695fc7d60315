//! Still-image load and save.
//!
//! Everything is converted to 8-bit RGB on the way in and written from RGB on
//! the way out, so no channel reordering happens anywhere in the pipeline.

use std::path::Path;

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ImageEncoder, RgbImage, RgbaImage};
use tracing::debug;

use crate::error::MosaicError;
use crate::Frame;

/// JPEG quality used when saving mosaiced images.
pub const JPEG_QUALITY: u8 = 95;

/// Extensions accepted by [`load_image`].
const READABLE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp"];

/// Encoded still-image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Lossless PNG.
    Png,
    /// JPEG at the given quality (1-100).
    Jpeg {
        /// Encoder quality.
        quality: u8,
    },
    /// Uncompressed BMP.
    Bmp,
    /// Lossless WebP.
    Webp,
}

impl OutputFormat {
    /// Pick a format from the path's extension.
    pub fn from_path(path: &Path) -> Result<Self, MosaicError> {
        match extension(path).as_deref() {
            Some("png") => Ok(OutputFormat::Png),
            Some("jpg") | Some("jpeg") => Ok(OutputFormat::Jpeg {
                quality: JPEG_QUALITY,
            }),
            Some("bmp") => Ok(OutputFormat::Bmp),
            Some("webp") => Ok(OutputFormat::Webp),
            _ => Err(MosaicError::UnsupportedExtension(path.to_path_buf())),
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Load an image file as an RGB frame.
///
/// The extension must be one of png, jpg, jpeg, bmp, gif or webp.
/// Transparent pixels are composited over white.
pub fn load_image(path: &Path) -> Result<Frame, MosaicError> {
    match extension(path) {
        Some(ext) if READABLE_EXTENSIONS.contains(&ext.as_str()) => {}
        _ => return Err(MosaicError::UnsupportedExtension(path.to_path_buf())),
    }

    let bytes = std::fs::read(path).map_err(|e| MosaicError::io(path, e))?;
    let frame = decode_image(&bytes)?;
    debug!(path = %path.display(), width = frame.width(), height = frame.height(), "loaded image");
    Ok(frame)
}

/// Decode in-memory image bytes (any format the `image` crate recognises).
pub fn decode_image(input: &[u8]) -> Result<Frame, MosaicError> {
    let decoded =
        image::load_from_memory(input).map_err(|e| MosaicError::DecodeError(e.to_string()))?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(MosaicError::DecodeError("image dimensions are zero".to_string()));
    }
    Ok(match decoded {
        DynamicImage::ImageRgb8(rgb) => rgb,
        other if other.color().has_alpha() => flatten_alpha(&other),
        other => other.to_rgb8(),
    })
}

/// Flatten alpha channel by compositing onto a white background.
pub(crate) fn flatten_alpha(image: &DynamicImage) -> RgbImage {
    let rgba: RgbaImage = image.to_rgba8();
    let (width, height) = (rgba.width(), rgba.height());
    let mut rgb = RgbImage::new(width, height);

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        let inv_alpha = 1.0 - alpha;
        let blend = |c: u8| (c as f32 * alpha + 255.0 * inv_alpha).round() as u8;
        rgb.put_pixel(x, y, image::Rgb([blend(r), blend(g), blend(b)]));
    }

    rgb
}

/// Encode a frame in the given format.
pub fn encode_image(frame: &Frame, format: OutputFormat) -> Result<Vec<u8>, MosaicError> {
    let mut buffer = Vec::new();
    let (width, height) = frame.dimensions();
    let color = image::ExtendedColorType::Rgb8;

    let raw = frame.as_raw();
    let result = match format {
        OutputFormat::Png => PngEncoder::new(&mut buffer).write_image(raw, width, height, color),
        OutputFormat::Jpeg { quality } => {
            JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
                .write_image(raw, width, height, color)
        }
        OutputFormat::Bmp => BmpEncoder::new(&mut buffer).write_image(raw, width, height, color),
        OutputFormat::Webp => {
            WebPEncoder::new_lossless(&mut buffer).write_image(raw, width, height, color)
        }
    };
    result.map_err(|e| MosaicError::EncodeError(e.to_string()))?;

    Ok(buffer)
}

/// Save a frame, choosing the format from the file extension.
pub fn save_image(frame: &Frame, path: &Path) -> Result<(), MosaicError> {
    let format = OutputFormat::from_path(path)?;
    let data = encode_image(frame, format)?;
    std::fs::write(path, data).map_err(|e| MosaicError::io(path, e))?;
    debug!(path = %path.display(), ?format, "saved image");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn make_test_rgb(width: u32, height: u32) -> Frame {
        let mut img = RgbImage::new(width, height);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = image::Rgb([
                (x * 255 / width.max(1)) as u8,
                (y * 255 / height.max(1)) as u8,
                128,
            ]);
        }
        img
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(
            OutputFormat::from_path(Path::new("out.PNG")).unwrap(),
            OutputFormat::Png
        );
        assert_eq!(
            OutputFormat::from_path(Path::new("out.jpeg")).unwrap(),
            OutputFormat::Jpeg { quality: 95 }
        );
        assert!(OutputFormat::from_path(Path::new("out.tiff")).is_err());
        assert!(OutputFormat::from_path(Path::new("out")).is_err());
    }

    #[test]
    fn encode_jpeg_produces_valid_output() {
        let img = make_test_rgb(48, 64);
        let data = encode_image(&img, OutputFormat::Jpeg { quality: 80 }).unwrap();
        assert_eq!(data[0], 0xFF);
        assert_eq!(data[1], 0xD8);
    }

    #[test]
    fn encode_webp_produces_valid_output() {
        let img = make_test_rgb(48, 64);
        let data = encode_image(&img, OutputFormat::Webp).unwrap();
        assert_eq!(&data[0..4], b"RIFF");
        assert_eq!(&data[8..12], b"WEBP");
    }

    #[test]
    fn png_round_trip_keeps_channel_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        let mut img = make_test_rgb(8, 8);
        img.put_pixel(0, 0, image::Rgb([250, 10, 0]));
        save_image(&img, &path).unwrap();

        let loaded = load_image(&path).unwrap();
        assert_eq!(loaded, img);
        assert_eq!(loaded.get_pixel(0, 0), &image::Rgb([250, 10, 0]));
    }

    #[test]
    fn bmp_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.bmp");
        let img = make_test_rgb(9, 7);
        save_image(&img, &path).unwrap();
        assert_eq!(load_image(&path).unwrap(), img);
    }

    #[test]
    fn load_rejects_unknown_extension() {
        let err = load_image(Path::new("clip.mp4")).unwrap_err();
        assert!(matches!(err, MosaicError::UnsupportedExtension(_)));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = load_image(&PathBuf::from("/definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, MosaicError::Io { .. }));
    }

    #[test]
    fn decode_garbage_fails() {
        assert!(matches!(
            decode_image(b"not an image"),
            Err(MosaicError::DecodeError(_))
        ));
    }

    #[test]
    fn flatten_alpha_composites_over_white() {
        let mut rgba = RgbaImage::new(1, 1);
        rgba.put_pixel(0, 0, image::Rgba([255, 0, 0, 0]));
        let dynamic = DynamicImage::ImageRgba8(rgba);
        let rgb = flatten_alpha(&dynamic);
        assert_eq!(rgb.get_pixel(0, 0), &image::Rgb([255, 255, 255]));
    }

    #[test]
    fn flatten_alpha_preserves_opaque() {
        let mut rgba = RgbaImage::new(1, 1);
        rgba.put_pixel(0, 0, image::Rgba([100, 150, 200, 255]));
        let dynamic = DynamicImage::ImageRgba8(rgba);
        let rgb = flatten_alpha(&dynamic);
        assert_eq!(rgb.get_pixel(0, 0), &image::Rgb([100, 150, 200]));
    }
}
