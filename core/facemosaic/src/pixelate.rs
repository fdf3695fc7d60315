//! Region pixelation filters.
//!
//! Both filters clamp the face region to the frame first and only ever write
//! inside the clamped rectangle.

use image::imageops::{self, FilterType};
use image::Rgb;

use crate::error::MosaicError;
use crate::region::FaceRegion;
use crate::Frame;

/// Block-average window is the region width divided by this.
const BLOCK_DIVISOR: u32 = 20;

/// Largest thumbnail side [`pixelate`] accepts.
pub const MAX_PIXELATE_FACTOR: u32 = 1024;

/// How a non-protected face is obscured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MosaicStyle {
    /// Shrink the face to `factor` × `factor` pixels with linear filtering,
    /// then blow it back up with nearest-neighbour.
    Pixelate {
        /// Side of the intermediate thumbnail; smaller is coarser.
        factor: u32,
    },
    /// Replace square windows (a twentieth of the face width) with their
    /// mean colour.
    #[default]
    BlockAverage,
}

/// Apply `style` to one region. Returns whether any pixel was rewritten.
pub fn apply_mosaic(
    frame: &mut Frame,
    region: &FaceRegion,
    style: MosaicStyle,
) -> Result<bool, MosaicError> {
    match style {
        MosaicStyle::Pixelate { factor } => pixelate(frame, region, factor),
        MosaicStyle::BlockAverage => Ok(block_average(frame, region)),
    }
}

/// Downscale/upscale pixelation of one region, in place.
///
/// Returns `Ok(false)` and leaves the frame untouched when the region has no
/// overlap with the frame. A `factor` of zero or above
/// [`MAX_PIXELATE_FACTOR`] is rejected before anything is allocated.
pub fn pixelate(frame: &mut Frame, region: &FaceRegion, factor: u32) -> Result<bool, MosaicError> {
    check_factor(factor)?;

    let rect = region.clamp_to(frame.width(), frame.height());
    if rect.is_empty() {
        return Ok(false);
    }

    let face = imageops::crop_imm(frame, rect.x, rect.y, rect.width, rect.height).to_image();
    let small = imageops::resize(&face, factor, factor, FilterType::Triangle);
    let blocky = imageops::resize(&small, rect.width, rect.height, FilterType::Nearest);
    imageops::replace(frame, &blocky, i64::from(rect.x), i64::from(rect.y));

    Ok(true)
}

pub(crate) fn check_factor(factor: u32) -> Result<(), MosaicError> {
    if factor == 0 || factor > MAX_PIXELATE_FACTOR {
        return Err(MosaicError::InvalidPixelation {
            got: factor,
            min: 1,
            max: MAX_PIXELATE_FACTOR,
        });
    }
    Ok(())
}

/// Block-average pixelation of one region, in place.
///
/// The window side is `region.width() / 20`, but never below one pixel: a
/// face narrower than 20 px therefore comes out unchanged. Windows are laid
/// from the region's top-left corner and the last row and column may be
/// partial; those are averaged over the pixels they hold.
///
/// A mosaic that only averages the `width / window` whole windows leaves a
/// sharp strip of up to `window - 1` pixels along the right and bottom edges
/// of the face. This one covers that strip as well, so no pixel inside the
/// region keeps its original value unless its window was already uniform.
pub fn block_average(frame: &mut Frame, region: &FaceRegion) -> bool {
    let rect = region.clamp_to(frame.width(), frame.height());
    if rect.is_empty() {
        return false;
    }

    let window = (region.width() / BLOCK_DIVISOR).max(1);
    let x_end = rect.x + rect.width;
    let y_end = rect.y + rect.height;

    for wy in (rect.y..y_end).step_by(window as usize) {
        let wy_end = (wy + window).min(y_end);
        for wx in (rect.x..x_end).step_by(window as usize) {
            let wx_end = (wx + window).min(x_end);

            let mut sums = [0u64; 3];
            for y in wy..wy_end {
                for x in wx..wx_end {
                    let Rgb(px) = *frame.get_pixel(x, y);
                    for (sum, value) in sums.iter_mut().zip(px) {
                        *sum += u64::from(value);
                    }
                }
            }

            let count = u64::from(wx_end - wx) * u64::from(wy_end - wy);
            let mean = Rgb(sums.map(|sum| (sum / count) as u8));
            for y in wy..wy_end {
                for x in wx..wx_end {
                    frame.put_pixel(x, y, mean);
                }
            }
        }
    }

    true
}
