use crate::error::MosaicError;

/// Face bounding box in image coordinates.
///
/// Edges follow the `(top, right, bottom, left)` convention: `left..right`
/// and `top..bottom` are half-open pixel ranges, so the box spans
/// `right - left` columns. Construction rejects empty boxes, and the fields
/// cannot change afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FaceRegion {
    top: u32,
    right: u32,
    bottom: u32,
    left: u32,
}

impl FaceRegion {
    /// Create a region, rejecting boxes with `right <= left` or `bottom <= top`.
    pub fn new(top: u32, right: u32, bottom: u32, left: u32) -> Result<Self, MosaicError> {
        if right <= left || bottom <= top {
            return Err(MosaicError::DegenerateRegion {
                top,
                right,
                bottom,
                left,
            });
        }
        Ok(Self {
            top,
            right,
            bottom,
            left,
        })
    }

    /// Create a region from a top-left corner and a size.
    pub fn from_xywh(x: u32, y: u32, width: u32, height: u32) -> Result<Self, MosaicError> {
        Self::new(
            y,
            x.saturating_add(width),
            y.saturating_add(height),
            x,
        )
    }

    /// Top edge.
    pub fn top(&self) -> u32 {
        self.top
    }

    /// Right edge (exclusive).
    pub fn right(&self) -> u32 {
        self.right
    }

    /// Bottom edge (exclusive).
    pub fn bottom(&self) -> u32 {
        self.bottom
    }

    /// Left edge.
    pub fn left(&self) -> u32 {
        self.left
    }

    /// Width in pixels; always positive.
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    /// Height in pixels; always positive.
    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }

    /// Whether a point lies on or inside the box edges.
    ///
    /// The test is inclusive on all four sides, so a click exactly on the
    /// drawn outline still selects the face.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.left as f64 <= x
            && x <= self.right as f64
            && self.top as f64 <= y
            && y <= self.bottom as f64
    }

    /// Stable identity of this region, independent of its position in a list.
    pub fn key(&self) -> RegionKey {
        RegionKey {
            top: self.top,
            right: self.right,
            bottom: self.bottom,
            left: self.left,
        }
    }

    /// The part of the region that lies inside a `width` × `height` frame.
    ///
    /// The result can be empty when a detector reports a box that hangs off
    /// the frame edge.
    pub fn clamp_to(&self, width: u32, height: u32) -> PixelRect {
        let left = self.left.min(width);
        let right = self.right.min(width);
        let top = self.top.min(height);
        let bottom = self.bottom.min(height);
        PixelRect {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        }
    }
}

/// Key used to remember per-face choices across redraws.
///
/// Two detections with identical coordinates share a key, which is what a
/// re-run of the same detector on the same image produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionKey {
    top: u32,
    right: u32,
    bottom: u32,
    left: u32,
}

/// Frame-clamped rectangle actually touched by a filter. May be empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    /// Left column.
    pub x: u32,
    /// Top row.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl PixelRect {
    /// True when the rectangle covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A face region together with whether it stays sharp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceDecision {
    /// The detected face.
    pub region: FaceRegion,
    /// `true` leaves the face untouched, `false` mosaics it.
    pub protect: bool,
}

/// Order regions left to right by their `left` edge.
///
/// The sort is stable so faces sharing a left edge keep the detector's order.
pub fn sort_left_to_right(regions: &mut [FaceRegion]) {
    regions.sort_by_key(|region| region.left);
}
