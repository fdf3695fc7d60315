use std::num::NonZeroUsize;

use crate::error::MosaicError;
use crate::pixelate::{check_factor, MosaicStyle};
use crate::selector::DEFAULT_IDENTITY_THRESHOLD;

/// User-facing pixelation coarseness for the image flow, in `[5, 50]`.
///
/// The value is the side of the thumbnail a face is shrunk to before being
/// enlarged again: lower is coarser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PixelationFactor(u32);

impl PixelationFactor {
    /// Smallest accepted factor.
    pub const MIN: u32 = 5;
    /// Largest accepted factor.
    pub const MAX: u32 = 50;
    /// Default factor.
    pub const DEFAULT: PixelationFactor = PixelationFactor(15);

    /// Validate a factor.
    pub fn new(factor: u32) -> Result<Self, MosaicError> {
        if !(Self::MIN..=Self::MAX).contains(&factor) {
            return Err(MosaicError::InvalidPixelation {
                got: factor,
                min: Self::MIN,
                max: Self::MAX,
            });
        }
        Ok(Self(factor))
    }

    /// The raw factor.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for PixelationFactor {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<PixelationFactor> for MosaicStyle {
    fn from(factor: PixelationFactor) -> Self {
        MosaicStyle::Pixelate { factor: factor.0 }
    }
}

/// Keyframe spacing used when none is configured.
pub const DEFAULT_GROUP_SIZE: usize = 3;

/// Codec handed to ffmpeg when none is configured.
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";

/// Settings for the video flow.
///
/// The image flow takes its [`PixelationFactor`] directly in
/// [`crate::ImageSession::commit`].
#[derive(Debug, Clone)]
pub struct MosaicConfig {
    /// Faces closer than this to a known identity stay sharp (video flow).
    pub identity_threshold: f32,

    /// A full detection pass runs on every `group_size`-th frame.
    pub group_size: NonZeroUsize,

    /// Mosaic applied to unknown faces in the video flow.
    pub video_style: MosaicStyle,

    /// ffmpeg video encoder name.
    pub video_codec: String,
}

impl Default for MosaicConfig {
    fn default() -> Self {
        Self {
            identity_threshold: DEFAULT_IDENTITY_THRESHOLD,
            group_size: NonZeroUsize::new(DEFAULT_GROUP_SIZE).unwrap_or(NonZeroUsize::MIN),
            video_style: MosaicStyle::BlockAverage,
            video_codec: DEFAULT_VIDEO_CODEC.to_string(),
        }
    }
}

impl MosaicConfig {
    /// Default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the identity match threshold.
    pub fn set_identity_threshold(mut self, threshold: f32) -> Result<Self, MosaicError> {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(MosaicError::InvalidThreshold(threshold));
        }
        self.identity_threshold = threshold;
        Ok(self)
    }

    /// Set the keyframe spacing. Zero is rejected.
    pub fn set_group_size(mut self, group_size: usize) -> Result<Self, MosaicError> {
        self.group_size = NonZeroUsize::new(group_size).ok_or(MosaicError::InvalidGroupSize)?;
        Ok(self)
    }

    /// Set the video-flow mosaic style. A `Pixelate` factor outside
    /// `1..=MAX_PIXELATE_FACTOR` is rejected.
    pub fn set_video_style(mut self, style: MosaicStyle) -> Result<Self, MosaicError> {
        if let MosaicStyle::Pixelate { factor } = style {
            check_factor(factor)?;
        }
        self.video_style = style;
        Ok(self)
    }

    /// Set the ffmpeg video codec.
    pub fn set_video_codec(mut self, codec: impl Into<String>) -> Self {
        self.video_codec = codec.into();
        self
    }
}
