use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::MosaicConfig;
use crate::error::MosaicError;
use crate::identity::KnownIdentitySet;
use crate::media;
use crate::processor::FrameProcessor;
use crate::propagate::TemporalPropagator;
use crate::video::{is_supported_video, FfmpegVideo};

/// Output file used when a job names none.
pub const DEFAULT_OUTPUT: &str = "result_video.mp4";

/// One identity-driven video conversion.
#[derive(Debug, Clone)]
pub struct VideoJob {
    /// Source video (mp4, avi or mkv).
    pub input: Option<PathBuf>,
    /// Folder of reference images, one face each.
    pub references: Option<PathBuf>,
    /// Destination video.
    pub output: PathBuf,
    /// Where to save the first processed frame as a still, if anywhere.
    pub first_frame: Option<PathBuf>,
}

impl Default for VideoJob {
    fn default() -> Self {
        Self {
            input: None,
            references: None,
            output: PathBuf::from(DEFAULT_OUTPUT),
            first_frame: None,
        }
    }
}

impl VideoJob {
    /// Job writing to [`DEFAULT_OUTPUT`], with no inputs yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the source video.
    pub fn set_input(mut self, path: impl Into<PathBuf>) -> Self {
        self.input = Some(path.into());
        self
    }

    /// Set the reference folder.
    pub fn set_references(mut self, path: impl Into<PathBuf>) -> Self {
        self.references = Some(path.into());
        self
    }

    /// Set the destination video.
    pub fn set_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = path.into();
        self
    }

    /// Also save the first processed frame to `path`.
    pub fn set_first_frame(mut self, path: impl Into<PathBuf>) -> Self {
        self.first_frame = Some(path.into());
        self
    }
}

/// Summary of a finished conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionReport {
    /// Frames written.
    pub frames: usize,
    /// Frames that ran full detection.
    pub keyframes: usize,
    /// Reference identities loaded.
    pub identities: usize,
    /// Frame rate of the source, kept in the output.
    pub fps: f64,
    /// Where the video was written.
    pub output: PathBuf,
}

/// Mosaic every face in `job.input` that matches none of the reference
/// identities, writing the result to `job.output`.
///
/// Frames are streamed from one ffmpeg process to another; only the current
/// frame is held in memory.
pub fn convert_video(
    job: &VideoJob,
    processor: &FrameProcessor,
    config: &MosaicConfig,
    video: &FfmpegVideo,
) -> Result<ConversionReport, MosaicError> {
    let input = job
        .input
        .as_deref()
        .ok_or(MosaicError::MissingInput("video file"))?;
    let references = job
        .references
        .as_deref()
        .ok_or(MosaicError::MissingInput("reference folder"))?;
    if !is_supported_video(input) {
        return Err(MosaicError::UnsupportedExtension(input.to_path_buf()));
    }

    let known = KnownIdentitySet::from_folder(references, processor.detector(), processor.encoder())?;

    let info = video.probe(input)?;
    info!(
        input = %input.display(),
        width = info.width,
        height = info.height,
        fps = info.fps,
        "starting conversion"
    );

    let reader = video.open_reader(input, &info)?;
    let mut writer = video.open_writer(&job.output, &info, &config.video_codec)?;
    let mut propagator = TemporalPropagator::new(processor).group_size(config.group_size);

    for frame in reader {
        let processed = propagator.push(frame?, &known)?;
        if writer.frames_written() == 0 {
            if let Some(path) = &job.first_frame {
                save_first_frame(&processed, path)?;
            }
        }
        writer.write_frame(&processed)?;
    }
    let frames = writer.finish()?;
    let stats = propagator.stats();

    info!(
        output = %job.output.display(),
        frames,
        keyframes = stats.keyframes,
        "conversion finished"
    );
    Ok(ConversionReport {
        frames,
        keyframes: stats.keyframes,
        identities: known.len(),
        fps: info.fps,
        output: job.output.clone(),
    })
}

fn save_first_frame(frame: &crate::Frame, path: &Path) -> Result<(), MosaicError> {
    media::save_image(frame, path)?;
    info!(path = %path.display(), "saved first processed frame");
    Ok(())
}
