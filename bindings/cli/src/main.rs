use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facemosaic::config::{DEFAULT_GROUP_SIZE, DEFAULT_VIDEO_CODEC};
use facemosaic::{
    convert_video, ArcFaceEncoder, DetectorConfig, EncoderConfig, FfmpegVideo, FrameProcessor,
    IdentityMatcher, ImageSession, MosaicConfig, PixelationFactor, RustfaceDetector, VideoJob,
    ARCFACE_IDENTITY_THRESHOLD, DEFAULT_OUTPUT,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "facemosaic", version, about = "Mosaic faces in photos and videos")]
struct Cli {
    /// SeetaFace frontal model file.
    #[arg(long, global = true, default_value = "model/seeta_fd_frontal_v1.0.bin")]
    model: PathBuf,

    /// Smallest face, in pixels, the detector reports.
    #[arg(long, global = true, default_value_t = 20)]
    min_face_size: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the faces found in an image, left to right.
    Detect {
        image: PathBuf,

        /// Write the image with every face outlined.
        #[arg(long)]
        preview: Option<PathBuf>,
    },

    /// Pixelate every face in an image except the protected ones.
    Image {
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Index (as printed by `detect`) of a face to keep sharp. Repeatable.
        #[arg(long = "protect")]
        protect: Vec<usize>,

        /// Thumbnail side each face is shrunk to; lower is coarser (5-50).
        #[arg(long, default_value_t = PixelationFactor::DEFAULT.get())]
        pixelation: u32,
    },

    /// Mosaic everyone in a video who is not in the reference folder.
    Video {
        input: PathBuf,

        /// Folder of reference photos, one face each.
        #[arg(long)]
        references: PathBuf,

        /// ArcFace ONNX model used to tell people apart.
        #[arg(long)]
        encoder_model: PathBuf,

        #[arg(short, long, default_value = DEFAULT_OUTPUT)]
        output: PathBuf,

        /// Run full detection on every N-th frame.
        #[arg(long, default_value_t = DEFAULT_GROUP_SIZE)]
        group_size: usize,

        /// Faces closer than this to a reference stay sharp
        /// [default: the encoder's calibrated threshold].
        #[arg(long)]
        threshold: Option<f32>,

        /// ffmpeg video encoder.
        #[arg(long, default_value = DEFAULT_VIDEO_CODEC)]
        codec: String,

        /// Also save the first processed frame as an image.
        #[arg(long)]
        first_frame: Option<PathBuf>,

        /// ffmpeg binary.
        #[arg(long, default_value = "ffmpeg")]
        ffmpeg: PathBuf,

        /// ffprobe binary.
        #[arg(long, default_value = "ffprobe")]
        ffprobe: PathBuf,
    },
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let detector_config = DetectorConfig::new()
        .set_model_path(&cli.model)
        .set_min_face_size(cli.min_face_size);
    let detector = RustfaceDetector::new(detector_config)
        .with_context(|| format!("loading detector model {}", cli.model.display()))?;

    match cli.command {
        Command::Detect { image, preview } => {
            let mut session = ImageSession::new(Box::new(detector));
            session.load(&image)?;
            let regions = session.detect()?;
            if regions.is_empty() {
                println!("no faces found");
            }
            for (index, region) in regions.iter().enumerate() {
                println!(
                    "{index}: left={} top={} right={} bottom={}",
                    region.left(),
                    region.top(),
                    region.right(),
                    region.bottom()
                );
            }
            if let Some(path) = preview {
                facemosaic::media::save_image(&session.preview()?, &path)?;
                info!(path = %path.display(), "preview written");
            }
        }

        Command::Image {
            input,
            output,
            protect,
            pixelation,
        } => {
            let factor = PixelationFactor::new(pixelation)?;
            let mut session = ImageSession::new(Box::new(detector));
            session.load(&input)?;
            let found = session.detect()?.len();
            for index in protect {
                if !session.toggle_index(index) {
                    bail!("no face with index {index}; {found} detected");
                }
            }
            session.commit(factor)?;
            session.save(&output)?;
            println!(
                "mosaiced {} of {found} faces -> {}",
                found - session.selector().len(),
                output.display()
            );
        }

        Command::Video {
            input,
            references,
            encoder_model,
            output,
            group_size,
            threshold,
            codec,
            first_frame,
            ffmpeg,
            ffprobe,
        } => {
            let config = MosaicConfig::new()
                .set_group_size(group_size)?
                .set_video_codec(codec);
            let encoder = ArcFaceEncoder::new(EncoderConfig::new().set_model_path(&encoder_model))
                .with_context(|| format!("loading encoder model {}", encoder_model.display()))?;
            let matcher = IdentityMatcher::for_encoder(&encoder, threshold)?;
            info!(
                threshold = matcher.current_threshold(),
                calibrated = ARCFACE_IDENTITY_THRESHOLD,
                "identity matching"
            );
            let processor = FrameProcessor::new(Box::new(detector), Box::new(encoder))
                .matcher(matcher)
                .style(config.video_style);
            let video = FfmpegVideo::new(ffmpeg, ffprobe);
            let version = video.version()?;
            info!(%version, "using ffmpeg");

            let mut job = VideoJob::new()
                .set_input(input)
                .set_references(references)
                .set_output(output);
            if let Some(path) = first_frame {
                job = job.set_first_frame(path);
            }

            let report = convert_video(&job, &processor, &config, &video)?;
            println!(
                "{} frames ({} keyframes, {} known identities) at {:.2} fps -> {}",
                report.frames,
                report.keyframes,
                report.identities,
                report.fps,
                report.output.display()
            );
        }
    }

    Ok(())
}
