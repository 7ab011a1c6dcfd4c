mod capture;
mod config;
mod error;
mod media;
mod output;
mod pipeline;
mod prompt;
mod segmentation;
mod visualize;

use anyhow::{Context, Result};
use capture::{FrameSource, VideoFileSource, WebcamSource};
use clap::{Parser, Subcommand};
use config::{Device, ModelConfig, ModelVersion};
use output::{FrameSink, LoopbackSink, VideoFileSink};
use pipeline::{ImageSettings, VideoSettings};
use prompt::PromptSource;
use segmentation::{PointPrompt, PredictOptions, PromptSegmenter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use visualize::ViewMode;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Segment a single image
    Image(ImageArgs),
    /// Segment every frame of a video or webcam stream with prompts from the first frame
    Video(VideoArgs),
}

#[derive(clap::Args, Debug)]
struct ModelArgs {
    /// Model configuration file (TOML); takes precedence over --model and --checkpoint-dir
    #[arg(long)]
    config: Option<PathBuf>,

    /// Model generation to load from --checkpoint-dir
    #[arg(long, value_enum, default_value_t = ModelVersion::V2)]
    model: ModelVersion,

    /// Directory holding the exported encoder/decoder graphs
    #[arg(long, default_value = "checkpoints")]
    checkpoint_dir: PathBuf,

    /// ONNX Runtime execution provider
    #[arg(long, value_enum, default_value_t = Device::Cpu)]
    device: Device,

    /// Let the decoder propose several masks and keep the best scored one
    #[arg(long)]
    multimask: bool,

    /// Point prompt as X,Y or X,Y,LABEL (1 foreground, 0 background); skips the click window
    #[arg(long = "point", value_parser = prompt::parse_point)]
    points: Vec<PointPrompt>,

    /// Ask for each point's label on the terminal after selection
    #[arg(long)]
    ask_labels: bool,
}

#[derive(clap::Args, Debug)]
struct ImageArgs {
    /// Image to segment
    image: PathBuf,

    #[command(flatten)]
    model: ModelArgs,

    /// How the result is rendered
    #[arg(long, value_enum, default_value_t = ViewMode::Mask)]
    view: ViewMode,

    /// Save the rendered result
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Save the raw mask as a black and white image
    #[arg(long)]
    mask_output: Option<PathBuf>,

    /// Do not open a window with the result
    #[arg(long)]
    no_display: bool,
}

#[derive(clap::Args, Debug)]
struct VideoArgs {
    /// Video file to segment
    #[arg(required_unless_present = "webcam")]
    input: Option<PathBuf>,

    /// Read from this webcam index instead of a file
    #[arg(long, conflicts_with = "input")]
    webcam: Option<u32>,

    /// Webcam capture width
    #[arg(long, default_value_t = 1280)]
    capture_width: u32,

    /// Webcam capture height
    #[arg(long, default_value_t = 720)]
    capture_height: u32,

    /// Webcam frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    #[command(flatten)]
    model: ModelArgs,

    /// How each frame is rendered
    #[arg(long, value_enum, default_value_t = ViewMode::Overlay)]
    view: ViewMode,

    /// Output video file (MPEG-4)
    #[arg(short, long, default_value = "output_video.mp4")]
    output: PathBuf,

    /// Stream to a v4l2loopback device instead of writing a file
    #[arg(long)]
    loopback: Option<PathBuf>,

    /// Show frames while processing; press 'q' to stop
    #[arg(long)]
    preview: bool,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("clickmask starting");

    match args.command {
        Command::Image(args) => run_image(args),
        Command::Video(args) => run_video(args),
    }
}

fn load_model(args: &ModelArgs) -> Result<Box<dyn PromptSegmenter>> {
    let config = match &args.config {
        Some(path) => ModelConfig::load(path)?,
        None => {
            let config = ModelConfig::preset(args.model, &args.checkpoint_dir);
            config.validate()?;
            config
        }
    };

    tracing::info!(
        "Loading {:?} model from {} and {}",
        config.version,
        config.encoder.display(),
        config.decoder.display()
    );
    let model = segmentation::create_model(&config, args.device)
        .context("Failed to load segmentation model")?;
    tracing::info!(
        "Segmentation model {:?} loaded ({}px input)",
        model.version(),
        model.input_size()
    );

    Ok(model)
}

fn prompt_source(args: &ModelArgs) -> PromptSource {
    PromptSource {
        points: args.points.clone(),
        ask_labels: args.ask_labels,
    }
}

fn predict_options(args: &ModelArgs) -> PredictOptions {
    PredictOptions {
        multimask: args.multimask,
    }
}

fn run_image(args: ImageArgs) -> Result<()> {
    let mut model = load_model(&args.model)?;

    let image = media::load_image(&args.image)?;
    let prompts = prompt_source(&args.model).collect(&image, "Select points")?;

    let settings = ImageSettings {
        options: predict_options(&args.model),
        view: args.view,
        output: args.output,
        mask_output: args.mask_output,
        display: !args.no_display,
    };

    pipeline::run_image(model.as_mut(), &image, &prompts, &settings)?;
    Ok(())
}

fn run_video(args: VideoArgs) -> Result<()> {
    let mut model = load_model(&args.model)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupt_flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        interrupt_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to install Ctrl+C handler")?;

    match (&args.input, args.webcam) {
        (Some(path), _) => {
            let mut source = VideoFileSource::open(path)?;
            process_stream(&mut source, model.as_mut(), &args, interrupted)
        }
        (None, Some(index)) => {
            let mut source =
                WebcamSource::new(index, args.capture_width, args.capture_height, args.fps)?;
            tracing::info!("Press Ctrl+C to stop recording");
            process_stream(&mut source, model.as_mut(), &args, interrupted)
        }
        (None, None) => anyhow::bail!("Either a video file or --webcam is required"),
    }
}

fn process_stream<S: FrameSource>(
    source: &mut S,
    model: &mut dyn PromptSegmenter,
    args: &VideoArgs,
    interrupted: Arc<AtomicBool>,
) -> Result<()> {
    let first_frame = pipeline::first_frame(source)?;
    let (width, height) = first_frame.dimensions();

    let prompts = prompt_source(&args.model).collect(&first_frame, "Select points")?;

    let settings = VideoSettings {
        options: predict_options(&args.model),
        view: args.view,
        preview: args.preview,
        max_frames: args.max_frames,
        interrupted,
    };

    match &args.loopback {
        Some(device) => {
            let mut sink = LoopbackSink::new(device, width, height)?;
            tracing::info!("Output resolution {:?}", sink.resolution());
            pipeline::run_video(source, &mut sink, model, first_frame, &prompts, &settings)?;
            tracing::info!("Video processing complete. Streamed to {}.", device.display());
        }
        None => {
            let mut sink = VideoFileSink::create(&args.output, width, height, source.fps())?;
            tracing::info!("Output resolution {:?}", sink.resolution());
            pipeline::run_video(source, &mut sink, model, first_frame, &prompts, &settings)?;
            tracing::info!("Video processing complete. Saved to {}.", args.output.display());
        }
    }

    Ok(())
}
