//! Image and video segmentation runs

use crate::capture::FrameSource;
use crate::error::Error;
use crate::output::FrameSink;
use crate::prompt::{close_window, preview_frame, show_until_key};
use crate::segmentation::{Mask, PointPrompt, PredictOptions, PromptSegmenter};
use crate::visualize::{render, ViewMode};
use anyhow::{Context, Result};
use image::RgbImage;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const RESULT_WINDOW: &str = "Segmentation result";
const PREVIEW_WINDOW: &str = "Segmentation preview";

/// Log rolling timings every this many frames
const STATS_INTERVAL: u64 = 30;

/// What to do with a still image prediction
#[derive(Debug, Clone)]
pub struct ImageSettings {
    pub options: PredictOptions,
    pub view: ViewMode,
    /// Save the rendered view here
    pub output: Option<PathBuf>,
    /// Save the raw mask (white on black PNG) here
    pub mask_output: Option<PathBuf>,
    /// Open a window with the rendered view
    pub display: bool,
}

/// Encode `image` and decode a mask for `prompts`
pub fn segment_image(
    model: &mut dyn PromptSegmenter,
    image: &RgbImage,
    prompts: &[PointPrompt],
    options: PredictOptions,
) -> Result<Mask> {
    model
        .set_image(image)
        .context("Failed to compute image embedding")?;

    tracing::info!("Predicting segmentation...");
    let mask = model
        .predict(prompts, options)
        .context("Failed to predict mask")?;
    tracing::info!(
        "Segmentation prediction complete: {} pixels, bbox {:?}",
        mask.area(),
        mask.bounding_box()
    );

    Ok(mask)
}

/// Segment one image and render, save and display the result
pub fn run_image(
    model: &mut dyn PromptSegmenter,
    image: &RgbImage,
    prompts: &[PointPrompt],
    settings: &ImageSettings,
) -> Result<Mask> {
    let mask = segment_image(model, image, prompts, settings.options)?;

    tracing::info!("Visualizing results...");
    let rendered = render(image, &mask, settings.view);

    if let Some(path) = &settings.output {
        rendered
            .save(path)
            .with_context(|| format!("Failed to save result to {}", path.display()))?;
        tracing::info!("Result saved to {}", path.display());
    }

    if let Some(path) = &settings.mask_output {
        mask.to_gray()
            .save(path)
            .with_context(|| format!("Failed to save mask to {}", path.display()))?;
        tracing::info!("Mask saved to {}", path.display());
    }

    if settings.display {
        show_until_key(RESULT_WINDOW, &rendered)?;
    }

    Ok(mask)
}

/// What to do with each video frame
#[derive(Debug, Clone)]
pub struct VideoSettings {
    pub options: PredictOptions,
    pub view: ViewMode,
    /// Show every rendered frame; `q` stops the run early
    pub preview: bool,
    /// Stop after this many frames
    pub max_frames: Option<u64>,
    /// Set from the Ctrl+C handler; the loop stops and the sink is still finalized
    pub interrupted: Arc<AtomicBool>,
}

/// Read the frame the prompts are collected on
pub fn first_frame<S: FrameSource>(source: &mut S) -> Result<RgbImage> {
    let frame = source.next_frame()?.ok_or(Error::VideoRead)?;
    let (width, height) = frame.dimensions();
    tracing::info!(
        "Source reports {:?}, first frame is {}x{}",
        source.resolution(),
        width,
        height
    );
    Ok(frame)
}

/// Segment every frame of a stream with a fixed prompt set
///
/// `first_frame` is the frame the prompts were collected on; it is processed
/// like every other frame. Returns the number of frames written.
pub fn run_video<S, O>(
    source: &mut S,
    sink: &mut O,
    model: &mut dyn PromptSegmenter,
    first_frame: RgbImage,
    prompts: &[PointPrompt],
    settings: &VideoSettings,
) -> Result<u64>
where
    S: FrameSource,
    O: FrameSink,
{
    let mut frame_count = 0u64;
    let mut total_encode_time = Duration::ZERO;
    let mut total_decode_time = Duration::ZERO;
    let mut total_output_time = Duration::ZERO;

    tracing::info!("Starting video segmentation with {} point(s)", prompts.len());

    let mut next = Some(first_frame);
    while let Some(frame) = next {
        if settings.interrupted.load(Ordering::SeqCst) {
            tracing::info!("Interrupted after {} frames", frame_count);
            break;
        }

        if settings.max_frames.is_some_and(|max| frame_count >= max) {
            tracing::info!("Reached frame limit of {}", frame_count);
            break;
        }

        frame_count += 1;
        tracing::debug!("Processing frame {}...", frame_count);

        let encode_start = Instant::now();
        model
            .set_image(&frame)
            .with_context(|| format!("Failed to encode frame {}", frame_count))?;
        total_encode_time += encode_start.elapsed();

        let decode_start = Instant::now();
        let mask = model
            .predict(prompts, settings.options)
            .with_context(|| format!("Failed to segment frame {}", frame_count))?;
        total_decode_time += decode_start.elapsed();

        let rendered = render(&frame, &mask, settings.view);

        let output_start = Instant::now();
        sink.write_frame(&rendered)
            .with_context(|| format!("Failed to write frame {}", frame_count))?;
        total_output_time += output_start.elapsed();

        if frame_count % STATS_INTERVAL == 0 {
            let avg_encode_ms = total_encode_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_decode_ms = total_decode_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_output_ms = total_output_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let total_ms = avg_encode_ms + avg_decode_ms + avg_output_ms;

            tracing::info!(
                "Frame {}: encode={:.1}ms, decode={:.1}ms, output={:.1}ms, total={:.1}ms, fps={:.1}",
                frame_count,
                avg_encode_ms,
                avg_decode_ms,
                avg_output_ms,
                total_ms,
                1000.0 / total_ms
            );
        }

        if settings.preview && !preview_frame(PREVIEW_WINDOW, &rendered)? {
            tracing::info!("Stopped by user after {} frames", frame_count);
            break;
        }

        next = source.next_frame()?;
    }

    if settings.preview {
        close_window(PREVIEW_WINDOW)?;
    }

    sink.finish()?;
    model.reset();

    tracing::info!("Video processing complete: {} frames", frame_count);
    Ok(frame_count)
}
