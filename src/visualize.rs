//! Rendering of prompts and masks

use crate::segmentation::{Mask, PointLabel, PointPrompt};
use image::{Rgb, RgbImage};

/// Marker radius in pixels
pub const MARKER_RADIUS: i32 = 5;

/// Weight of the frame when blending the coloured mask over it
const FRAME_WEIGHT: f32 = 0.7;
const MASK_WEIGHT: f32 = 0.3;

/// How a prediction is shown or saved
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ViewMode {
    /// White mask on black
    Mask,
    /// JET-coloured mask blended over the frame
    Overlay,
}

/// Render a prediction for display
pub fn render(frame: &RgbImage, mask: &Mask, view: ViewMode) -> RgbImage {
    match view {
        ViewMode::Mask => mask_to_rgb(mask),
        ViewMode::Overlay => overlay(frame, mask),
    }
}

/// Draw filled discs at each prompt, red for foreground and blue for background
pub fn draw_markers(image: &mut RgbImage, prompts: &[PointPrompt]) {
    let (width, height) = image.dimensions();

    for prompt in prompts {
        let color = match prompt.label {
            PointLabel::Foreground => Rgb([255, 0, 0]),
            PointLabel::Background => Rgb([0, 0, 255]),
        };
        let cx = prompt.x.round() as i32;
        let cy = prompt.y.round() as i32;

        for dy in -MARKER_RADIUS..=MARKER_RADIUS {
            for dx in -MARKER_RADIUS..=MARKER_RADIUS {
                if dx * dx + dy * dy > MARKER_RADIUS * MARKER_RADIUS {
                    continue;
                }
                let (x, y) = (cx + dx, cy + dy);
                if x >= 0 && y >= 0 && (x as u32) < width && (y as u32) < height {
                    image.put_pixel(x as u32, y as u32, color);
                }
            }
        }
    }
}

/// Convert mask to RGB image for visualization
pub fn mask_to_rgb(mask: &Mask) -> RgbImage {
    let (width, height) = mask.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        let value = if mask.get(x, y) { 255 } else { 0 };
        Rgb([value, value, value])
    })
}

/// JET colour map, matching OpenCV's `COLORMAP_JET` at the end points
pub fn jet(value: u8) -> Rgb<u8> {
    let t = value as f32 / 255.0;
    let channel = |offset: f32| {
        let v = (1.5 - (4.0 * t - offset).abs()).clamp(0.0, 1.0);
        (v * 255.0).round() as u8
    };
    Rgb([channel(3.0), channel(2.0), channel(1.0)])
}

/// Blend the JET-coloured mask over the frame with a 0.7 / 0.3 weighting
pub fn overlay(frame: &RgbImage, mask: &Mask) -> RgbImage {
    let _span = tracing::debug_span!("overlay").entered();

    let (width, height) = frame.dimensions();
    let background = jet(0);
    let foreground = jet(255);

    RgbImage::from_fn(width, height, |x, y| {
        let pixel = frame.get_pixel(x, y);
        let inside = x < mask.dimensions().0 && y < mask.dimensions().1 && mask.get(x, y);
        let color = if inside { foreground } else { background };

        Rgb(std::array::from_fn(|c| {
            (pixel[c] as f32 * FRAME_WEIGHT + color[c] as f32 * MASK_WEIGHT)
                .round()
                .clamp(0.0, 255.0) as u8
        }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jet_end_points() {
        assert_eq!(jet(0), Rgb([0, 0, 128]));
        assert_eq!(jet(255), Rgb([128, 0, 0]));
    }

    #[test]
    fn test_jet_midpoint_is_green() {
        let mid = jet(128);
        assert!(mid[1] > 250);
        assert!(mid[0] < 140 && mid[2] < 140);
    }

    #[test]
    fn test_overlay_weights() {
        let frame = RgbImage::from_pixel(2, 1, Rgb([100, 100, 100]));
        let mask = Mask::new(2, 1, vec![true, false]);

        let out = overlay(&frame, &mask);
        // 100 * 0.7 + 128 * 0.3 = 108.4
        assert_eq!(*out.get_pixel(0, 0), Rgb([108, 70, 70]));
        assert_eq!(*out.get_pixel(1, 0), Rgb([70, 70, 108]));
    }

    #[test]
    fn test_mask_to_rgb() {
        let mask = Mask::new(2, 1, vec![false, true]);
        let out = mask_to_rgb(&mask);
        assert_eq!(*out.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(1, 0), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_draw_markers_colours_and_clipping() {
        let mut image = RgbImage::new(20, 20);
        draw_markers(
            &mut image,
            &[
                PointPrompt::foreground(10.0, 10.0),
                PointPrompt::background(0.0, 0.0),
            ],
        );

        assert_eq!(*image.get_pixel(10, 10), Rgb([255, 0, 0]));
        assert_eq!(*image.get_pixel(15, 10), Rgb([255, 0, 0]));
        assert_eq!(*image.get_pixel(14, 14), Rgb([0, 0, 0]));
        assert_eq!(*image.get_pixel(0, 0), Rgb([0, 0, 255]));
        assert_eq!(*image.get_pixel(19, 19), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_render_modes() {
        let frame = RgbImage::from_pixel(1, 1, Rgb([0, 0, 0]));
        let mask = Mask::new(1, 1, vec![true]);
        assert_eq!(*render(&frame, &mask, ViewMode::Mask).get_pixel(0, 0), Rgb([255, 255, 255]));
        assert_eq!(*render(&frame, &mask, ViewMode::Overlay).get_pixel(0, 0), Rgb([38, 0, 0]));
    }
}
