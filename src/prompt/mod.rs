mod labels;
mod session;
mod window;

pub use labels::{ask_labels, parse_point};
pub use window::{close_window, preview_frame, show_until_key, ClickWindow};

use crate::error::Error;
use crate::segmentation::{PointPrompt, PromptSet};
use anyhow::Result;
use image::RgbImage;

/// Where the point prompts for a frame come from
pub struct PromptSource {
    /// Points given on the command line; when empty the click window opens
    pub points: Vec<PointPrompt>,
    /// Ask for each point's label on stdin after collection
    pub ask_labels: bool,
}

impl PromptSource {
    /// Gather the prompts for `frame`
    pub fn collect(&self, frame: &RgbImage, window_name: &str) -> Result<PromptSet> {
        let points = if self.points.is_empty() {
            ClickWindow::new(window_name).collect(frame)?
        } else {
            check_bounds(&self.points, frame.dimensions())?;
            self.points.clone()
        };

        let points = if self.ask_labels && !points.is_empty() {
            let stdin = std::io::stdin();
            let mut input = stdin.lock();
            ask_labels(&points, &mut input, &mut std::io::stdout())?
        } else {
            points
        };

        if points.is_empty() {
            return Err(Error::NoPrompts.into());
        }

        tracing::info!("Selected points: {:?}", points);
        Ok(points)
    }
}

/// Command line points must fall inside the frame
fn check_bounds(points: &[PointPrompt], (width, height): (u32, u32)) -> Result<(), Error> {
    for point in points {
        if point.x >= width as f32 || point.y >= height as f32 {
            return Err(Error::InvalidPoint(format!(
                "{},{} lies outside the {}x{} frame",
                point.x, point.y, width, height
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_points_skip_window() {
        let source = PromptSource {
            points: vec![PointPrompt::foreground(5.0, 5.0)],
            ask_labels: false,
        };
        let frame = RgbImage::new(10, 10);
        assert_eq!(
            source.collect(&frame, "unused").unwrap(),
            vec![PointPrompt::foreground(5.0, 5.0)]
        );
    }

    #[test]
    fn test_command_line_points_outside_frame() {
        let source = PromptSource {
            points: vec![PointPrompt::foreground(10.0, 5.0)],
            ask_labels: false,
        };
        let frame = RgbImage::new(10, 10);
        let err = source.collect(&frame, "unused").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InvalidPoint(_))
        ));
    }
}
