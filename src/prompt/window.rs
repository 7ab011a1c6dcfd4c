use super::session::{ClickSession, KeyAction, MouseAction};
use crate::media::rgb_to_mat;
use crate::segmentation::PointPrompt;
use crate::visualize::draw_markers;
use anyhow::{Context, Result};
use image::RgbImage;
use opencv::highgui;
use parking_lot::Mutex;
use std::sync::Arc;

/// Redraw interval while waiting for clicks
const REFRESH_MS: i32 = 20;

/// OpenCV window that collects point prompts from mouse clicks
pub struct ClickWindow {
    name: String,
}

impl ClickWindow {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Show `frame` and block until the user finishes clicking
    ///
    /// Left click adds a foreground point, right click a background point,
    /// middle click or `u` undoes, `c` clears. `q`, Enter, Esc or closing the
    /// window finishes.
    pub fn collect(&self, frame: &RgbImage) -> Result<Vec<PointPrompt>> {
        let (width, height) = frame.dimensions();
        let session = Arc::new(Mutex::new(ClickSession::new(width, height)));

        highgui::named_window(&self.name, highgui::WINDOW_AUTOSIZE)
            .context("Failed to open click window")?;

        let shared = Arc::clone(&session);
        highgui::set_mouse_callback(
            &self.name,
            Some(Box::new(move |event, x, y, _flags| {
                let action = match event {
                    highgui::EVENT_LBUTTONDOWN => MouseAction::AddForeground,
                    highgui::EVENT_RBUTTONDOWN => MouseAction::AddBackground,
                    highgui::EVENT_MBUTTONDOWN => MouseAction::Undo,
                    _ => return,
                };
                shared.lock().handle_mouse(action, x, y);
            })),
        )
        .context("Failed to register mouse callback")?;

        tracing::info!(
            "Click on the image to add points (left: foreground, right: background). Press 'q' to finish."
        );

        loop {
            let mut display = frame.clone();
            let points = session.lock().points().to_vec();
            draw_markers(&mut display, &points);
            highgui::imshow(&self.name, &rgb_to_mat(&display)?)?;

            let key = highgui::wait_key(REFRESH_MS)? & 0xFF;
            match KeyAction::from_key(key) {
                KeyAction::Finish => break,
                KeyAction::Undo => session.lock().undo(),
                KeyAction::Clear => session.lock().clear(),
                KeyAction::None => {}
            }

            if highgui::get_window_property(&self.name, highgui::WND_PROP_VISIBLE)? < 1.0 {
                tracing::debug!("Click window closed");
                break;
            }
        }

        highgui::set_mouse_callback(&self.name, None)?;
        highgui::destroy_window(&self.name)?;

        let points = session.lock().points().to_vec();
        tracing::info!("Selected {} point(s)", points.len());
        Ok(points)
    }
}

/// Show an image until any key is pressed or the window is closed
pub fn show_until_key(name: &str, image: &RgbImage) -> Result<()> {
    highgui::named_window(name, highgui::WINDOW_AUTOSIZE)?;
    highgui::imshow(name, &rgb_to_mat(image)?)?;

    loop {
        if highgui::wait_key(REFRESH_MS)? >= 0 {
            break;
        }
        if highgui::get_window_property(name, highgui::WND_PROP_VISIBLE)? < 1.0 {
            break;
        }
    }

    highgui::destroy_all_windows()?;
    Ok(())
}

/// Show one frame of a running stream; returns false once the user asks to stop
pub fn preview_frame(name: &str, frame: &RgbImage) -> Result<bool> {
    highgui::imshow(name, &rgb_to_mat(frame)?)?;
    let key = highgui::wait_key(1)? & 0xFF;
    Ok(KeyAction::from_key(key) != KeyAction::Finish)
}

/// Destroy a window opened by `preview_frame`
pub fn close_window(name: &str) -> Result<()> {
    highgui::destroy_window(name).with_context(|| format!("Failed to close window {name}"))?;
    Ok(())
}
