use crate::segmentation::PointPrompt;

/// Mouse input the click window cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseAction {
    /// Left button: point on the object
    AddForeground,
    /// Right button: point outside the object
    AddBackground,
    /// Middle button: drop the last point
    Undo,
}

/// Keys understood while collecting points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Finish,
    Undo,
    Clear,
    None,
}

impl KeyAction {
    /// Map a `wait_key` code (already masked to the low byte)
    pub fn from_key(key: i32) -> Self {
        match key {
            k if k == 'q' as i32 || k == 13 || k == 10 || k == 27 => KeyAction::Finish,
            k if k == 'u' as i32 => KeyAction::Undo,
            k if k == 'c' as i32 => KeyAction::Clear,
            _ => KeyAction::None,
        }
    }
}

/// Points collected so far for one frame
#[derive(Debug, Clone)]
pub struct ClickSession {
    width: u32,
    height: u32,
    points: Vec<PointPrompt>,
}

impl ClickSession {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            points: Vec::new(),
        }
    }

    /// Apply a mouse event at `(x, y)`; events outside the frame are ignored
    pub fn handle_mouse(&mut self, action: MouseAction, x: i32, y: i32) {
        match action {
            MouseAction::Undo => self.undo(),
            MouseAction::AddForeground | MouseAction::AddBackground => {
                if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
                    tracing::debug!("Ignoring click outside the frame at ({}, {})", x, y);
                    return;
                }

                let point = if action == MouseAction::AddForeground {
                    PointPrompt::foreground(x as f32, y as f32)
                } else {
                    PointPrompt::background(x as f32, y as f32)
                };
                self.points.push(point);
                tracing::info!("Point added: ({}, {}) {:?}", x, y, point.label);
            }
        }
    }

    pub fn undo(&mut self) {
        if let Some(point) = self.points.pop() {
            tracing::info!("Point removed: ({}, {})", point.x, point.y);
        }
    }

    pub fn clear(&mut self) {
        self.points.clear();
        tracing::info!("All points cleared");
    }

    pub fn points(&self) -> &[PointPrompt] {
        &self.points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clicks_add_labelled_points() {
        let mut session = ClickSession::new(100, 50);
        session.handle_mouse(MouseAction::AddForeground, 10, 20);
        session.handle_mouse(MouseAction::AddBackground, 30, 40);

        assert_eq!(
            session.points(),
            &[
                PointPrompt::foreground(10.0, 20.0),
                PointPrompt::background(30.0, 40.0),
            ]
        );
    }

    #[test]
    fn test_clicks_outside_frame_ignored() {
        let mut session = ClickSession::new(100, 50);
        session.handle_mouse(MouseAction::AddForeground, -1, 10);
        session.handle_mouse(MouseAction::AddForeground, 100, 10);
        session.handle_mouse(MouseAction::AddBackground, 10, 50);
        assert!(session.points().is_empty());
    }

    #[test]
    fn test_undo_and_clear() {
        let mut session = ClickSession::new(100, 100);
        session.handle_mouse(MouseAction::AddForeground, 1, 1);
        session.handle_mouse(MouseAction::AddForeground, 2, 2);
        session.handle_mouse(MouseAction::Undo, 0, 0);
        assert_eq!(session.points(), &[PointPrompt::foreground(1.0, 1.0)]);

        session.undo();
        session.undo();
        assert!(session.points().is_empty());

        session.handle_mouse(MouseAction::AddBackground, 3, 3);
        session.clear();
        assert!(session.points().is_empty());
    }

    #[test]
    fn test_key_actions() {
        assert_eq!(KeyAction::from_key('q' as i32), KeyAction::Finish);
        assert_eq!(KeyAction::from_key(13), KeyAction::Finish);
        assert_eq!(KeyAction::from_key(27), KeyAction::Finish);
        assert_eq!(KeyAction::from_key('u' as i32), KeyAction::Undo);
        assert_eq!(KeyAction::from_key('c' as i32), KeyAction::Clear);
        assert_eq!(KeyAction::from_key(-1 & 0xFF), KeyAction::None);
    }
}
