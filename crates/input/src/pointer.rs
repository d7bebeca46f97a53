use crate::action::Action;
use glam::Vec2;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Other,
}

/// Turns pointer events into camera actions.
///
/// Dragging with the primary button rotates; the wheel zooms. Events the
/// panel consumed should not reach the tracker.
#[derive(Debug, Default)]
pub struct PointerTracker {
    dragging: bool,
    last: Option<Vec2>,
}

impl PointerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn button(&mut self, button: PointerButton, pressed: bool) {
        if button == PointerButton::Primary {
            self.dragging = pressed;
        }
    }

    /// New cursor position. Yields a rotation while dragging.
    pub fn moved(&mut self, position: Vec2) -> Option<Action> {
        let last = self.last.replace(position)?;
        if !self.dragging {
            return None;
        }
        let delta = position - last;
        if delta == Vec2::ZERO {
            return None;
        }
        trace!(dx = delta.x, dy = delta.y, "drag");
        Some(Action::Rotate(delta))
    }

    /// The cursor left the window.
    pub fn left(&mut self) {
        self.last = None;
        self.dragging = false;
    }

    /// Wheel movement; positive moves the camera away.
    pub fn wheel(&mut self, delta: f32) -> Option<Action> {
        (delta != 0.0).then_some(Action::Zoom(delta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moves_without_drag_are_ignored() {
        let mut pointer = PointerTracker::new();
        assert_eq!(pointer.moved(Vec2::new(10.0, 10.0)), None);
        assert_eq!(pointer.moved(Vec2::new(20.0, 10.0)), None);
    }

    #[test]
    fn drag_yields_deltas() {
        let mut pointer = PointerTracker::new();
        pointer.moved(Vec2::new(10.0, 10.0));
        pointer.button(PointerButton::Primary, true);
        assert_eq!(
            pointer.moved(Vec2::new(13.0, 8.0)),
            Some(Action::Rotate(Vec2::new(3.0, -2.0)))
        );
        assert_eq!(pointer.moved(Vec2::new(13.0, 8.0)), None);
        pointer.button(PointerButton::Primary, false);
        assert_eq!(pointer.moved(Vec2::new(20.0, 8.0)), None);
    }

    #[test]
    fn secondary_button_does_not_drag() {
        let mut pointer = PointerTracker::new();
        pointer.button(PointerButton::Secondary, true);
        assert!(!pointer.is_dragging());
    }

    #[test]
    fn leaving_ends_the_drag() {
        let mut pointer = PointerTracker::new();
        pointer.moved(Vec2::ZERO);
        pointer.button(PointerButton::Primary, true);
        pointer.left();
        assert!(!pointer.is_dragging());
        assert_eq!(pointer.moved(Vec2::ONE), None);
    }

    #[test]
    fn wheel_zooms() {
        let mut pointer = PointerTracker::new();
        assert_eq!(pointer.wheel(0.0), None);
        assert_eq!(pointer.wheel(-3.0), Some(Action::Zoom(-3.0)));
    }
}
