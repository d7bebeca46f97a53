use glam::Vec2;
use std::fmt;

/// Rotation axis of the orbit camera, in camera terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Pitch,
    Yaw,
    Roll,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::Pitch, Axis::Yaw, Axis::Roll];

    pub fn name(self) -> &'static str {
        match self {
            Self::Pitch => "pitch",
            Self::Yaw => "yaw",
            Self::Roll => "roll",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A high-level action any host can produce.
///
/// The scene consumes actions, never raw input events.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Orbit the camera by a pointer drag delta, in pixels.
    Rotate(Vec2),
    /// Move the camera along its view axis by a wheel delta.
    Zoom(f32),
    /// Zero one rotation axis, or all of them with `None`.
    ResetRotation(Option<Axis>),
    /// Replace the stored settings with a named preset and reload.
    LoadPreset(String),
    /// Clear the stored settings and reload from defaults.
    ResetSession,
    /// Show or hide the settings panel.
    TogglePanel,
}

impl Action {
    /// Whether applying this action restarts the scene.
    pub fn reloads(&self) -> bool {
        matches!(self, Self::LoadPreset(_) | Self::ResetSession)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_actions() {
        assert!(Action::LoadPreset("RefractionOnly".into()).reloads());
        assert!(Action::ResetSession.reloads());
        assert!(!Action::Zoom(1.0).reloads());
        assert!(!Action::ResetRotation(None).reloads());
    }

    #[test]
    fn axis_names() {
        let names: Vec<String> = Axis::ALL.iter().map(ToString::to_string).collect();
        assert_eq!(names, ["pitch", "yaw", "roll"]);
    }
}
