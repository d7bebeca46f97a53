use crate::settings::{LightSettings, MeshSettings};
use glam::{Mat4, Quat, Vec3};
use std::f32::consts::TAU;
use std::time::Duration;

/// Monkey spin, radians per second.
pub const SPIN_SPEED: f32 = 0.6;
/// Bounce cycles per second.
pub const BOUNCE_FREQUENCY: f32 = 0.5;
pub const BOUNCE_HEIGHT: f32 = 0.5;
/// Light orbit around the up axis, radians per second.
pub const LIGHT_SPEED: f32 = 0.8;

/// Animation state advanced by the fixed update step. Never written back
/// to the settings.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Animation {
    pub spin: f32,
    pub bounce_phase: f32,
    pub light_angle: f32,
}

impl Animation {
    pub fn advance(&mut self, step: Duration, mesh: &MeshSettings) {
        let dt = step.as_secs_f32();
        if mesh.rotate {
            self.spin = (self.spin + dt * SPIN_SPEED) % TAU;
        }
        if mesh.bounce {
            self.bounce_phase = (self.bounce_phase + dt * BOUNCE_FREQUENCY * TAU) % TAU;
        }
        if mesh.animate_lights {
            self.light_angle = (self.light_angle + dt * LIGHT_SPEED) % TAU;
        }
    }

    pub fn model(&self) -> Mat4 {
        let lift = Vec3::Y * (self.bounce_phase.sin() * BOUNCE_HEIGHT);
        Mat4::from_translation(lift) * Mat4::from_rotation_y(self.spin)
    }

    /// The light vector as it should be packed this frame.
    pub fn light_vector(&self, light: &LightSettings) -> Vec3 {
        Quat::from_rotation_y(self.light_angle) * light.vector
    }
}
