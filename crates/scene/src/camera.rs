use crate::settings::CameraSettings;
use glam::{EulerRot, Mat4, Quat, Vec2, Vec3};
use lumen_input::Axis;

/// Radians of orbit per pixel of drag.
pub const ROTATE_SENSITIVITY: f32 = 0.005;
/// Offset change per unit of wheel delta.
pub const ZOOM_FACTOR: f64 = 0.1;
pub const MIN_OFFSET: f64 = 1.0;

/// Matrices of one frame, as the camera uniform block wants them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraFrame {
    pub projection: Mat4,
    pub view: Mat4,
    pub position: Vec3,
    pub inverse_view_projection: Mat4,
}

/// Perspective projection with a `[0, 1]` depth range.
pub fn projection(camera: &CameraSettings, aspect: f32) -> Mat4 {
    Mat4::perspective_rh(
        camera.fov.to_radians(),
        aspect.max(f32::EPSILON),
        camera.near,
        camera.far.max(camera.near + f32::EPSILON),
    )
}

/// The camera orbits the origin at `offset`, turned by `rotation`.
pub fn view(camera: &CameraSettings) -> Mat4 {
    Mat4::from_translation(Vec3::new(0.0, 0.0, -camera.offset)) * Mat4::from_quat(camera.rotation)
}

pub fn frame(camera: &CameraSettings, projection: Mat4) -> CameraFrame {
    let view = view(camera);
    let position = camera.rotation.inverse() * Vec3::new(0.0, 0.0, camera.offset);
    CameraFrame {
        projection,
        view,
        position,
        inverse_view_projection: (projection * view).inverse(),
    }
}

/// Apply a drag of `delta` pixels.
pub fn rotate_by(rotation: Quat, delta: Vec2) -> Quat {
    let delta = Quat::from_rotation_y(delta.x * ROTATE_SENSITIVITY)
        * Quat::from_rotation_x(delta.y * ROTATE_SENSITIVITY);
    (rotation * delta).normalize()
}

/// Zero one Euler angle of `rotation`, or all of them with `None`.
pub fn reset_axis(rotation: Quat, axis: Option<Axis>) -> Quat {
    let Some(axis) = axis else {
        return Quat::IDENTITY;
    };
    let (mut yaw, mut pitch, mut roll) = rotation.to_euler(EulerRot::YXZ);
    match axis {
        Axis::Pitch => pitch = 0.0,
        Axis::Yaw => yaw = 0.0,
        Axis::Roll => roll = 0.0,
    }
    Quat::from_euler(EulerRot::YXZ, yaw, pitch, roll)
}

/// Move the camera along its view axis by a wheel delta.
pub fn zoom(offset: f64, delta: f32) -> f64 {
    (offset + f64::from(delta) * ZOOM_FACTOR).max(MIN_OFFSET)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_4;

    fn settings() -> CameraSettings {
        CameraSettings {
            fov: 45.0,
            near: 0.1,
            far: 100.0,
            offset: 10.0,
            rotation: Quat::IDENTITY,
        }
    }

    #[test]
    fn camera_sits_on_positive_z() {
        let camera = settings();
        let frame = frame(&camera, projection(&camera, 1.5));
        assert!(frame.position.abs_diff_eq(Vec3::new(0.0, 0.0, 10.0), 1e-5));
        let origin = frame.view.transform_point3(Vec3::ZERO);
        assert!(origin.abs_diff_eq(Vec3::new(0.0, 0.0, -10.0), 1e-5));
    }

    #[test]
    fn inverse_view_projection_unprojects() {
        let camera = settings();
        let frame = frame(&camera, projection(&camera, 1.0));
        // The center of the far plane lies straight ahead of the camera.
        let far = frame.inverse_view_projection.project_point3(Vec3::new(0.0, 0.0, 1.0));
        let direction = (far - frame.position).normalize();
        assert!(direction.abs_diff_eq(Vec3::NEG_Z, 1e-4));
    }

    #[test]
    fn reset_single_axis() {
        let rotation = Quat::from_euler(EulerRot::YXZ, FRAC_PI_4, 0.3, 0.2);
        let no_pitch = reset_axis(rotation, Some(Axis::Pitch));
        let (yaw, pitch, roll) = no_pitch.to_euler(EulerRot::YXZ);
        assert!((yaw - FRAC_PI_4).abs() < 1e-5);
        assert!(pitch.abs() < 1e-5);
        assert!((roll - 0.2).abs() < 1e-5);
        assert_eq!(reset_axis(rotation, None), Quat::IDENTITY);
    }

    #[test]
    fn drag_turns_around_y() {
        let turned = rotate_by(Quat::IDENTITY, Vec2::new(100.0, 0.0));
        let (yaw, pitch, _) = turned.to_euler(EulerRot::YXZ);
        assert!((yaw - 0.5).abs() < 1e-5);
        assert!(pitch.abs() < 1e-5);
    }

    #[test]
    fn zoom_keeps_minimum_offset() {
        assert!((zoom(10.0, 5.0) - 10.5).abs() < 1e-12);
        assert_eq!(zoom(1.2, -100.0), MIN_OFFSET);
    }
}
