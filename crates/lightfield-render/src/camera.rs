//! Camera utilities

use glam::{EulerRot, Mat3, Mat4, Quat, Vec3};

/// Perspective camera placed by position + orientation
///
/// The camera looks down its local -Z axis with +Y up.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub orientation: Quat,
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
            fov_y: 60f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }

    /// Orientation from yaw (around world Y) then pitch (around local X), in radians
    pub fn from_yaw_pitch(position: Vec3, yaw: f32, pitch: f32) -> Self {
        Self::new(position, Quat::from_euler(EulerRot::YXZ, yaw, pitch, 0.0))
    }

    pub fn set_yaw_pitch(&mut self, yaw: f32, pitch: f32) {
        self.orientation = Quat::from_euler(EulerRot::YXZ, yaw, pitch, 0.0);
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    pub fn forward(&self) -> Vec3 {
        self.orientation * Vec3::NEG_Z
    }

    pub fn right(&self) -> Vec3 {
        self.orientation * Vec3::X
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.orientation, self.position).inverse()
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

/// Rotate a world-space direction into the view space of a camera with
/// the given orientation
pub fn view_space_direction(orientation: Quat, direction: Vec3) -> Vec3 {
    orientation.inverse() * direction
}

/// Orientation of the camera whose view matrix is `view`
pub(crate) fn orientation_from_view(view: &Mat4) -> Quat {
    Quat::from_mat3(&Mat3::from_mat4(*view)).conjugate().normalize()
}
