//! Directional light

use crate::camera::view_space_direction;
use glam::{Mat4, Quat, Vec3};

/// Sun-style light with an orthographic shadow frustum centered on the origin
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DirectionalLight {
    /// Direction the light travels (normalized)
    pub direction: Vec3,
    pub color: Vec3,
    /// Half-width of the orthographic shadow frustum
    pub shadow_extent: f32,
    /// Distance from the origin to the shadow camera
    pub shadow_distance: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.2, -1.0, 0.33).normalize(),
            color: Vec3::new(1.5, 1.5, 1.5),
            shadow_extent: 20.0,
            shadow_distance: 40.0,
        }
    }
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Vec3) -> Self {
        Self {
            direction: direction.normalize_or_zero(),
            color,
            ..Self::default()
        }
    }

    pub fn set_direction(&mut self, direction: Vec3) {
        self.direction = direction.normalize_or_zero();
    }

    /// World to light clip space
    pub fn view_projection(&self) -> Mat4 {
        let light_pos = -self.direction * self.shadow_distance;
        // Straight-down light would make Y a degenerate up vector
        let up = if self.direction.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };
        let view = Mat4::look_at_rh(light_pos, Vec3::ZERO, up);

        let e = self.shadow_extent;
        let projection = Mat4::orthographic_rh(-e, e, -e, e, 0.1, self.shadow_distance * 2.0);

        projection * view
    }

    /// Light direction in the view space of a camera with `orientation`
    pub fn view_space_direction(&self, orientation: Quat) -> Vec3 {
        view_space_direction(orientation, self.direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_down_light_has_finite_frustum() {
        let light = DirectionalLight::new(Vec3::NEG_Y, Vec3::ONE);
        let m = light.view_projection();
        assert!(m.is_finite());
        let origin = m.project_point3(Vec3::ZERO);
        assert!(origin.x.abs() < 1e-5 && origin.y.abs() < 1e-5);
        assert!(origin.z > 0.0 && origin.z < 1.0);
    }

    #[test]
    fn closer_to_light_means_smaller_depth() {
        let light = DirectionalLight::default();
        let m = light.view_projection();
        let near = m.project_point3(-light.direction * 5.0);
        let far = m.project_point3(light.direction * 5.0);
        assert!(near.z < far.z);
    }
}
