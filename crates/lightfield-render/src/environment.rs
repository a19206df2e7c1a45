//! Equirectangular sky drawn behind everything else

use crate::gpu::{
    DepthTest, DrawCall, DrawUniforms, Geometry, Program, RenderBackend, TextureDesc, TextureHandle,
};
use crate::{Error, Result};
use glam::{Mat4, Vec3, Vec4};

pub struct Environment {
    texture: TextureHandle,
}

impl Environment {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

    /// Upload an RGBA8 equirectangular image
    pub fn from_rgba8(
        backend: &mut dyn RenderBackend,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(Error::Resource(format!(
                "environment map {}x{} needs {} bytes, got {}",
                width,
                height,
                expected,
                pixels.len()
            )));
        }
        let texture = backend.create_texture(&TextureDesc::sampled(
            "Environment Map",
            width,
            height,
            Self::FORMAT,
        ))?;
        backend.write_texture(texture, pixels)?;
        log::info!("Environment map uploaded: {}x{}", width, height);
        Ok(Self { texture })
    }

    pub fn texture(&self) -> TextureHandle {
        self.texture
    }

    /// Full-screen draw at the far plane; only fills depth nothing else touched
    ///
    /// `distance` is what capture passes store as the distance to the sky.
    pub fn draw_call(
        &self,
        view_projection: Mat4,
        eye: Vec3,
        brightness: f32,
        distance: f32,
    ) -> DrawCall<'_> {
        DrawCall {
            program: Program::Environment,
            geometry: Geometry::FullscreenTriangle,
            material: None,
            textures: std::slice::from_ref(&self.texture),
            depth_test: DepthTest::Equal,
            uniforms: DrawUniforms {
                world_from_projection: view_projection.inverse(),
                camera_position: eye.extend(1.0),
                params: Vec4::new(brightness, distance, 0.0, 0.0),
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::recording::{Command, RecordingBackend};

    #[test]
    fn upload_checks_pixel_count() {
        let mut backend = RecordingBackend::new();
        assert!(Environment::from_rgba8(&mut backend, 4, 2, &[0; 31]).is_err());
        let env = Environment::from_rgba8(&mut backend, 4, 2, &[0; 32]).unwrap();
        assert!(matches!(backend.commands[0], Command::WriteTexture(t) if t == env.texture()));
        assert_eq!(backend.texture_desc(env.texture()).width, 4);
    }

    #[test]
    fn draw_uses_equal_depth_and_inverse_view_projection() {
        let mut backend = RecordingBackend::new();
        let env = Environment::from_rgba8(&mut backend, 2, 1, &[255; 8]).unwrap();
        let vp = Mat4::perspective_rh(1.0, 1.5, 0.1, 100.0) * Mat4::look_at_rh(Vec3::ONE, Vec3::ZERO, Vec3::Y);
        let draw = env.draw_call(vp, Vec3::ONE, 1.5, 100.0);
        assert_eq!(draw.depth_test, DepthTest::Equal);
        assert_eq!(draw.textures, &[env.texture()]);
        let round = draw.uniforms.world_from_projection * vp;
        assert!(round.abs_diff_eq(Mat4::IDENTITY, 1e-3));
        assert_eq!(draw.uniforms.params.x, 1.5);
    }
}
