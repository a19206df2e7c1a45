//! Directional light shadow map and the cache that decides when to redraw it

use crate::gpu::{
    Attachment, Culling, DepthTest, DrawUniforms, LoadOp, PassDesc, RenderBackend, TextureDesc,
    TextureHandle, Viewport,
};
use crate::light::DirectionalLight;
use crate::scene::Mesh;
use crate::Result;
use glam::Vec3;

/// Remembers the light direction and mesh count the shadow map was last
/// rendered with
///
/// Moving a mesh does not make the map stale; only adding meshes or turning
/// the light does.
#[derive(Clone, Debug, Default)]
pub struct ShadowCache {
    last: Option<(Vec3, usize)>,
}

impl ShadowCache {
    const DIRECTION_EPSILON: f32 = 1e-6;

    pub fn new() -> Self {
        Self::default()
    }

    /// True (and records the inputs) when the map must be re-rendered
    pub fn needs_render(&mut self, direction: Vec3, mesh_count: usize) -> bool {
        if let Some((last_direction, last_count)) = self.last {
            if last_count == mesh_count
                && last_direction.abs_diff_eq(direction, Self::DIRECTION_EPSILON)
            {
                return false;
            }
        }
        self.last = Some((direction, mesh_count));
        true
    }

    /// Forget the recorded state so the next check re-renders
    pub fn invalidate(&mut self) {
        self.last = None;
    }
}

/// Light-space depth: a float colour copy plus the depth buffer it was tested against
pub struct ShadowMap {
    pub color: TextureHandle,
    pub depth: TextureHandle,
    pub size: u32,
}

impl ShadowMap {
    pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    pub fn new(backend: &mut dyn RenderBackend, size: u32) -> Result<Self> {
        let color = backend.create_texture(&TextureDesc::target(
            "Shadow Map Color",
            size,
            Self::COLOR_FORMAT,
        ))?;
        let depth = backend.create_texture(&TextureDesc::target(
            "Shadow Map Depth",
            size,
            Self::DEPTH_FORMAT,
        ))?;
        log::info!("Shadow map allocated: {0}x{0}", size);
        Ok(Self { color, depth, size })
    }

    /// Clear and redraw every mesh from the light
    pub fn render(
        &self,
        backend: &mut dyn RenderBackend,
        meshes: &[Mesh],
        light: &DirectionalLight,
    ) -> Result<()> {
        backend.begin_pass(&PassDesc {
            label: "Shadow Map",
            color: vec![Some(Attachment::texture(self.color))],
            depth: Some(Attachment::texture(self.depth)),
            load: LoadOp::Clear,
            viewport: Viewport::Square(self.size),
            culling: Culling::Back,
        })?;

        let light_projection_from_world = light.view_projection();
        for mesh in meshes {
            backend.draw(&mesh.shadow.draw(
                &[],
                DepthTest::LessEqual,
                DrawUniforms {
                    world_from_local: mesh.transform,
                    light_projection_from_world,
                    ..Default::default()
                },
            ))?;
        }

        backend.end_pass()?;
        log::debug!("Shadow map rendered with {} meshes", meshes.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::recording::RecordingBackend;
    use crate::gpu::Program;
    use crate::mesh::{Material, MeshData};
    use glam::Mat4;

    #[test]
    fn first_check_always_renders() {
        let mut cache = ShadowCache::new();
        assert!(cache.needs_render(Vec3::ZERO, 0));
    }

    #[test]
    fn unchanged_inputs_do_not_render() {
        let mut cache = ShadowCache::new();
        let down = Vec3::new(0.0, -1.0, 0.0);
        assert!(cache.needs_render(down, 3));
        assert!(!cache.needs_render(down, 3));
        assert!(!cache.needs_render(down, 3));
        assert!(cache.needs_render(down, 4));
        assert!(!cache.needs_render(down, 4));
    }

    #[test]
    fn new_mesh_triggers_render() {
        let mut cache = ShadowCache::new();
        let light = DirectionalLight::default();
        assert!(cache.needs_render(light.direction, 10));
        assert!(!cache.needs_render(light.direction, 10));
        assert!(cache.needs_render(light.direction, 11));
    }

    #[test]
    fn direction_change_triggers_render() {
        let mut cache = ShadowCache::new();
        assert!(cache.needs_render(Vec3::NEG_Y, 2));
        assert!(cache.needs_render(Vec3::new(0.1, -1.0, 0.0).normalize(), 2));
        cache.invalidate();
        assert!(cache.needs_render(Vec3::new(0.1, -1.0, 0.0).normalize(), 2));
    }

    #[test]
    fn render_draws_every_mesh_depth_only() {
        let mut backend = RecordingBackend::new();
        let map = ShadowMap::new(&mut backend, 512).unwrap();
        let meshes = (0..3)
            .map(|i| {
                Mesh::upload(
                    &mut backend,
                    &MeshData::cube([0.0; 3], 1.0),
                    &Material::default(),
                    Mat4::from_translation(Vec3::X * i as f32),
                    "cube",
                )
                .unwrap()
            })
            .collect::<Vec<_>>();

        let light = DirectionalLight::new(Vec3::NEG_Y, Vec3::ONE);
        map.render(&mut backend, &meshes, &light).unwrap();

        let passes = backend.draws_per_pass();
        assert_eq!(passes.len(), 1);
        let (pass, draws) = &passes[0];
        assert_eq!(pass.viewport, Viewport::Square(512));
        assert_eq!(pass.load, LoadOp::Clear);
        assert_eq!(pass.depth, Some(Attachment::texture(map.depth)));
        assert_eq!(draws.len(), 3);
        for (draw, mesh) in draws.iter().zip(&meshes) {
            assert_eq!(draw.program, Program::ShadowDepth);
            assert_eq!(draw.depth_test, DepthTest::LessEqual);
            assert_eq!(draw.uniforms.world_from_local, mesh.transform);
            assert_eq!(draw.uniforms.light_projection_from_world, light.view_projection());
        }
    }
}
