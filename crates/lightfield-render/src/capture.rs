//! Six-face capture of the scene around a probe
//!
//! Each face renders the lit scene (meshes with shadows, probe markers and
//! the environment) from the probe position into one layer of three cube
//! textures: radiance with distance in alpha, normals, and depth.

use crate::camera::orientation_from_view;
use crate::environment::Environment;
use crate::gpu::{
    Attachment, Culling, DepthTest, DrawUniforms, LoadOp, PassDesc, RenderBackend, TextureDesc,
    TextureHandle, Viewport,
};
use crate::light::DirectionalLight;
use crate::probe::{capture_projection, Probe, ProbeConfig, ProbeMarkers, CAPTURE_FAR, CUBE_FACES};
use crate::scene::Mesh;
use crate::shadow::ShadowMap;
use crate::Result;
use glam::Vec3;

/// Cube textures a probe is captured into
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CubemapSet {
    /// RGB radiance, A distance from the probe
    pub radiance_distance: TextureHandle,
    pub normals: TextureHandle,
    /// Rasterization only, never sampled
    pub depth: TextureHandle,
    pub size: u32,
}

/// Everything a capture renders, borrowed from the frame loop
pub struct CaptureScene<'a> {
    pub meshes: &'a [Mesh],
    pub light: &'a DirectionalLight,
    pub shadow_map: &'a ShadowMap,
    pub markers: Option<&'a ProbeMarkers>,
    pub environment: Option<&'a Environment>,
    pub ambient_color: Vec3,
    pub environment_brightness: f32,
}

pub struct CubemapCapture {
    cubemaps: CubemapSet,
}

impl CubemapCapture {
    pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    pub fn new(backend: &mut dyn RenderBackend, config: &ProbeConfig) -> Result<Self> {
        let size = config.cube_size;
        let cubemaps = CubemapSet {
            radiance_distance: backend.create_texture(&TextureDesc::cube_target(
                "Probe Cubemap Radiance Distance",
                size,
                Self::COLOR_FORMAT,
            ))?,
            normals: backend.create_texture(&TextureDesc::cube_target(
                "Probe Cubemap Normals",
                size,
                Self::COLOR_FORMAT,
            ))?,
            depth: backend.create_texture(&TextureDesc::cube_target(
                "Probe Cubemap Depth",
                size,
                Self::DEPTH_FORMAT,
            ))?,
            size,
        };
        log::info!("Probe cubemaps allocated: 6x{0}x{0}", size);
        Ok(Self { cubemaps })
    }

    pub fn cubemaps(&self) -> &CubemapSet {
        &self.cubemaps
    }

    /// Render all six faces from `probe`, overwriting the cubemaps in place
    pub fn capture(
        &self,
        backend: &mut dyn RenderBackend,
        probe: &Probe,
        scene: &CaptureScene<'_>,
    ) -> Result<()> {
        let set = &self.cubemaps;
        let projection = capture_projection();
        let light_projection_from_world = scene.light.view_projection();
        let shadow_textures = [scene.shadow_map.depth];

        for (index, face) in CUBE_FACES.iter().enumerate() {
            let layer = index as u32;
            let view = face.view_matrix(probe.position);

            backend.begin_pass(&PassDesc {
                label: "Probe Capture Face",
                color: vec![
                    Some(Attachment::cube_face(set.radiance_distance, layer)),
                    Some(Attachment::cube_face(set.normals, layer)),
                ],
                depth: Some(Attachment::cube_face(set.depth, layer)),
                load: LoadOp::Clear,
                viewport: Viewport::Square(set.size),
                // mirrored projection flips winding
                culling: Culling::Front,
            })?;

            // Light direction is expressed in this face's view space
            let orientation = orientation_from_view(&view);
            let face_uniforms = DrawUniforms {
                view_from_world: view,
                projection_from_view: projection,
                light_projection_from_world,
                camera_position: probe.position.extend(1.0),
                dir_light_color: scene.light.color.extend(1.0),
                dir_light_view_direction: scene.light.view_space_direction(orientation).extend(0.0),
                ambient_color: scene.ambient_color.extend(1.0),
                ..Default::default()
            };

            for mesh in scene.meshes {
                backend.draw(&mesh.precompute.draw(
                    &shadow_textures,
                    DepthTest::LessEqual,
                    DrawUniforms {
                        world_from_local: mesh.transform,
                        ..face_uniforms
                    },
                ))?;
            }

            if let Some(markers) = scene.markers {
                backend.draw(&markers.draw_call(view, projection, probe.position))?;
            }

            if let Some(environment) = scene.environment {
                backend.draw(&environment.draw_call(
                    projection * view,
                    probe.position,
                    scene.environment_brightness,
                    CAPTURE_FAR,
                ))?;
            }

            backend.end_pass()?;
        }

        log::debug!(
            "Captured probe at {:?} with {} meshes",
            probe.position,
            scene.meshes.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::recording::RecordingBackend;
    use crate::gpu::{Program, TextureKind};
    use crate::mesh::{Material, MeshData};
    use crate::probe::ProbeSet;
    use glam::Mat4;

    struct Fixture {
        backend: RecordingBackend,
        capture: CubemapCapture,
        shadow_map: ShadowMap,
        meshes: Vec<Mesh>,
        markers: Option<ProbeMarkers>,
        environment: Environment,
        light: DirectionalLight,
    }

    fn fixture() -> Fixture {
        let mut backend = RecordingBackend::new();
        let config = ProbeConfig::new().with_cube_size(32);
        let capture = CubemapCapture::new(&mut backend, &config).unwrap();
        let shadow_map = ShadowMap::new(&mut backend, 64).unwrap();
        let meshes = vec![
            Mesh::upload(&mut backend, &MeshData::cube([0.0; 3], 20.0).inverted(), &Material::default(), Mat4::IDENTITY, "room").unwrap(),
            Mesh::upload(&mut backend, &MeshData::cube([0.0; 3], 1.0), &Material::default(), Mat4::IDENTITY, "block").unwrap(),
        ];
        let probes = ProbeSet::new().with_probe(Vec3::new(-10.0, 4.0, 0.0));
        let markers = ProbeMarkers::new(&mut backend, &probes).unwrap();
        let environment = Environment::from_rgba8(&mut backend, 2, 1, &[128; 8]).unwrap();
        backend.clear_commands();
        Fixture {
            backend,
            capture,
            shadow_map,
            meshes,
            markers,
            environment,
            light: DirectionalLight::new(Vec3::NEG_Y, Vec3::ONE),
        }
    }

    fn run(f: &mut Fixture) {
        let scene = CaptureScene {
            meshes: &f.meshes,
            light: &f.light,
            shadow_map: &f.shadow_map,
            markers: f.markers.as_ref(),
            environment: Some(&f.environment),
            ambient_color: Vec3::splat(0.15),
            environment_brightness: 1.0,
        };
        f.capture
            .capture(&mut f.backend, &Probe::new(Vec3::new(-10.0, 4.0, 0.0)), &scene)
            .unwrap();
    }

    #[test]
    fn cubemaps_are_six_layer_targets() {
        let f = fixture();
        let set = *f.capture.cubemaps();
        for handle in [set.radiance_distance, set.normals, set.depth] {
            let desc = f.backend.texture_desc(handle);
            assert_eq!(desc.kind, TextureKind::Cube);
            assert_eq!((desc.width, desc.height), (32, 32));
            assert!(desc.render_target);
        }
    }

    #[test]
    fn renders_one_pass_per_face_into_matching_layer() {
        let mut f = fixture();
        let textures_before = f.backend.textures.len();
        run(&mut f);
        assert_eq!(f.backend.textures.len(), textures_before);

        let set = *f.capture.cubemaps();
        let passes = f.backend.draws_per_pass();
        assert_eq!(passes.len(), 6);
        for (face, (pass, draws)) in passes.iter().enumerate() {
            let layer = face as u32;
            assert_eq!(
                pass.color,
                vec![
                    Some(Attachment::cube_face(set.radiance_distance, layer)),
                    Some(Attachment::cube_face(set.normals, layer)),
                ]
            );
            assert_eq!(pass.depth, Some(Attachment::cube_face(set.depth, layer)));
            assert_eq!(pass.viewport, Viewport::Square(32));
            assert_eq!(pass.load, LoadOp::Clear);

            let programs: Vec<_> = draws.iter().map(|d| d.program).collect();
            assert_eq!(
                programs,
                [Program::Precompute, Program::Precompute, Program::ProbeMarker, Program::Environment]
            );
        }
    }

    #[test]
    fn light_direction_is_in_face_view_space() {
        let mut f = fixture();
        run(&mut f);
        let probe = Vec3::new(-10.0, 4.0, 0.0);
        for ((_, draws), face) in f.backend.draws_per_pass().iter().zip(CUBE_FACES.iter()) {
            let view = face.view_matrix(probe);
            let expected = view.transform_vector3(Vec3::NEG_Y);
            for draw in draws.iter().filter(|d| d.program == Program::Precompute) {
                let got = draw.uniforms.dir_light_view_direction.truncate();
                assert!((got - expected).length() < 1e-5, "{:?} vs {:?}", got, expected);
                assert_eq!(draw.uniforms.view_from_world, view);
                assert_eq!(draw.textures, vec![f.shadow_map.depth]);
                assert_eq!(draw.depth_test, DepthTest::LessEqual);
            }
        }
    }

    #[test]
    fn markers_use_the_face_camera() {
        let mut f = fixture();
        run(&mut f);
        let probe = Vec3::new(-10.0, 4.0, 0.0);
        for ((_, draws), face) in f.backend.draws_per_pass().iter().zip(CUBE_FACES.iter()) {
            let marker = draws.iter().find(|d| d.program == Program::ProbeMarker).unwrap();
            assert_eq!(marker.uniforms.view_from_world, face.view_matrix(probe));
            assert_eq!(marker.uniforms.projection_from_view, capture_projection());
            let env = draws.iter().find(|d| d.program == Program::Environment).unwrap();
            assert_eq!(env.depth_test, DepthTest::Equal);
            assert_eq!(env.uniforms.params.y, CAPTURE_FAR);
        }
    }
}
