//! Per-frame driver
//!
//! Order within a frame:
//!
//! 1. snapshot camera matrices and the mesh count
//! 2. redraw the shadow map if the light or mesh count changed
//! 3. either run a pending precompute or draw the live scene, never both
//! 4. probe markers and the environment on top of whatever the frame drew
//! 5. optional full-screen atlas overlay, last and without depth testing

use crate::camera::Camera;
use crate::capture::{CaptureScene, CubemapCapture, CubemapSet};
use crate::environment::Environment;
use crate::gpu::{
    Attachment, Culling, DepthTest, DrawCall, DrawUniforms, Geometry, LoadOp, PassDesc, Program,
    RenderBackend, Viewport,
};
use crate::octahedral::{OctahedralAtlas, OctahedralProjector};
use crate::precompute::PrecomputeScheduler;
use crate::probe::{ProbeConfig, ProbeMarkers};
use crate::scene::{Mesh, Scene};
use crate::settings::{AtlasChannel, Settings};
use crate::shadow::{ShadowCache, ShadowMap};
use crate::Result;
use glam::{Mat4, Vec3, Vec4};

/// Distance mapped to white by the debug overlay
const DEBUG_DISTANCE_RANGE: f32 = 30.0;

/// What a call to [`FrameLoop::render_frame`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameReport {
    pub shadow_rendered: bool,
    pub precomputed: bool,
    pub scene_rendered: bool,
    pub overlay: Option<AtlasChannel>,
    pub mesh_count: usize,
}

/// Camera matrices fixed for the duration of one frame
struct FrameCamera {
    view: Mat4,
    projection: Mat4,
    eye: Vec3,
    light_view_direction: Vec3,
}

pub struct FrameLoop {
    pub settings: Settings,
    pub scene: Scene,
    pub camera: Camera,
    config: ProbeConfig,
    shadow_cache: ShadowCache,
    shadow_map: ShadowMap,
    capture: CubemapCapture,
    projector: OctahedralProjector,
    scheduler: PrecomputeScheduler,
    markers: Option<ProbeMarkers>,
    environment: Option<Environment>,
    frame_index: u64,
}

impl FrameLoop {
    /// Allocate every probe resource up front
    pub fn new(
        backend: &mut dyn RenderBackend,
        config: ProbeConfig,
        settings: Settings,
        scene: Scene,
        camera: Camera,
    ) -> Result<Self> {
        config.validate()?;
        let shadow_map = ShadowMap::new(backend, config.shadow_map_size)?;
        let capture = CubemapCapture::new(backend, &config)?;
        let projector = OctahedralProjector::new(backend, &config)?;
        let markers = ProbeMarkers::new(backend, &scene.probes)?;
        log::info!("Frame loop ready with {} probes", scene.probes.len());

        Ok(Self {
            settings,
            scene,
            camera,
            config,
            shadow_cache: ShadowCache::new(),
            shadow_map,
            capture,
            projector,
            scheduler: PrecomputeScheduler::new(),
            markers,
            environment: None,
            frame_index: 0,
        })
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn set_environment(&mut self, environment: Environment) {
        self.environment = Some(environment);
    }

    pub fn request_precompute(&mut self) {
        self.scheduler.request();
    }

    pub fn scheduler(&self) -> &PrecomputeScheduler {
        &self.scheduler
    }

    pub fn atlas(&self) -> &OctahedralAtlas {
        self.projector.atlas()
    }

    pub fn cubemaps(&self) -> &CubemapSet {
        self.capture.cubemaps()
    }

    pub fn shadow_map(&self) -> &ShadowMap {
        &self.shadow_map
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.camera.resize(width, height);
    }

    /// Bring in meshes finished by the scene loader. Call between frames.
    pub fn append_loaded_meshes(&mut self, backend: &mut dyn RenderBackend) -> Result<usize> {
        self.scene.poll_loader(backend)
    }

    pub fn render_frame(&mut self, backend: &mut dyn RenderBackend) -> Result<FrameReport> {
        let camera = FrameCamera {
            view: self.camera.view_matrix(),
            projection: self.camera.projection_matrix(),
            eye: self.camera.position,
            light_view_direction: self.scene.light.view_space_direction(self.camera.orientation),
        };
        let meshes = self.scene.meshes();
        let mesh_count = meshes.len();
        let light = &self.scene.light;
        let ambient_color = Vec3::from(self.settings.ambient_color);

        let shadow_rendered = self.shadow_cache.needs_render(light.direction, mesh_count);
        if shadow_rendered {
            if let Err(e) = self.shadow_map.render(backend, meshes, light) {
                // retry on the next frame
                self.shadow_cache.invalidate();
                return Err(e);
            }
        }

        let capture_scene = CaptureScene {
            meshes,
            light,
            shadow_map: &self.shadow_map,
            markers: self.markers.as_ref(),
            environment: self.environment.as_ref(),
            ambient_color,
            environment_brightness: self.settings.environment_brightness,
        };
        let precomputed = self.scheduler.run_if_requested(
            backend,
            &self.scene.probes,
            &self.capture,
            &self.projector,
            &capture_scene,
        )?;

        backend.begin_pass(&PassDesc {
            label: "Main",
            color: vec![Some(Attachment::Surface)],
            depth: Some(Attachment::SurfaceDepth),
            load: LoadOp::Clear,
            viewport: Viewport::Full,
            culling: Culling::Back,
        })?;
        if !precomputed {
            self.draw_scene(backend, meshes, &camera, ambient_color)?;
        }
        if let Some(markers) = &self.markers {
            backend.draw(&markers.draw_call(camera.view, camera.projection, camera.eye))?;
        }
        if let Some(environment) = &self.environment {
            backend.draw(&environment.draw_call(
                camera.projection * camera.view,
                camera.eye,
                self.settings.environment_brightness,
                self.camera.far,
            ))?;
        }
        backend.end_pass()?;

        let overlay = if self.settings.debug_show_probe {
            let channel = self.settings.debug_probe_map;
            self.draw_overlay(backend, channel)?;
            Some(channel)
        } else {
            None
        };

        backend.submit()?;
        self.frame_index += 1;

        Ok(FrameReport {
            shadow_rendered,
            precomputed,
            scene_rendered: !precomputed,
            overlay,
            mesh_count,
        })
    }

    fn draw_scene(
        &self,
        backend: &mut dyn RenderBackend,
        meshes: &[Mesh],
        camera: &FrameCamera,
        ambient_color: Vec3,
    ) -> Result<()> {
        let atlas = self.projector.atlas();
        let [radiance, normals, distance_high, distance_low] = atlas.shading_textures();
        let textures = [self.shadow_map.depth, radiance, normals, distance_high, distance_low];

        // Only the active probe is wired into shading
        let (probe_position, probe_count) = match self.scene.probes.active() {
            Some(probe) => (probe.position, 1.0),
            None => (Vec3::ZERO, 0.0),
        };
        let base = DrawUniforms {
            view_from_world: camera.view,
            projection_from_view: camera.projection,
            light_projection_from_world: self.scene.light.view_projection(),
            camera_position: camera.eye.extend(1.0),
            dir_light_color: self.scene.light.color.extend(1.0),
            dir_light_view_direction: camera.light_view_direction.extend(0.0),
            ambient_color: ambient_color.extend(1.0),
            probe_position: probe_position.extend(self.config.low_res_downsample as f32),
            probe_step: Vec4::new(1.0, 1.0, 1.0, probe_count),
            ..Default::default()
        };

        for mesh in meshes {
            backend.draw(&mesh.shading.draw(
                &textures,
                DepthTest::LessEqual,
                DrawUniforms {
                    world_from_local: mesh.transform,
                    ..base
                },
            ))?;
        }
        log::trace!("Scene pass drew {} meshes", meshes.len());
        Ok(())
    }

    /// Full-screen view of one atlas channel of the (only) captured probe
    fn draw_overlay(&self, backend: &mut dyn RenderBackend, channel: AtlasChannel) -> Result<()> {
        let texture = [self.projector.atlas().channel(channel)];
        backend.begin_pass(&PassDesc {
            label: "Probe Debug Overlay",
            color: vec![Some(Attachment::Surface)],
            depth: None,
            load: LoadOp::Load,
            viewport: Viewport::Full,
            culling: Culling::None,
        })?;
        backend.draw(&DrawCall {
            program: Program::TextureBlit,
            geometry: Geometry::FullscreenTriangle,
            material: None,
            textures: &texture,
            depth_test: DepthTest::Disabled,
            uniforms: DrawUniforms {
                params: Vec4::new(
                    0.0,
                    if channel.is_distance() { 1.0 } else { 0.0 },
                    1.0 / DEBUG_DISTANCE_RANGE,
                    0.0,
                ),
                ..Default::default()
            },
        })?;
        backend.end_pass()
    }
}
