//! Light field probes, the cube face table used to capture them, and the
//! static sizing of every probe resource

use crate::gpu::{
    DepthTest, DrawCall, DrawUniforms, Geometry, InstanceHandle, MeshHandle, Program, RenderBackend,
};
use crate::mesh::MeshData;
use crate::{Error, Result};
use glam::{Mat4, Vec3, Vec4};

/// Vertical field of view of a capture face
pub const CAPTURE_FOV_Y: f32 = std::f32::consts::FRAC_PI_2;
pub const CAPTURE_NEAR: f32 = 0.1;
/// Also the distance written for directions that only see the environment
pub const CAPTURE_FAR: f32 = 100.0;

/// A world-space sample point for precomputed lighting
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Probe {
    pub position: Vec3,
}

impl Probe {
    pub fn new(position: Vec3) -> Self {
        Self { position }
    }
}

/// Ordered, append-only probe collection
///
/// Only the first probe is captured and shaded with; the rest are still
/// drawn as markers.
#[derive(Clone, Debug, Default)]
pub struct ProbeSet {
    probes: Vec<Probe>,
}

impl ProbeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_probe(mut self, position: Vec3) -> Self {
        self.push(position);
        self
    }

    pub fn push(&mut self, position: Vec3) {
        self.probes.push(Probe::new(position));
    }

    /// The probe that precompute captures and shading samples
    pub fn active(&self) -> Option<&Probe> {
        self.probes.first()
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Probe> {
        self.probes.iter()
    }

    pub fn positions(&self) -> Vec<Vec3> {
        self.probes.iter().map(|p| p.position).collect()
    }
}

/// Look direction and up vector of one cube face
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CubeFace {
    pub look: Vec3,
    pub up: Vec3,
}

/// Faces in cube layer order. The ±Y faces use a perpendicular up vector.
pub const CUBE_FACES: [CubeFace; 6] = [
    CubeFace { look: Vec3::new(1.0, 0.0, 0.0), up: Vec3::new(0.0, -1.0, 0.0) },
    CubeFace { look: Vec3::new(-1.0, 0.0, 0.0), up: Vec3::new(0.0, -1.0, 0.0) },
    CubeFace { look: Vec3::new(0.0, 1.0, 0.0), up: Vec3::new(0.0, 0.0, 1.0) },
    CubeFace { look: Vec3::new(0.0, -1.0, 0.0), up: Vec3::new(0.0, 0.0, -1.0) },
    CubeFace { look: Vec3::new(0.0, 0.0, 1.0), up: Vec3::new(0.0, -1.0, 0.0) },
    CubeFace { look: Vec3::new(0.0, 0.0, -1.0), up: Vec3::new(0.0, -1.0, 0.0) },
];

impl CubeFace {
    pub fn view_matrix(&self, origin: Vec3) -> Mat4 {
        Mat4::look_at_rh(origin, origin + self.look, self.up)
    }
}

/// Square 90° projection shared by all faces
///
/// The image is mirrored vertically so that rasterized rows land where cube
/// sampling expects them. This also flips triangle winding, so capture
/// passes cull front faces.
pub fn capture_projection() -> Mat4 {
    Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0))
        * Mat4::perspective_rh(CAPTURE_FOV_Y, 1.0, CAPTURE_NEAR, CAPTURE_FAR)
}

/// Resolution of every probe resource, fixed at setup
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ProbeConfig {
    pub cube_size: u32,
    pub octahedral_size: u32,
    pub low_res_downsample: u32,
    pub shadow_map_size: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            cube_size: 1024,
            octahedral_size: 1024,
            low_res_downsample: 16,
            shadow_map_size: 4096,
        }
    }
}

impl ProbeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cube_size(mut self, size: u32) -> Self {
        self.cube_size = size;
        self
    }

    pub fn with_octahedral_size(mut self, size: u32) -> Self {
        self.octahedral_size = size;
        self
    }

    pub fn with_low_res_downsample(mut self, factor: u32) -> Self {
        self.low_res_downsample = factor;
        self
    }

    pub fn with_shadow_map_size(mut self, size: u32) -> Self {
        self.shadow_map_size = size;
        self
    }

    /// Side length of the distanceLow atlas
    pub fn low_res_size(&self) -> u32 {
        self.octahedral_size / self.low_res_downsample.max(1)
    }

    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("cube_size", self.cube_size),
            ("octahedral_size", self.octahedral_size),
            ("low_res_downsample", self.low_res_downsample),
            ("shadow_map_size", self.shadow_map_size),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, v)| *v == 0) {
            return Err(Error::Config(format!("{} must be non-zero", name)));
        }
        if self.octahedral_size % self.low_res_downsample != 0 {
            return Err(Error::Config(format!(
                "octahedral size {} is not divisible by downsample factor {}",
                self.octahedral_size, self.low_res_downsample
            )));
        }
        Ok(())
    }
}

/// Small unlit spheres drawn at every probe position
pub struct ProbeMarkers {
    sphere: MeshHandle,
    instances: InstanceHandle,
    color: Vec3,
}

impl ProbeMarkers {
    pub const RADIUS: f32 = 0.08;
    pub const COLOR: Vec3 = Vec3::new(0.0, 1.0, 0.0);

    /// Upload marker geometry; `None` when there is nothing to mark
    pub fn new(backend: &mut dyn RenderBackend, probes: &ProbeSet) -> Result<Option<Self>> {
        if probes.is_empty() {
            return Ok(None);
        }
        let sphere = backend.upload_mesh(&MeshData::sphere(Self::RADIUS, 8, 8))?;
        let instances = backend.upload_instances(&probes.positions())?;
        log::debug!("Probe markers uploaded for {} probes", probes.len());
        Ok(Some(Self {
            sphere,
            instances,
            color: Self::COLOR,
        }))
    }

    /// One instanced draw for all markers
    pub fn draw_call(&self, view: Mat4, projection: Mat4, eye: Vec3) -> DrawCall<'static> {
        DrawCall {
            program: Program::ProbeMarker,
            geometry: Geometry::Instanced {
                mesh: self.sphere,
                instances: self.instances,
            },
            material: None,
            textures: &[],
            depth_test: DepthTest::LessEqual,
            uniforms: DrawUniforms {
                view_from_world: view,
                projection_from_view: projection,
                camera_position: eye.extend(1.0),
                color: self.color.extend(1.0),
                params: Vec4::new(0.0, CAPTURE_FAR, 0.0, 0.0),
                ..Default::default()
            },
        }
    }
}
