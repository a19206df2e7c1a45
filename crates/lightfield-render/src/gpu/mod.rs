//! GPU resource contract
//!
//! The probe pipeline never talks to wgpu directly. Components describe the
//! passes and draws they need as plain data and hand them to a
//! [`RenderBackend`]. [`crate::WgpuBackend`] turns them into wgpu commands;
//! tests use a recording double.
//!
//! A draw is a pure description: program, geometry, textures, depth test and a
//! complete [`DrawUniforms`] block. Nothing about a draw survives it, so a
//! draw that is skipped for a frame cannot leave stale state behind.

#[cfg(test)]
pub(crate) mod recording;

use crate::mesh::{Material, MeshData};
use crate::Result;
use glam::{Mat4, Vec3, Vec4};

/// Opaque handle to a backend texture (2D or cube)
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct TextureHandle(pub u32);

/// Opaque handle to uploaded vertex + index buffers
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub struct MeshHandle(pub u32);

/// Opaque handle to a per-instance position buffer
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub struct InstanceHandle(pub u32);

/// Opaque handle to a material bind group
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub struct MaterialHandle(pub u32);

#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum TextureKind {
    D2,
    /// Six square layers in +X, -X, +Y, -Y, +Z, -Z order
    Cube,
}

impl TextureKind {
    pub fn layers(self) -> u32 {
        match self {
            TextureKind::D2 => 1,
            TextureKind::Cube => 6,
        }
    }
}

/// Texture allocation request
#[derive(Debug, Clone)]
pub struct TextureDesc {
    pub label: &'static str,
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    /// Whether passes may render into the texture
    pub render_target: bool,
}

impl TextureDesc {
    /// Square 2D render target
    pub fn target(label: &'static str, size: u32, format: wgpu::TextureFormat) -> Self {
        Self {
            label,
            kind: TextureKind::D2,
            width: size,
            height: size,
            format,
            render_target: true,
        }
    }

    /// Cube render target with `size`×`size` faces
    pub fn cube_target(label: &'static str, size: u32, format: wgpu::TextureFormat) -> Self {
        Self {
            kind: TextureKind::Cube,
            ..Self::target(label, size, format)
        }
    }

    /// Sample-only 2D texture filled through `write_texture`
    pub fn sampled(label: &'static str, width: u32, height: u32, format: wgpu::TextureFormat) -> Self {
        Self {
            label,
            kind: TextureKind::D2,
            width,
            height,
            format,
            render_target: false,
        }
    }
}

/// Where a pass writes
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Attachment {
    /// The presentation surface of the current frame
    Surface,
    /// The surface-sized depth buffer owned by the backend
    SurfaceDepth,
    /// One layer of a texture (cube face index for cubemaps)
    Texture { texture: TextureHandle, layer: u32 },
}

impl Attachment {
    pub fn texture(texture: TextureHandle) -> Self {
        Attachment::Texture { texture, layer: 0 }
    }

    pub fn cube_face(texture: TextureHandle, face: u32) -> Self {
        Attachment::Texture { texture, layer: face }
    }
}

/// Attachment load behaviour. Clears go to black and depth 1.0.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LoadOp {
    Clear,
    Load,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Viewport {
    /// Whole attachment
    Full,
    /// `(0, 0, size, size)`
    Square(u32),
}

/// Triangle culling applied to mesh programs
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub enum Culling {
    Back,
    /// Used when the projection mirrors the image and flips winding
    Front,
    None,
}

/// Render pass description: framebuffer binding + viewport + clear
#[derive(Debug, Clone, PartialEq)]
pub struct PassDesc {
    pub label: &'static str,
    /// Colour attachments by output location; `None` leaves a location unbound
    pub color: Vec<Option<Attachment>>,
    pub depth: Option<Attachment>,
    pub load: LoadOp,
    pub viewport: Viewport,
    pub culling: Culling,
}

/// Per-draw depth comparison. Blending is always disabled.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub enum DepthTest {
    LessEqual,
    /// Only fills texels whose depth still equals the incoming depth
    Equal,
    Disabled,
}

/// Shader programs the pipeline knows how to draw with
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub enum Program {
    /// Live shading. Textures: shadow depth, radiance, normals,
    /// distanceHigh, distanceLow
    Shading,
    /// Probe capture shading into radiance+distance and normals targets.
    /// Textures: shadow depth
    Precompute,
    /// Depth written from the light's point of view
    ShadowDepth,
    /// Instanced unlit spheres at probe positions
    ProbeMarker,
    /// Full-screen equirectangular background. Textures: environment map
    Environment,
    /// Full-screen cubemap to octahedral resample.
    /// Textures: radiance+distance cube, normals cube
    OctahedralProject,
    /// Full-screen copy of one texture. Textures: source
    TextureBlit,
}

impl Program {
    pub const ALL: [Program; 7] = [
        Program::Shading,
        Program::Precompute,
        Program::ShadowDepth,
        Program::ProbeMarker,
        Program::Environment,
        Program::OctahedralProject,
        Program::TextureBlit,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Program::Shading => "shading",
            Program::Precompute => "precompute",
            Program::ShadowDepth => "shadow_depth",
            Program::ProbeMarker => "probe_marker",
            Program::Environment => "environment",
            Program::OctahedralProject => "octahedral",
            Program::TextureBlit => "texture_blit",
        }
    }

    /// Number of textures a draw with this program must bind
    pub fn texture_count(self) -> usize {
        match self {
            Program::Shading => 5,
            Program::Precompute => 1,
            Program::Environment => 1,
            Program::OctahedralProject => 2,
            Program::TextureBlit => 1,
            Program::ShadowDepth | Program::ProbeMarker => 0,
        }
    }

    /// Whether draws bind a material (group 2)
    pub fn uses_material(self) -> bool {
        matches!(self, Program::Shading | Program::Precompute)
    }
}

/// What a draw rasterizes
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Geometry {
    Mesh(MeshHandle),
    /// One copy of `mesh` per entry of the instance buffer
    Instanced { mesh: MeshHandle, instances: InstanceHandle },
    /// Three vertices generated in the vertex shader, covering the viewport
    FullscreenTriangle,
}

/// Uniform block shared by every program (matches `DrawUniforms` in common.wgsl)
///
/// Programs read the fields they need and ignore the rest.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawUniforms {
    pub world_from_local: Mat4,
    pub view_from_world: Mat4,
    pub projection_from_view: Mat4,
    pub light_projection_from_world: Mat4,
    /// Inverse view-projection, used by full-screen background passes
    pub world_from_projection: Mat4,
    pub camera_position: Vec4,
    pub dir_light_color: Vec4,
    /// Direction the light travels, in the rendering camera's view space
    pub dir_light_view_direction: Vec4,
    pub ambient_color: Vec4,
    /// xyz: probe grid start, w: low resolution downsample factor
    pub probe_position: Vec4,
    /// xyz: probe grid step, w: probe count
    pub probe_step: Vec4,
    pub color: Vec4,
    /// Program specific scalars (see each program's shader)
    pub params: Vec4,
}

impl Default for DrawUniforms {
    fn default() -> Self {
        Self {
            world_from_local: Mat4::IDENTITY,
            view_from_world: Mat4::IDENTITY,
            projection_from_view: Mat4::IDENTITY,
            light_projection_from_world: Mat4::IDENTITY,
            world_from_projection: Mat4::IDENTITY,
            camera_position: Vec4::ZERO,
            dir_light_color: Vec4::ZERO,
            dir_light_view_direction: Vec4::ZERO,
            ambient_color: Vec4::ZERO,
            probe_position: Vec4::ZERO,
            probe_step: Vec4::ZERO,
            color: Vec4::ONE,
            params: Vec4::ZERO,
        }
    }
}

/// A single draw submission
#[derive(Debug, Clone)]
pub struct DrawCall<'a> {
    pub program: Program,
    pub geometry: Geometry,
    pub material: Option<MaterialHandle>,
    /// Program-ordered textures, see [`Program`]
    pub textures: &'a [TextureHandle],
    pub depth_test: DepthTest,
    pub uniforms: DrawUniforms,
}

/// GPU capability the probe pipeline depends on
///
/// Implementations issue commands in submission order from a single thread.
/// Passes do not nest: every `begin_pass` is closed by `end_pass` before the
/// next one starts, and draws only happen inside a pass.
pub trait RenderBackend {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle>;

    /// Replace the whole content of a sample-only texture
    fn write_texture(&mut self, texture: TextureHandle, data: &[u8]) -> Result<()>;

    fn upload_mesh(&mut self, mesh: &MeshData) -> Result<MeshHandle>;

    fn upload_instances(&mut self, positions: &[Vec3]) -> Result<InstanceHandle>;

    fn create_material(&mut self, material: &Material) -> Result<MaterialHandle>;

    fn begin_pass(&mut self, pass: &PassDesc) -> Result<()>;

    /// Record one draw into the open pass. On error the open pass and any
    /// unsubmitted work are dropped, so the next frame starts clean.
    fn draw(&mut self, draw: &DrawCall<'_>) -> Result<()>;

    fn end_pass(&mut self) -> Result<()>;

    /// Hand recorded work to the GPU without waiting for it
    fn submit(&mut self) -> Result<()>;

    /// Submit and block until the GPU has finished all work
    fn finish(&mut self) -> Result<()>;
}
