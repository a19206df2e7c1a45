//! Bind group layouts shared by every pipeline
//!
//! Every program uses the same group numbering:
//!
//! - Group 0: per-draw `DrawUniforms`, one dynamic offset per draw
//! - Group 1: the program's textures followed by its samplers
//! - Group 2: material uniform (shading and precompute only)

use crate::gpu::{DrawUniforms, Program};
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;

/// What occupies one binding of a program's texture group
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Slot {
    Float2d,
    FloatCube,
    Depth2d,
    /// Linear, clamp to edge
    ClampSampler,
    /// Linear, wraps horizontally (equirectangular maps)
    WrapSampler,
    ComparisonSampler,
}

impl Slot {
    pub fn is_texture(self) -> bool {
        matches!(self, Slot::Float2d | Slot::FloatCube | Slot::Depth2d)
    }

    fn binding_type(self) -> wgpu::BindingType {
        let texture = |sample_type, view_dimension| wgpu::BindingType::Texture {
            sample_type,
            view_dimension,
            multisampled: false,
        };
        let float = wgpu::TextureSampleType::Float { filterable: true };
        match self {
            Slot::Float2d => texture(float, wgpu::TextureViewDimension::D2),
            Slot::FloatCube => texture(float, wgpu::TextureViewDimension::Cube),
            Slot::Depth2d => texture(wgpu::TextureSampleType::Depth, wgpu::TextureViewDimension::D2),
            Slot::ClampSampler | Slot::WrapSampler => {
                wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
            }
            Slot::ComparisonSampler => {
                wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison)
            }
        }
    }
}

/// Group 1 layout of `program`, in binding order
pub fn program_slots(program: Program) -> &'static [Slot] {
    use Slot::*;
    match program {
        Program::Shading => &[
            Depth2d,
            Float2d,
            Float2d,
            Float2d,
            Float2d,
            ComparisonSampler,
            ClampSampler,
        ],
        Program::Precompute => &[Depth2d, ComparisonSampler],
        Program::Environment => &[Float2d, WrapSampler],
        Program::OctahedralProject => &[FloatCube, FloatCube, ClampSampler],
        Program::TextureBlit => &[Float2d, ClampSampler],
        Program::ShadowDepth | Program::ProbeMarker => &[],
    }
}

#[derive(Clone)]
pub struct BindGroupLayouts {
    pub uniforms: Arc<wgpu::BindGroupLayout>,
    pub material: Arc<wgpu::BindGroupLayout>,
    textures: HashMap<Program, Arc<wgpu::BindGroupLayout>>,
}

impl BindGroupLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let textures = Program::ALL
            .iter()
            .map(|&program| (program, Arc::new(Self::create_textures_layout(device, program))))
            .collect();
        Self {
            uniforms: Arc::new(Self::create_uniforms_layout(device)),
            material: Arc::new(Self::create_material_layout(device)),
            textures,
        }
    }

    /// Group 1 layout of `program`
    pub fn textures(&self, program: Program) -> &Arc<wgpu::BindGroupLayout> {
        // every program is inserted in `new`
        &self.textures[&program]
    }

    /// Layouts in group order for `program`
    pub fn pipeline_layouts(&self, program: Program) -> Vec<&wgpu::BindGroupLayout> {
        let mut layouts = vec![self.uniforms.as_ref(), self.textures(program).as_ref()];
        if program.uses_material() {
            layouts.push(self.material.as_ref());
        }
        layouts
    }

    /// Group 0: per-draw uniform block at a dynamic offset
    fn create_uniforms_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Draw Uniforms Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(std::mem::size_of::<DrawUniforms>() as u64),
                },
                count: None,
            }],
        })
    }

    /// Group 2: material data uniform
    fn create_material_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Material Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        })
    }

    fn create_textures_layout(device: &wgpu::Device, program: Program) -> wgpu::BindGroupLayout {
        let entries: Vec<_> = program_slots(program)
            .iter()
            .enumerate()
            .map(|(binding, slot)| wgpu::BindGroupLayoutEntry {
                binding: binding as u32,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: slot.binding_type(),
                count: None,
            })
            .collect();
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{} Textures Bind Group Layout", program.name())),
            entries: &entries,
        })
    }
}
