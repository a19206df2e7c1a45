//! GPU resources behind the handles of the render contract

mod bindgroup;
mod uniforms;

pub use bindgroup::{program_slots, BindGroupLayouts, Slot};
pub use uniforms::{UniformArena, UNIFORM_ARENA_SIZE_BYTES};

use crate::gpu::{
    InstanceHandle, MaterialHandle, MeshHandle, Program, TextureDesc, TextureHandle, TextureKind,
};
use crate::mesh::{Material, MeshData};
use crate::{Error, Result};
use glam::Vec3;
use std::collections::HashMap;
use std::sync::Arc;
use wgpu::util::DeviceExt;

/// Texture plus the views passes and bind groups need
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub desc: TextureDesc,
    /// Whole-resource view for sampling (cube view for cubemaps)
    pub sample_view: wgpu::TextureView,
    /// One 2D view per layer, used as render attachments
    pub layer_views: Vec<wgpu::TextureView>,
}

/// GPU-resident mesh (owns wgpu vertex + index buffers)
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

pub struct GpuInstances {
    pub buffer: wgpu::Buffer,
    pub count: u32,
}

impl GpuInstances {
    pub fn vertex_buffer_layout() -> wgpu::VertexBufferLayout<'static> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![5 => Float32x3];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &ATTRIBUTES,
        }
    }
}

#[derive(Hash, Eq, PartialEq, Clone)]
struct BindGroupKey {
    program: Program,
    textures: Vec<TextureHandle>,
}

/// Owns every GPU object created through the contract
pub struct ResourceRegistry {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,

    /// Standard bind group layouts shared by all pipelines
    pub layouts: BindGroupLayouts,

    textures: Vec<GpuTexture>,
    meshes: Vec<GpuMesh>,
    instances: Vec<GpuInstances>,
    materials: Vec<wgpu::BindGroup>,

    clamp_sampler: wgpu::Sampler,
    wrap_sampler: wgpu::Sampler,
    comparison_sampler: wgpu::Sampler,

    // Bind group cache
    bind_group_cache: HashMap<BindGroupKey, Arc<wgpu::BindGroup>>,
}

impl ResourceRegistry {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        let layouts = BindGroupLayouts::new(&device);
        let linear = wgpu::SamplerDescriptor {
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        };
        let clamp_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Clamp Sampler"),
            ..linear.clone()
        });
        let wrap_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Wrap Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            ..linear.clone()
        });
        let comparison_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Shadow Comparison Sampler"),
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..linear
        });

        Self {
            device,
            queue,
            layouts,
            textures: Vec::new(),
            meshes: Vec::new(),
            instances: Vec::new(),
            materials: Vec::new(),
            clamp_sampler,
            wrap_sampler,
            comparison_sampler,
            bind_group_cache: HashMap::new(),
        }
    }

    pub fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(Error::Resource(format!("'{}' has zero size", desc.label)));
        }
        if desc.kind == TextureKind::Cube && desc.width != desc.height {
            return Err(Error::Resource(format!("cubemap '{}' faces must be square", desc.label)));
        }

        let layers = desc.kind.layers();
        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING;
        usage |= if desc.render_target {
            wgpu::TextureUsages::RENDER_ATTACHMENT
        } else {
            wgpu::TextureUsages::COPY_DST
        };

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage,
            view_formats: &[],
        });

        let aspect = if desc.format.has_depth_aspect() {
            wgpu::TextureAspect::DepthOnly
        } else {
            wgpu::TextureAspect::All
        };
        let sample_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(desc.label),
            dimension: Some(match desc.kind {
                TextureKind::D2 => wgpu::TextureViewDimension::D2,
                TextureKind::Cube => wgpu::TextureViewDimension::Cube,
            }),
            aspect,
            ..Default::default()
        });
        let layer_views = (0..layers)
            .map(|layer| {
                texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some(desc.label),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_array_layer: layer,
                    array_layer_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();

        self.textures.push(GpuTexture {
            texture,
            desc: desc.clone(),
            sample_view,
            layer_views,
        });
        let handle = TextureHandle(self.textures.len() as u32 - 1);
        log::debug!(
            "Created texture '{}' {:?} {}x{} {:?} as {:?}",
            desc.label,
            desc.kind,
            desc.width,
            desc.height,
            desc.format,
            handle
        );
        Ok(handle)
    }

    pub fn texture(&self, handle: TextureHandle) -> Result<&GpuTexture> {
        self.textures
            .get(handle.0 as usize)
            .ok_or_else(|| Error::Resource(format!("unknown texture {:?}", handle)))
    }

    pub fn write_texture(&mut self, handle: TextureHandle, data: &[u8]) -> Result<()> {
        let gpu = self.texture(handle)?;
        let desc = &gpu.desc;
        if desc.render_target || desc.kind != TextureKind::D2 {
            return Err(Error::Resource(format!("'{}' is not an uploadable 2D texture", desc.label)));
        }
        let texel_size = desc
            .format
            .block_copy_size(None)
            .ok_or_else(|| Error::Resource(format!("'{}' format cannot be uploaded", desc.label)))?;
        let bytes_per_row = desc.width * texel_size;
        let expected = bytes_per_row as usize * desc.height as usize;
        if data.len() != expected {
            return Err(Error::Resource(format!(
                "'{}' expects {} bytes, got {}",
                desc.label,
                expected,
                data.len()
            )));
        }

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &gpu.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(desc.height),
            },
            wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    pub fn upload_mesh(&mut self, mesh: &MeshData) -> Result<MeshHandle> {
        mesh.validate()?;
        let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Vertex Buffer"),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Index Buffer"),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        self.meshes.push(GpuMesh {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
        });
        Ok(MeshHandle(self.meshes.len() as u32 - 1))
    }

    pub fn mesh(&self, handle: MeshHandle) -> Result<&GpuMesh> {
        self.meshes
            .get(handle.0 as usize)
            .ok_or_else(|| Error::Resource(format!("unknown mesh {:?}", handle)))
    }

    pub fn upload_instances(&mut self, positions: &[Vec3]) -> Result<InstanceHandle> {
        let data: Vec<[f32; 3]> = positions.iter().map(|p| p.to_array()).collect();
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Instance Position Buffer"),
            contents: bytemuck::cast_slice(&data),
            usage: wgpu::BufferUsages::VERTEX,
        });
        self.instances.push(GpuInstances {
            buffer,
            count: positions.len() as u32,
        });
        Ok(InstanceHandle(self.instances.len() as u32 - 1))
    }

    pub fn instances(&self, handle: InstanceHandle) -> Result<&GpuInstances> {
        self.instances
            .get(handle.0 as usize)
            .ok_or_else(|| Error::Resource(format!("unknown instance buffer {:?}", handle)))
    }

    pub fn create_material(&mut self, material: &Material) -> Result<MaterialHandle> {
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Material Uniform Buffer"),
            contents: bytemuck::bytes_of(&material.uniform()),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Material Bind Group"),
            layout: &self.layouts.material,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        self.materials.push(bind_group);
        Ok(MaterialHandle(self.materials.len() as u32 - 1))
    }

    pub fn material(&self, handle: MaterialHandle) -> Result<&wgpu::BindGroup> {
        self.materials
            .get(handle.0 as usize)
            .ok_or_else(|| Error::Resource(format!("unknown material {:?}", handle)))
    }

    /// Group 1 bind group for `program` over `textures`, cached by handles
    pub fn texture_bind_group(
        &mut self,
        program: Program,
        textures: &[TextureHandle],
    ) -> Result<Arc<wgpu::BindGroup>> {
        let key = BindGroupKey {
            program,
            textures: textures.to_vec(),
        };
        if let Some(bind_group) = self.bind_group_cache.get(&key) {
            return Ok(bind_group.clone());
        }

        if textures.len() != program.texture_count() {
            return Err(Error::Resource(format!(
                "{} expects {} textures, got {}",
                program.name(),
                program.texture_count(),
                textures.len()
            )));
        }

        let mut remaining = textures.iter();
        let mut entries = Vec::new();
        for (binding, slot) in program_slots(program).iter().enumerate() {
            let resource = match slot {
                Slot::ClampSampler => wgpu::BindingResource::Sampler(&self.clamp_sampler),
                Slot::WrapSampler => wgpu::BindingResource::Sampler(&self.wrap_sampler),
                Slot::ComparisonSampler => wgpu::BindingResource::Sampler(&self.comparison_sampler),
                Slot::Float2d | Slot::FloatCube | Slot::Depth2d => {
                    let handle = remaining.next().ok_or_else(|| {
                        Error::Resource(format!("{} is missing a texture", program.name()))
                    })?;
                    wgpu::BindingResource::TextureView(&self.texture(*handle)?.sample_view)
                }
            };
            entries.push(wgpu::BindGroupEntry {
                binding: binding as u32,
                resource,
            });
        }

        let bind_group = Arc::new(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} Textures Bind Group", program.name())),
            layout: self.layouts.textures(program),
            entries: &entries,
        }));
        log::debug!("Cached {} bind group for {:?}", program.name(), textures);
        self.bind_group_cache.insert(key, bind_group.clone());
        Ok(bind_group)
    }
}
