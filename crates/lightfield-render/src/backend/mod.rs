//! wgpu implementation of the render contract
//!
//! Commands are recorded into one command encoder per submission. Passes are
//! held open across `draw` calls by detaching the render pass from the
//! encoder borrow; the encoder is only finished once the pass has ended.

use crate::gpu::{
    Attachment, Culling, DrawCall, Geometry, InstanceHandle, LoadOp, MaterialHandle, MeshHandle,
    PassDesc, RenderBackend, TextureDesc, TextureHandle, Viewport,
};
use crate::mesh::{Material, MeshData};
use crate::pipeline::{PipelineCache, PipelineKey};
use crate::probe::ProbeConfig;
use crate::resources::{ResourceRegistry, UniformArena};
use crate::{Error, Result};
use glam::Vec3;
use std::num::NonZeroU64;
use std::sync::Arc;

const SURFACE_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Depth32Float view at the given resolution; the view keeps its texture alive
fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let tex = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Surface Depth Texture"),
        size: wgpu::Extent3d { width: width.max(1), height: height.max(1), depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: SURFACE_DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    tex.create_view(&wgpu::TextureViewDescriptor::default())
}

struct ActivePass {
    pass: wgpu::RenderPass<'static>,
    colors: Vec<Option<wgpu::TextureFormat>>,
    depth: Option<wgpu::TextureFormat>,
    culling: Culling,
}

pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,

    resources: ResourceRegistry,
    pipelines: PipelineCache,
    uniforms: UniformArena,
    uniform_bind_group: wgpu::BindGroup,

    encoder: Option<wgpu::CommandEncoder>,
    pass: Option<ActivePass>,

    surface_format: wgpu::TextureFormat,
    surface_view: Option<wgpu::TextureView>,

    // Depth buffer (Depth32Float, recreated on resize)
    depth_view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl WgpuBackend {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        surface_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        log::info!("Creating wgpu probe backend");
        log::info!("  Surface format: {:?}", surface_format);
        log::info!("  Resolution: {}x{}", width, height);

        if surface_format.has_depth_aspect() || surface_format.is_compressed() {
            return Err(Error::Unsupported(format!(
                "surface format {:?} cannot be rendered to",
                surface_format
            )));
        }

        let resources = ResourceRegistry::new(device.clone(), queue.clone());
        let pipelines = PipelineCache::new(device.clone());
        let uniforms = UniformArena::new(&device);
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Draw Uniforms Bind Group"),
            layout: &resources.layouts.uniforms,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: uniforms.buffer(),
                    offset: 0,
                    size: NonZeroU64::new(std::mem::size_of::<crate::gpu::DrawUniforms>() as u64),
                }),
            }],
        });
        let depth_view = create_depth_view(&device, width, height);

        Ok(Self {
            device,
            queue,
            resources,
            pipelines,
            uniforms,
            uniform_bind_group,
            encoder: None,
            pass: None,
            surface_format,
            surface_view: None,
            depth_view,
            width,
            height,
        })
    }

    /// Pick an adapter compatible with `surface` and open a device on it
    #[cfg(not(target_arch = "wasm32"))]
    pub fn request_device(
        instance: &wgpu::Instance,
        surface: Option<&wgpu::Surface<'_>>,
    ) -> Result<(wgpu::Adapter, wgpu::Device, wgpu::Queue)> {
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: surface,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| Error::Unsupported("no compatible GPU adapter".into()))?;
        log::info!("Using adapter: {:?}", adapter.get_info());

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Probe Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        ))
        .map_err(|e| Error::Unsupported(format!("device request failed: {}", e)))?;
        Ok((adapter, device, queue))
    }

    /// Refuse probe sizes the device cannot allocate
    pub fn check_config(&self, config: &ProbeConfig) -> Result<()> {
        config.validate()?;
        let limits = self.device.limits();
        let largest = config
            .shadow_map_size
            .max(config.octahedral_size)
            .max(config.cube_size);
        if largest > limits.max_texture_dimension_2d {
            return Err(Error::Unsupported(format!(
                "probe textures of {} exceed the device limit of {}",
                largest, limits.max_texture_dimension_2d
            )));
        }
        if limits.max_texture_array_layers < 6 {
            return Err(Error::Unsupported("device cannot allocate six-layer cubemaps".into()));
        }
        Ok(())
    }

    /// Texture the next `Attachment::Surface` passes render into
    pub fn set_surface_target(&mut self, view: wgpu::TextureView) {
        self.surface_view = Some(view);
    }

    pub fn clear_surface_target(&mut self) {
        self.surface_view = None;
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        log::info!("Resizing backend to {}x{}", width, height);
        self.width = width;
        self.height = height;
        self.depth_view = create_depth_view(&self.device, width, height);
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn record_draw(&mut self, draw: &DrawCall<'_>) -> Result<()> {
        let active = self
            .pass
            .as_mut()
            .ok_or_else(|| Error::Pass(format!("{} draw outside a pass", draw.program.name())))?;

        let key = PipelineKey {
            program: draw.program,
            colors: active.colors.clone(),
            depth: active.depth,
            depth_test: draw.depth_test,
            culling: active.culling,
        };
        let pipeline = self.pipelines.get_or_create(&key, &self.resources.layouts)?;
        let textures = self.resources.texture_bind_group(draw.program, draw.textures)?;
        let offset = self.uniforms.push(&draw.uniforms)?;

        let pass = &mut active.pass;
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &self.uniform_bind_group, &[offset]);
        pass.set_bind_group(1, textures.as_ref(), &[]);
        if draw.program.uses_material() {
            let material = draw.material.ok_or_else(|| {
                Error::Resource(format!("{} draw without a material", draw.program.name()))
            })?;
            pass.set_bind_group(2, self.resources.material(material)?, &[]);
        }

        match draw.geometry {
            Geometry::Mesh(handle) => {
                let mesh = self.resources.mesh(handle)?;
                pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
            Geometry::Instanced { mesh, instances } => {
                let mesh = self.resources.mesh(mesh)?;
                let instances = self.resources.instances(instances)?;
                pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                pass.set_vertex_buffer(1, instances.buffer.slice(..));
                pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..mesh.index_count, 0, 0..instances.count);
            }
            Geometry::FullscreenTriangle => pass.draw(0..3, 0..1),
        }
        Ok(())
    }

    fn submit_encoder(&mut self) -> Result<Option<wgpu::SubmissionIndex>> {
        if self.pass.is_some() {
            return Err(Error::Pass("submit with an open pass".into()));
        }
        self.uniforms.flush(&self.queue);
        Ok(self
            .encoder
            .take()
            .map(|encoder| self.queue.submit(std::iter::once(encoder.finish()))))
    }
}

/// View and format behind an attachment
fn attachment_view<'a>(
    resources: &'a ResourceRegistry,
    surface: Option<&'a wgpu::TextureView>,
    surface_format: wgpu::TextureFormat,
    depth_view: &'a wgpu::TextureView,
    attachment: Attachment,
) -> Result<(&'a wgpu::TextureView, wgpu::TextureFormat)> {
    match attachment {
        Attachment::Surface => surface
            .map(|view| (view, surface_format))
            .ok_or_else(|| Error::Pass("no surface target set for this frame".into())),
        Attachment::SurfaceDepth => Ok((depth_view, SURFACE_DEPTH_FORMAT)),
        Attachment::Texture { texture, layer } => {
            let gpu = resources.texture(texture)?;
            if !gpu.desc.render_target {
                return Err(Error::Pass(format!("'{}' is not a render target", gpu.desc.label)));
            }
            let view = gpu.layer_views.get(layer as usize).ok_or_else(|| {
                Error::Pass(format!("'{}' has no layer {}", gpu.desc.label, layer))
            })?;
            Ok((view, gpu.desc.format))
        }
    }
}

impl RenderBackend for WgpuBackend {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle> {
        self.resources.create_texture(desc)
    }

    fn write_texture(&mut self, texture: TextureHandle, data: &[u8]) -> Result<()> {
        self.resources.write_texture(texture, data)
    }

    fn upload_mesh(&mut self, mesh: &MeshData) -> Result<MeshHandle> {
        self.resources.upload_mesh(mesh)
    }

    fn upload_instances(&mut self, positions: &[Vec3]) -> Result<InstanceHandle> {
        self.resources.upload_instances(positions)
    }

    fn create_material(&mut self, material: &Material) -> Result<MaterialHandle> {
        self.resources.create_material(material)
    }

    fn begin_pass(&mut self, desc: &PassDesc) -> Result<()> {
        if self.pass.is_some() {
            return Err(Error::Pass(format!("'{}' started inside another pass", desc.label)));
        }
        log::trace!("Begin pass '{}'", desc.label);

        let surface = self.surface_view.as_ref();
        let mut colors = Vec::with_capacity(desc.color.len());
        let mut color_attachments = Vec::with_capacity(desc.color.len());
        for attachment in &desc.color {
            let Some(attachment) = attachment else {
                colors.push(None);
                color_attachments.push(None);
                continue;
            };
            let (view, format) = attachment_view(
                &self.resources,
                surface,
                self.surface_format,
                &self.depth_view,
                *attachment,
            )?;
            colors.push(Some(format));
            color_attachments.push(Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: match desc.load {
                        LoadOp::Clear => wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        LoadOp::Load => wgpu::LoadOp::Load,
                    },
                    store: wgpu::StoreOp::Store,
                },
            }));
        }

        let depth = desc
            .depth
            .map(|attachment| {
                attachment_view(&self.resources, surface, self.surface_format, &self.depth_view, attachment)
            })
            .transpose()?;

        let device = &self.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Probe Encoder"),
            })
        });

        let mut pass = encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(desc.label),
                color_attachments: &color_attachments,
                depth_stencil_attachment: depth.map(|(view, _)| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: match desc.load {
                            LoadOp::Clear => wgpu::LoadOp::Clear(1.0),
                            LoadOp::Load => wgpu::LoadOp::Load,
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            })
            .forget_lifetime();

        if let Viewport::Square(size) = desc.viewport {
            pass.set_viewport(0.0, 0.0, size as f32, size as f32, 0.0, 1.0);
        }

        self.pass = Some(ActivePass {
            pass,
            colors,
            depth: depth.map(|(_, format)| format),
            culling: desc.culling,
        });
        Ok(())
    }

    fn draw(&mut self, draw: &DrawCall<'_>) -> Result<()> {
        let result = self.record_draw(draw);
        if let Err(e) = &result {
            log::error!("{} draw failed, dropping unsubmitted work: {}", draw.program.name(), e);
            self.pass = None;
            self.encoder = None;
            self.uniforms.discard();
        }
        result
    }

    fn end_pass(&mut self) -> Result<()> {
        // Dropping the pass ends it
        self.pass
            .take()
            .map(|_| ())
            .ok_or_else(|| Error::Pass("end_pass without begin_pass".into()))
    }

    fn submit(&mut self) -> Result<()> {
        self.submit_encoder().map(|_| ())
    }

    fn finish(&mut self) -> Result<()> {
        let maintain = match self.submit_encoder()? {
            Some(index) => wgpu::Maintain::WaitForSubmissionIndex(index),
            None => wgpu::Maintain::Wait,
        };
        let _ = self.device.poll(maintain);
        Ok(())
    }
}
