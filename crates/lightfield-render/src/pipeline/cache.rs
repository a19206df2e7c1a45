//! Pipeline cache keyed by everything a draw's render state depends on

use crate::gpu::{Culling, DepthTest, Program};
use crate::mesh::PackedVertex;
use crate::resources::{BindGroupLayouts, GpuInstances};
use crate::shaders;
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Key for pipeline cache lookup
#[derive(Hash, Eq, PartialEq, Clone, Debug)]
pub struct PipelineKey {
    pub program: Program,
    /// Colour target formats by location, `None` for unbound locations
    pub colors: Vec<Option<wgpu::TextureFormat>>,
    pub depth: Option<wgpu::TextureFormat>,
    pub depth_test: DepthTest,
    pub culling: Culling,
}

impl PipelineKey {
    /// Culling only applies to scene meshes; markers and full-screen
    /// programs are drawn two-sided.
    fn cull_mode(&self) -> Option<wgpu::Face> {
        match self.program {
            Program::Shading | Program::Precompute | Program::ShadowDepth => match self.culling {
                Culling::Back => Some(wgpu::Face::Back),
                Culling::Front => Some(wgpu::Face::Front),
                Culling::None => None,
            },
            _ => None,
        }
    }

    fn depth_stencil(&self) -> Option<wgpu::DepthStencilState> {
        let format = self.depth?;
        let (depth_write_enabled, depth_compare) = match self.depth_test {
            DepthTest::LessEqual => (true, wgpu::CompareFunction::LessEqual),
            DepthTest::Equal => (false, wgpu::CompareFunction::Equal),
            DepthTest::Disabled => (false, wgpu::CompareFunction::Always),
        };
        Some(wgpu::DepthStencilState {
            format,
            depth_write_enabled,
            depth_compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        })
    }
}

/// Pipeline cache manages compiled pipelines, created lazily on first use
pub struct PipelineCache {
    device: Arc<wgpu::Device>,
    cache: HashMap<PipelineKey, Arc<wgpu::RenderPipeline>>,
    shader_modules: HashMap<Program, Arc<wgpu::ShaderModule>>,
    layouts: HashMap<Program, Arc<wgpu::PipelineLayout>>,
}

impl PipelineCache {
    pub fn new(device: Arc<wgpu::Device>) -> Self {
        Self {
            device,
            cache: HashMap::new(),
            shader_modules: HashMap::new(),
            layouts: HashMap::new(),
        }
    }

    /// Get or create the pipeline for `key`
    pub fn get_or_create(
        &mut self,
        key: &PipelineKey,
        bind_group_layouts: &BindGroupLayouts,
    ) -> Result<Arc<wgpu::RenderPipeline>> {
        // Return cached pipeline if it exists
        if let Some(pipeline) = self.cache.get(key) {
            return Ok(pipeline.clone());
        }

        log::info!("Creating pipeline: {:?}", key);

        let program = key.program;
        let shader = self.shader_module(program);
        let layout = self.pipeline_layout(program, bind_group_layouts);

        let vertex_buffers = match program {
            Program::Shading | Program::Precompute | Program::ShadowDepth => {
                vec![PackedVertex::vertex_buffer_layout()]
            }
            Program::ProbeMarker => vec![
                PackedVertex::vertex_buffer_layout(),
                GpuInstances::vertex_buffer_layout(),
            ],
            Program::Environment | Program::OctahedralProject | Program::TextureBlit => Vec::new(),
        };

        let targets: Vec<Option<wgpu::ColorTargetState>> = key
            .colors
            .iter()
            .map(|format| {
                format.map(|format| wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let label = format!("{} Pipeline", program.name());
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&label),
            layout: Some(layout.as_ref()),
            cache: None,
            vertex: wgpu::VertexState {
                module: shader.as_ref(),
                entry_point: Some(shaders::VERTEX_ENTRY),
                buffers: &vertex_buffers,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: shader.as_ref(),
                entry_point: Some(shaders::fragment_entry(program, key.colors.len())),
                targets: &targets,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: key.cull_mode(),
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: key.depth_stencil(),
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
        });

        let pipeline = Arc::new(pipeline);
        self.cache.insert(key.clone(), pipeline.clone());
        Ok(pipeline)
    }

    fn shader_module(&mut self, program: Program) -> Arc<wgpu::ShaderModule> {
        let device = &self.device;
        self.shader_modules
            .entry(program)
            .or_insert_with(|| {
                log::debug!("Compiling shader module: {}", program.name());
                Arc::new(device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(program.name()),
                    source: wgpu::ShaderSource::Wgsl(shaders::source(program).into()),
                }))
            })
            .clone()
    }

    fn pipeline_layout(
        &mut self,
        program: Program,
        bind_group_layouts: &BindGroupLayouts,
    ) -> Arc<wgpu::PipelineLayout> {
        let device = &self.device;
        self.layouts
            .entry(program)
            .or_insert_with(|| {
                Arc::new(device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some(&format!("{}_layout", program.name())),
                    bind_group_layouts: &bind_group_layouts.pipeline_layouts(program),
                    push_constant_ranges: &[],
                }))
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(program: Program, culling: Culling, depth_test: DepthTest) -> PipelineKey {
        PipelineKey {
            program,
            colors: vec![Some(wgpu::TextureFormat::Rgba16Float)],
            depth: Some(wgpu::TextureFormat::Depth32Float),
            depth_test,
            culling,
        }
    }

    #[test]
    fn culling_only_applies_to_meshes() {
        assert_eq!(key(Program::Precompute, Culling::Front, DepthTest::LessEqual).cull_mode(), Some(wgpu::Face::Front));
        assert_eq!(key(Program::ProbeMarker, Culling::Front, DepthTest::LessEqual).cull_mode(), None);
        assert_eq!(key(Program::Environment, Culling::Back, DepthTest::Equal).cull_mode(), None);
    }

    #[test]
    fn equal_depth_never_writes() {
        let state = key(Program::Environment, Culling::None, DepthTest::Equal).depth_stencil().unwrap();
        assert_eq!(state.depth_compare, wgpu::CompareFunction::Equal);
        assert!(!state.depth_write_enabled);

        let mut blit = key(Program::TextureBlit, Culling::None, DepthTest::Disabled);
        blit.depth = None;
        assert!(blit.depth_stencil().is_none());
    }
}
