//! Per-submission arena for draw uniforms
//!
//! Each draw appends its `DrawUniforms` at an aligned offset and binds group 0
//! with that dynamic offset. The CPU copy is uploaded in one write right
//! before the command buffer is submitted, then the arena starts over.

use crate::gpu::DrawUniforms;
use crate::{Error, Result};

pub const UNIFORM_ARENA_SIZE_BYTES: u64 = 1024 * 1024 * 16;

pub struct UniformArena {
    buffer: wgpu::Buffer,
    staging: Vec<u8>,
    stride: u64,
}

impl UniformArena {
    pub fn new(device: &wgpu::Device) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Draw Uniform Arena"),
            size: UNIFORM_ARENA_SIZE_BYTES,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
        Self {
            buffer,
            staging: Vec::new(),
            stride: aligned_stride(std::mem::size_of::<DrawUniforms>() as u64, alignment),
        }
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Append `uniforms`, returning the dynamic offset to bind with
    pub fn push(&mut self, uniforms: &DrawUniforms) -> Result<u32> {
        let offset = self.staging.len() as u64;
        if offset + self.stride > UNIFORM_ARENA_SIZE_BYTES {
            return Err(Error::Resource(format!(
                "uniform arena exhausted after {} draws",
                offset / self.stride
            )));
        }
        self.staging.extend_from_slice(bytemuck::bytes_of(uniforms));
        self.staging.resize((offset + self.stride) as usize, 0);
        Ok(offset as u32)
    }

    /// Upload everything pushed since the last flush and start over
    pub fn flush(&mut self, queue: &wgpu::Queue) {
        if !self.staging.is_empty() {
            queue.write_buffer(&self.buffer, 0, &self.staging);
            self.staging.clear();
        }
    }
}

impl UniformArena {
    /// Drop everything pushed since the last flush without uploading it
    pub fn discard(&mut self) {
        self.staging.clear();
    }
}

fn aligned_stride(size: u64, alignment: u64) -> u64 {
    let alignment = alignment.max(1);
    (size + alignment - 1) / alignment * alignment
}
