//! In-memory [`RenderBackend`] that records every command for assertions

use super::{
    DepthTest, DrawCall, Geometry, InstanceHandle, MaterialHandle, MeshHandle, PassDesc, Program,
    RenderBackend, TextureDesc, TextureHandle,
};
use crate::mesh::{Material, MeshData};
use crate::{Error, Result};
use glam::Vec3;

/// Owned copy of a [`DrawCall`]
#[derive(Debug, Clone)]
pub struct RecordedDraw {
    pub program: Program,
    pub geometry: Geometry,
    pub material: Option<MaterialHandle>,
    pub textures: Vec<TextureHandle>,
    pub depth_test: DepthTest,
    pub uniforms: super::DrawUniforms,
}

#[derive(Debug, Clone)]
pub enum Command {
    BeginPass(PassDesc),
    Draw(RecordedDraw),
    EndPass,
    /// Open pass dropped after a failed draw
    AbandonPass,
    WriteTexture(TextureHandle),
    Submit,
    Finish,
}

#[derive(Default)]
pub struct RecordingBackend {
    pub commands: Vec<Command>,
    pub textures: Vec<TextureDesc>,
    pub meshes: Vec<MeshData>,
    pub instances: Vec<Vec<Vec3>>,
    pub materials: Vec<Material>,
    /// Number of upcoming draws that fail with a resource error
    pub failing_draws: usize,
    in_pass: bool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn passes(&self) -> Vec<&PassDesc> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::BeginPass(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn draws(&self) -> Vec<&RecordedDraw> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::Draw(d) => Some(d),
                _ => None,
            })
            .collect()
    }

    /// Draws grouped by the pass that contains them
    pub fn draws_per_pass(&self) -> Vec<(&PassDesc, Vec<&RecordedDraw>)> {
        let mut out: Vec<(&PassDesc, Vec<&RecordedDraw>)> = Vec::new();
        for command in &self.commands {
            match command {
                Command::BeginPass(p) => out.push((p, Vec::new())),
                Command::Draw(d) => {
                    if let Some((_, draws)) = out.last_mut() {
                        draws.push(d);
                    }
                }
                _ => {}
            }
        }
        out
    }

    pub fn texture_desc(&self, handle: TextureHandle) -> &TextureDesc {
        &self.textures[handle.0 as usize]
    }

    pub fn count(&self, pred: impl Fn(&Command) -> bool) -> usize {
        self.commands.iter().filter(|c| pred(c)).count()
    }
}

impl RenderBackend for RecordingBackend {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle> {
        self.textures.push(desc.clone());
        Ok(TextureHandle(self.textures.len() as u32 - 1))
    }

    fn write_texture(&mut self, texture: TextureHandle, _data: &[u8]) -> Result<()> {
        self.commands.push(Command::WriteTexture(texture));
        Ok(())
    }

    fn upload_mesh(&mut self, mesh: &MeshData) -> Result<MeshHandle> {
        self.meshes.push(mesh.clone());
        Ok(MeshHandle(self.meshes.len() as u32 - 1))
    }

    fn upload_instances(&mut self, positions: &[Vec3]) -> Result<InstanceHandle> {
        self.instances.push(positions.to_vec());
        Ok(InstanceHandle(self.instances.len() as u32 - 1))
    }

    fn create_material(&mut self, material: &Material) -> Result<MaterialHandle> {
        self.materials.push(*material);
        Ok(MaterialHandle(self.materials.len() as u32 - 1))
    }

    fn begin_pass(&mut self, pass: &PassDesc) -> Result<()> {
        if self.in_pass {
            return Err(Error::Pass(format!("'{}' started inside another pass", pass.label)));
        }
        self.in_pass = true;
        self.commands.push(Command::BeginPass(pass.clone()));
        Ok(())
    }

    fn draw(&mut self, draw: &DrawCall<'_>) -> Result<()> {
        if !self.in_pass {
            return Err(Error::Pass(format!("{} draw outside a pass", draw.program.name())));
        }
        let failure = if self.failing_draws > 0 {
            self.failing_draws -= 1;
            Some(Error::Resource(format!("{} draw rejected", draw.program.name())))
        } else if draw.textures.len() != draw.program.texture_count() {
            Some(Error::Resource(format!(
                "{} expects {} textures, got {}",
                draw.program.name(),
                draw.program.texture_count(),
                draw.textures.len()
            )))
        } else {
            None
        };
        if let Some(err) = failure {
            // matches the wgpu backend: the open pass is abandoned
            self.in_pass = false;
            self.commands.push(Command::AbandonPass);
            return Err(err);
        }
        self.commands.push(Command::Draw(RecordedDraw {
            program: draw.program,
            geometry: draw.geometry,
            material: draw.material,
            textures: draw.textures.to_vec(),
            depth_test: draw.depth_test,
            uniforms: draw.uniforms,
        }));
        Ok(())
    }

    fn end_pass(&mut self) -> Result<()> {
        if !self.in_pass {
            return Err(Error::Pass("end_pass without begin_pass".into()));
        }
        self.in_pass = false;
        self.commands.push(Command::EndPass);
        Ok(())
    }

    fn submit(&mut self) -> Result<()> {
        if self.in_pass {
            return Err(Error::Pass("submit with an open pass".into()));
        }
        self.commands.push(Command::Submit);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.in_pass {
            return Err(Error::Pass("finish with an open pass".into()));
        }
        self.commands.push(Command::Finish);
        Ok(())
    }
}
