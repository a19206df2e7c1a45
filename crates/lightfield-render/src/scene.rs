//! Scene database – meshes, probes and the directional light the frame
//! loop renders

use crate::gpu::{
    DepthTest, DrawCall, DrawUniforms, Geometry, MaterialHandle, Program, RenderBackend,
    TextureHandle,
};
use crate::light::DirectionalLight;
use crate::loader::{LoadedMesh, SceneLoader};
use crate::mesh::{Material, MeshData};
use crate::probe::ProbeSet;
use crate::Result;
use glam::Mat4;

/// Geometry + material bound to one program
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DrawBinding {
    pub program: Program,
    pub geometry: Geometry,
    pub material: Option<MaterialHandle>,
}

impl DrawBinding {
    /// One draw of this binding with a complete uniform set
    pub fn draw<'a>(
        &self,
        textures: &'a [TextureHandle],
        depth_test: DepthTest,
        uniforms: DrawUniforms,
    ) -> DrawCall<'a> {
        DrawCall {
            program: self.program,
            geometry: self.geometry,
            material: self.material,
            textures,
            depth_test,
            uniforms,
        }
    }
}

/// A renderable object: one piece of geometry drawn three ways
#[derive(Clone, Debug)]
pub struct Mesh {
    pub label: String,
    pub transform: Mat4,
    pub shading: DrawBinding,
    pub precompute: DrawBinding,
    pub shadow: DrawBinding,
}

impl Mesh {
    /// Upload geometry and material, and bind them to every mesh program
    pub fn upload(
        backend: &mut dyn RenderBackend,
        data: &MeshData,
        material: &Material,
        transform: Mat4,
        label: impl Into<String>,
    ) -> Result<Self> {
        data.validate()?;
        let geometry = Geometry::Mesh(backend.upload_mesh(data)?);
        let material = Some(backend.create_material(material)?);
        Ok(Self {
            label: label.into(),
            transform,
            shading: DrawBinding { program: Program::Shading, geometry, material },
            precompute: DrawBinding { program: Program::Precompute, geometry, material },
            shadow: DrawBinding { program: Program::ShadowDepth, geometry, material: None },
        })
    }
}

/// The scene database – defines all rendered content
///
/// Meshes only ever get appended. The frame loop takes the mesh count once
/// per frame and renders that prefix.
pub struct Scene {
    meshes: Vec<Mesh>,
    pub probes: ProbeSet,
    pub light: DirectionalLight,
    loader: Option<SceneLoader>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            meshes: Vec::new(),
            probes: ProbeSet::new(),
            light: DirectionalLight::default(),
            loader: None,
        }
    }

    pub fn with_light(mut self, light: DirectionalLight) -> Self {
        self.light = light;
        self
    }

    pub fn with_probes(mut self, probes: ProbeSet) -> Self {
        self.probes = probes;
        self
    }

    /// Meshes will stream in from `loader` through [`Scene::poll_loader`]
    pub fn with_loader(mut self, loader: SceneLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn add_mesh(&mut self, mesh: Mesh) {
        self.meshes.push(mesh);
    }

    /// Upload and append one loaded mesh
    pub fn append(&mut self, backend: &mut dyn RenderBackend, loaded: LoadedMesh) -> Result<()> {
        let mesh = Mesh::upload(backend, &loaded.data, &loaded.material, loaded.transform, loaded.label)?;
        log::debug!("Mesh '{}' appended ({} total)", mesh.label, self.meshes.len() + 1);
        self.meshes.push(mesh);
        Ok(())
    }

    /// Append every mesh the loader finished since the last call.
    /// Returns how many were added.
    ///
    /// A malformed mesh is skipped without holding back the rest of the
    /// batch; the first such error is returned once the batch is appended.
    pub fn poll_loader(&mut self, backend: &mut dyn RenderBackend) -> Result<usize> {
        let Some(loader) = &self.loader else {
            return Ok(0);
        };
        let loaded = loader.drain();
        let finished = loader.is_finished();

        let mut count = 0;
        let mut first_error = None;
        for mesh in loaded {
            let label = mesh.label.clone();
            match self.append(backend, mesh) {
                Ok(()) => count += 1,
                Err(e) => {
                    log::warn!("Skipping mesh '{}': {}", label, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        if finished {
            log::info!("Scene loading finished with {} meshes", self.meshes.len());
            self.loader = None;
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(count),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loader.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::recording::RecordingBackend;

    #[test]
    fn upload_binds_one_geometry_three_ways() {
        let mut backend = RecordingBackend::new();
        let mesh = Mesh::upload(
            &mut backend,
            &MeshData::plane([0.0; 3], 10.0),
            &Material::default(),
            Mat4::IDENTITY,
            "floor",
        )
        .unwrap();
        assert_eq!(mesh.shading.geometry, mesh.precompute.geometry);
        assert_eq!(mesh.shading.geometry, mesh.shadow.geometry);
        assert_eq!(mesh.shading.program, Program::Shading);
        assert_eq!(mesh.precompute.program, Program::Precompute);
        assert_eq!(mesh.shadow.program, Program::ShadowDepth);
        assert!(mesh.shadow.material.is_none());
        assert_eq!(backend.meshes.len(), 1);
    }

    #[test]
    fn malformed_mesh_is_not_appended() {
        let mut backend = RecordingBackend::new();
        let mut scene = Scene::new();
        let mut data = MeshData::plane([0.0; 3], 1.0);
        data.indices.push(42);
        let loaded = LoadedMesh::new("broken", data, Material::default(), Mat4::IDENTITY);
        assert!(scene.append(&mut backend, loaded).is_err());
        assert!(scene.meshes().is_empty());
    }

    #[test]
    fn malformed_mesh_does_not_hold_back_the_batch() {
        let mut backend = RecordingBackend::new();
        let (sender, loader) = SceneLoader::channel();
        let mut scene = Scene::new().with_loader(loader);

        let mut bad = MeshData::plane([0.0; 3], 1.0);
        bad.indices.push(42);
        sender
            .send(LoadedMesh::new("bad", bad, Material::default(), Mat4::IDENTITY))
            .unwrap();
        sender
            .send(LoadedMesh::new("good", MeshData::cube([0.0; 3], 1.0), Material::default(), Mat4::IDENTITY))
            .unwrap();

        assert!(scene.poll_loader(&mut backend).is_err());
        assert_eq!(scene.meshes().len(), 1);
        assert_eq!(scene.meshes()[0].label, "good");

        // nothing is replayed on the next poll
        assert_eq!(scene.poll_loader(&mut backend).unwrap(), 0);
        assert_eq!(scene.meshes().len(), 1);
    }

    #[test]
    fn loader_meshes_are_appended_between_frames() {
        let mut backend = RecordingBackend::new();
        let (sender, loader) = SceneLoader::channel();
        let mut scene = Scene::new().with_loader(loader);

        assert_eq!(scene.poll_loader(&mut backend).unwrap(), 0);
        sender
            .send(LoadedMesh::new("a", MeshData::cube([0.0; 3], 1.0), Material::default(), Mat4::IDENTITY))
            .unwrap();
        sender
            .send(LoadedMesh::new("b", MeshData::cube([2.0, 0.0, 0.0], 1.0), Material::default(), Mat4::IDENTITY))
            .unwrap();
        assert_eq!(scene.poll_loader(&mut backend).unwrap(), 2);
        assert_eq!(scene.meshes().len(), 2);
        assert!(scene.is_loading());

        drop(sender);
        assert_eq!(scene.poll_loader(&mut backend).unwrap(), 0);
        assert!(!scene.is_loading());
        assert_eq!(scene.meshes()[1].label, "b");
    }
}
