//! Lightfield Render - light field probe precompute on wgpu
//!
//! Bakes a probe's view of the scene into cubemaps (radiance + distance,
//! normals), re-projects them into octahedral atlases for cheap runtime
//! lookup, and drives the per-frame loop that decides what must be re-rendered:
//!
//! - Shadow map rendered only when the light or the mesh count changes
//! - Precompute (capture + projection) runs only on an explicit request
//! - Every GPU interaction goes through the [`RenderBackend`] contract, with
//!   [`WgpuBackend`] as the production implementation

pub mod gpu;
pub mod pipeline;
pub mod resources;
pub mod shaders;
pub mod mesh;
pub mod scene;
pub mod loader;
pub mod octahedral;
pub mod probe;
pub mod environment;
pub mod shadow;
pub mod capture;
pub mod precompute;
pub mod frame;
pub mod settings;
pub mod pacing;

mod backend;
mod camera;
mod light;

pub use backend::WgpuBackend;
pub use camera::{view_space_direction, Camera};
pub use capture::{CubemapCapture, CubemapSet};
pub use environment::Environment;
pub use frame::{FrameLoop, FrameReport};
pub use gpu::{DepthTest, DrawCall, DrawUniforms, PassDesc, Program, RenderBackend};
pub use light::DirectionalLight;
pub use loader::{LoadedMesh, SceneLoader};
pub use mesh::{Material, MeshData, PackedVertex};
pub use octahedral::{OctahedralAtlas, OctahedralProjector};
pub use precompute::PrecomputeScheduler;
pub use probe::{Probe, ProbeConfig, ProbeSet};
pub use scene::{Mesh, Scene};
pub use settings::{AtlasChannel, Settings};
pub use shadow::{ShadowCache, ShadowMap};

/// Result type for renderer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during rendering
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unsupported environment: {0}")]
    Unsupported(String),

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Pass error: {0}")]
    Pass(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Loader error: {0}")]
    Loader(String),

    #[error("WGPU error: {0}")]
    Wgpu(String),
}

impl From<wgpu::Error> for Error {
    fn from(err: wgpu::Error) -> Self {
        Error::Wgpu(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}
