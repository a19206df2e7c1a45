//! Asynchronous scene loading
//!
//! Loader threads produce [`LoadedMesh`] values and push them over an
//! `async-channel`. The frame loop drains the receiving end between frames,
//! so the mesh list only ever grows while no frame is being recorded.

use crate::mesh::{Material, MeshData};
use crate::{Error, Result};
use async_channel::{Receiver, Sender, TryRecvError};
use glam::Mat4;

/// CPU-side mesh ready to upload
#[derive(Clone, Debug)]
pub struct LoadedMesh {
    pub label: String,
    pub data: MeshData,
    pub material: Material,
    pub transform: Mat4,
}

impl LoadedMesh {
    pub fn new(label: impl Into<String>, data: MeshData, material: Material, transform: Mat4) -> Self {
        Self {
            label: label.into(),
            data,
            material,
            transform,
        }
    }
}

/// Producer side, handed to loader threads
#[derive(Clone)]
pub struct MeshSender {
    sender: Sender<LoadedMesh>,
}

impl MeshSender {
    pub fn send(&self, mesh: LoadedMesh) -> Result<()> {
        self.sender
            .try_send(mesh)
            .map_err(|e| Error::Loader(format!("scene no longer accepts meshes: {}", e)))
    }
}

/// Consumer side, owned by the [`crate::Scene`]
pub struct SceneLoader {
    receiver: Receiver<LoadedMesh>,
}

impl SceneLoader {
    pub fn channel() -> (MeshSender, SceneLoader) {
        let (sender, receiver) = async_channel::unbounded();
        (MeshSender { sender }, SceneLoader { receiver })
    }

    /// Run `load` on its own thread
    pub fn spawn<F>(load: F) -> Result<SceneLoader>
    where
        F: FnOnce(MeshSender) + Send + 'static,
    {
        let (sender, loader) = Self::channel();
        std::thread::Builder::new()
            .name("scene-loader".into())
            .spawn(move || load(sender))
            .map_err(|e| Error::Loader(format!("failed to start loader thread: {}", e)))?;
        Ok(loader)
    }

    /// Everything completed so far, without blocking
    pub fn drain(&self) -> Vec<LoadedMesh> {
        let mut out = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(mesh) => out.push(mesh),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        out
    }

    /// All senders dropped and nothing left to drain
    pub fn is_finished(&self) -> bool {
        self.receiver.is_closed() && self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawned_loader_delivers_in_order() {
        let loader = SceneLoader::spawn(|sender| {
            for i in 0..4 {
                let mesh = LoadedMesh::new(
                    format!("cube {}", i),
                    MeshData::cube([i as f32, 0.0, 0.0], 0.5),
                    Material::default(),
                    Mat4::IDENTITY,
                );
                if sender.send(mesh).is_err() {
                    return;
                }
            }
        })
        .unwrap();

        let mut received = Vec::new();
        while !loader.is_finished() {
            received.extend(loader.drain());
            std::thread::yield_now();
        }
        received.extend(loader.drain());
        let labels: Vec<_> = received.iter().map(|m| m.label.as_str()).collect();
        assert_eq!(labels, ["cube 0", "cube 1", "cube 2", "cube 3"]);
    }

    #[test]
    fn send_after_loader_dropped_fails() {
        let (sender, loader) = SceneLoader::channel();
        drop(loader);
        let mesh = LoadedMesh::new("late", MeshData::default(), Material::default(), Mat4::IDENTITY);
        assert!(matches!(sender.send(mesh), Err(Error::Loader(_))));
    }
}
