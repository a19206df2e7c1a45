//! On-demand probe precompute: capture, projection, GPU sync

use crate::capture::{CaptureScene, CubemapCapture};
use crate::gpu::RenderBackend;
use crate::octahedral::OctahedralProjector;
use crate::probe::ProbeSet;
use crate::Result;
use std::time::{Duration, Instant};

/// One-shot precompute request flag
///
/// Requests made before a pending one runs coalesce into it.
#[derive(Debug, Default)]
pub struct PrecomputeScheduler {
    requested: bool,
    last_duration: Option<Duration>,
}

impl PrecomputeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self) {
        if self.requested {
            log::debug!("Precompute already pending");
        }
        self.requested = true;
    }

    pub fn is_requested(&self) -> bool {
        self.requested
    }

    /// Wall-clock time of the last completed precompute, GPU work included
    pub fn last_duration(&self) -> Option<Duration> {
        self.last_duration
    }

    /// Capture the active probe and project it, blocking until the GPU is
    /// done. Returns whether a precompute ran.
    ///
    /// Without a probe the request is dropped and nothing is recorded.
    pub fn run_if_requested(
        &mut self,
        backend: &mut dyn RenderBackend,
        probes: &ProbeSet,
        capture: &CubemapCapture,
        projector: &OctahedralProjector,
        scene: &CaptureScene<'_>,
    ) -> Result<bool> {
        if !self.requested {
            return Ok(false);
        }
        let Some(probe) = probes.active() else {
            log::warn!("Precompute requested with no probes; ignoring");
            self.requested = false;
            return Ok(false);
        };

        let start = Instant::now();
        capture.capture(backend, probe, scene)?;
        projector.project(backend, capture.cubemaps())?;
        backend.finish()?;
        let elapsed = start.elapsed();

        log::info!("Precompute took {} ms", elapsed.as_millis());
        self.last_duration = Some(elapsed);
        self.requested = false;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::recording::{Command, RecordingBackend};
    use crate::light::DirectionalLight;
    use crate::probe::ProbeConfig;
    use crate::shadow::ShadowMap;
    use glam::Vec3;

    struct Parts {
        backend: RecordingBackend,
        capture: CubemapCapture,
        projector: OctahedralProjector,
        shadow_map: ShadowMap,
        light: DirectionalLight,
    }

    fn parts() -> Parts {
        let mut backend = RecordingBackend::new();
        let config = ProbeConfig::new().with_cube_size(16).with_octahedral_size(64).with_shadow_map_size(64);
        let capture = CubemapCapture::new(&mut backend, &config).unwrap();
        let projector = OctahedralProjector::new(&mut backend, &config).unwrap();
        let shadow_map = ShadowMap::new(&mut backend, config.shadow_map_size).unwrap();
        Parts {
            backend,
            capture,
            projector,
            shadow_map,
            light: DirectionalLight::default(),
        }
    }

    fn run(scheduler: &mut PrecomputeScheduler, p: &mut Parts, probes: &ProbeSet) -> bool {
        let scene = CaptureScene {
            meshes: &[],
            light: &p.light,
            shadow_map: &p.shadow_map,
            markers: None,
            environment: None,
            ambient_color: Vec3::ZERO,
            environment_brightness: 1.0,
        };
        scheduler
            .run_if_requested(&mut p.backend, probes, &p.capture, &p.projector, &scene)
            .unwrap()
    }

    #[test]
    fn nothing_happens_without_request() {
        let mut p = parts();
        let mut scheduler = PrecomputeScheduler::new();
        let probes = ProbeSet::new().with_probe(Vec3::ZERO);
        assert!(!run(&mut scheduler, &mut p, &probes));
        assert!(p.backend.commands.is_empty());
    }

    #[test]
    fn request_runs_once_and_clears() {
        let mut p = parts();
        let mut scheduler = PrecomputeScheduler::new();
        let probes = ProbeSet::new().with_probe(Vec3::new(-10.0, 4.0, 0.0));
        scheduler.request();
        scheduler.request();
        assert!(run(&mut scheduler, &mut p, &probes));
        assert!(!scheduler.is_requested());
        assert!(scheduler.last_duration().is_some());

        // six faces then two projection passes, then one blocking sync
        assert_eq!(p.backend.passes().len(), 8);
        assert!(matches!(p.backend.commands.last(), Some(Command::Finish)));
        assert_eq!(p.backend.count(|c| matches!(c, Command::Finish)), 1);

        p.backend.clear_commands();
        assert!(!run(&mut scheduler, &mut p, &probes));
        assert!(p.backend.commands.is_empty());
    }

    #[test]
    fn zero_probes_is_a_no_op() {
        let mut p = parts();
        let mut scheduler = PrecomputeScheduler::new();
        scheduler.request();
        assert!(!run(&mut scheduler, &mut p, &ProbeSet::new()));
        assert!(p.backend.commands.is_empty());
        assert!(!scheduler.is_requested());
        assert!(scheduler.last_duration().is_none());
    }
}
