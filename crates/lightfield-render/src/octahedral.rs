//! Octahedral sphere parameterization and the projector that resamples a
//! probe's cubemaps into 2D atlases
//!
//! A direction `d` is folded onto the octahedron `|x| + |y| + |z| = 1`, the
//! lower half is unfolded over the corners, and the result is a point in
//! `[-1, 1]²`. Texel `(i, j)` of an `N×N` atlas stores the direction at the
//! texel center `((i + 0.5) / N, (j + 0.5) / N) * 2 - 1`.

use crate::capture::CubemapSet;
use crate::gpu::{
    Attachment, Culling, DepthTest, DrawCall, DrawUniforms, Geometry, LoadOp, PassDesc, Program,
    RenderBackend, TextureDesc, TextureHandle, Viewport,
};
use crate::probe::ProbeConfig;
use crate::settings::AtlasChannel;
use crate::Result;
use glam::{UVec2, Vec2, Vec3, Vec4};

fn sign_not_zero(v: Vec2) -> Vec2 {
    Vec2::new(
        if v.x >= 0.0 { 1.0 } else { -1.0 },
        if v.y >= 0.0 { 1.0 } else { -1.0 },
    )
}

/// Direction to a point in `[-1, 1]²`
pub fn oct_encode(direction: Vec3) -> Vec2 {
    let n = direction / (direction.x.abs() + direction.y.abs() + direction.z.abs());
    let e = Vec2::new(n.x, n.y);
    if n.z < 0.0 {
        (Vec2::ONE - Vec2::new(e.y, e.x).abs()) * sign_not_zero(e)
    } else {
        e
    }
}

/// Point in `[-1, 1]²` to a unit direction
pub fn oct_decode(e: Vec2) -> Vec3 {
    let z = 1.0 - e.x.abs() - e.y.abs();
    let xy = if z < 0.0 {
        (Vec2::ONE - Vec2::new(e.y, e.x).abs()) * sign_not_zero(e)
    } else {
        e
    };
    Vec3::new(xy.x, xy.y, z).normalize()
}

/// Direction stored at the center of texel `texel` in a `size`×`size` atlas
pub fn texel_direction(texel: UVec2, size: u32) -> Vec3 {
    let uv = (texel.as_vec2() + 0.5) / size as f32;
    oct_decode(uv * 2.0 - 1.0)
}

/// Texel whose cell contains `direction`
pub fn direction_texel(direction: Vec3, size: u32) -> UVec2 {
    let uv = oct_encode(direction) * 0.5 + 0.5;
    (uv * size as f32)
        .floor()
        .clamp(Vec2::ZERO, Vec2::splat((size - 1) as f32))
        .as_uvec2()
}

/// The four 2D images a probe's data is resampled into
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct OctahedralAtlas {
    pub radiance: TextureHandle,
    pub normals: TextureHandle,
    pub distance_high: TextureHandle,
    pub distance_low: TextureHandle,
    pub size: u32,
    pub low_size: u32,
}

impl OctahedralAtlas {
    pub const RADIANCE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
    pub const NORMALS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
    pub const DISTANCE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R16Float;

    pub fn new(backend: &mut dyn RenderBackend, config: &ProbeConfig) -> Result<Self> {
        config.validate()?;
        let size = config.octahedral_size;
        let low_size = config.low_res_size();
        let atlas = Self {
            radiance: backend.create_texture(&TextureDesc::target(
                "Octahedral Radiance",
                size,
                Self::RADIANCE_FORMAT,
            ))?,
            normals: backend.create_texture(&TextureDesc::target(
                "Octahedral Normals",
                size,
                Self::NORMALS_FORMAT,
            ))?,
            distance_high: backend.create_texture(&TextureDesc::target(
                "Octahedral Distance High",
                size,
                Self::DISTANCE_FORMAT,
            ))?,
            distance_low: backend.create_texture(&TextureDesc::target(
                "Octahedral Distance Low",
                low_size,
                Self::DISTANCE_FORMAT,
            ))?,
            size,
            low_size,
        };
        log::info!("Octahedral atlases allocated: {0}x{0}, low {1}x{1}", size, low_size);
        Ok(atlas)
    }

    pub fn channel(&self, channel: AtlasChannel) -> TextureHandle {
        match channel {
            AtlasChannel::Radiance => self.radiance,
            AtlasChannel::DistanceHigh => self.distance_high,
            AtlasChannel::DistanceLow => self.distance_low,
            AtlasChannel::Normals => self.normals,
        }
    }

    /// Textures in the order the shading program binds them
    pub fn shading_textures(&self) -> [TextureHandle; 4] {
        [self.radiance, self.normals, self.distance_high, self.distance_low]
    }
}

/// Owns the atlases and refreshes them from a [`CubemapSet`]
pub struct OctahedralProjector {
    atlas: OctahedralAtlas,
}

impl OctahedralProjector {
    pub fn new(backend: &mut dyn RenderBackend, config: &ProbeConfig) -> Result<Self> {
        Ok(Self {
            atlas: OctahedralAtlas::new(backend, config)?,
        })
    }

    pub fn atlas(&self) -> &OctahedralAtlas {
        &self.atlas
    }

    /// Overwrite every atlas texel from the cubemaps
    ///
    /// The low resolution distance is sampled again along its own texel
    /// directions rather than filtered down from the high resolution result.
    pub fn project(&self, backend: &mut dyn RenderBackend, cubemaps: &CubemapSet) -> Result<()> {
        let atlas = &self.atlas;
        let sources = [cubemaps.radiance_distance, cubemaps.normals];

        backend.begin_pass(&PassDesc {
            label: "Octahedral Projection",
            color: vec![
                Some(Attachment::texture(atlas.radiance)),
                Some(Attachment::texture(atlas.distance_high)),
                Some(Attachment::texture(atlas.normals)),
            ],
            depth: None,
            load: LoadOp::Clear,
            viewport: Viewport::Square(atlas.size),
            culling: Culling::None,
        })?;
        backend.draw(&Self::draw_call(&sources, atlas.size))?;
        backend.end_pass()?;

        backend.begin_pass(&PassDesc {
            label: "Octahedral Projection Low",
            color: vec![None, Some(Attachment::texture(atlas.distance_low))],
            depth: None,
            load: LoadOp::Clear,
            viewport: Viewport::Square(atlas.low_size),
            culling: Culling::None,
        })?;
        backend.draw(&Self::draw_call(&sources, atlas.low_size))?;
        backend.end_pass()?;

        log::debug!("Projected cubemaps into {} and {} atlases", atlas.size, atlas.low_size);
        Ok(())
    }

    fn draw_call(sources: &[TextureHandle], target_size: u32) -> DrawCall<'_> {
        DrawCall {
            program: Program::OctahedralProject,
            geometry: Geometry::FullscreenTriangle,
            material: None,
            textures: sources,
            depth_test: DepthTest::Disabled,
            uniforms: DrawUniforms {
                params: Vec4::new(target_size as f32, 0.0, 0.0, 0.0),
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CubemapCapture;
    use crate::gpu::recording::RecordingBackend;
    use crate::probe::{capture_projection, CUBE_FACES};

    fn sample_directions() -> Vec<Vec3> {
        let mut dirs = vec![Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];
        for i in 0..24 {
            for j in 0..12 {
                let phi = i as f32 / 24.0 * std::f32::consts::TAU;
                let theta = (j as f32 + 0.5) / 12.0 * std::f32::consts::PI;
                dirs.push(Vec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin()));
            }
        }
        dirs
    }

    #[test]
    fn encode_decode_round_trip() {
        for d in sample_directions() {
            let e = oct_encode(d);
            assert!(e.x.abs() <= 1.0 + 1e-6 && e.y.abs() <= 1.0 + 1e-6);
            let back = oct_decode(e);
            assert!((back - d).length() < 1e-5, "{:?} -> {:?} -> {:?}", d, e, back);
        }
    }

    #[test]
    fn texel_round_trip() {
        let size = 64;
        for y in 0..size {
            for x in 0..size {
                let texel = UVec2::new(x, y);
                assert_eq!(direction_texel(texel_direction(texel, size), size), texel);
            }
        }
    }

    #[test]
    fn seam_texels_stay_on_the_sphere() {
        let size = 16;
        for i in 0..size {
            for texel in [UVec2::new(i, 0), UVec2::new(0, i), UVec2::new(i, size - 1), UVec2::new(size - 1, i)] {
                let d = texel_direction(texel, size);
                assert!((d.length() - 1.0).abs() < 1e-5);
                assert!(d.is_finite());
            }
        }
    }

    /// Every atlas texel must look at a direction some cube face captured
    #[test]
    fn atlas_directions_covered_by_capture_faces() {
        let size = 64;
        let projection = capture_projection();
        let origin = Vec3::new(-10.0, 4.0, 0.0);
        for y in 0..size {
            for x in 0..size {
                let d = texel_direction(UVec2::new(x, y), size);
                let covered = CUBE_FACES.iter().any(|face| {
                    let clip = projection * face.view_matrix(origin).mul_vec4((origin + d * 10.0).extend(1.0));
                    if clip.w <= 0.0 {
                        return false;
                    }
                    let ndc = clip.truncate() / clip.w;
                    ndc.x.abs() <= 1.0 + 1e-4 && ndc.y.abs() <= 1.0 + 1e-4 && (0.0..=1.0).contains(&ndc.z)
                });
                assert!(covered, "texel ({}, {}) direction {:?} uncovered", x, y, d);
            }
        }
    }

    #[test]
    fn projector_runs_two_full_screen_passes() {
        let mut backend = RecordingBackend::new();
        let config = ProbeConfig::new().with_cube_size(64).with_octahedral_size(256);
        let capture = CubemapCapture::new(&mut backend, &config).unwrap();
        let projector = OctahedralProjector::new(&mut backend, &config).unwrap();
        let atlas = *projector.atlas();
        assert_eq!(backend.texture_desc(atlas.distance_low).width, 256 / 16);
        assert_eq!(backend.texture_desc(atlas.distance_low).height, 256 / 16);

        projector.project(&mut backend, capture.cubemaps()).unwrap();
        let passes = backend.draws_per_pass();
        assert_eq!(passes.len(), 2);

        let (high, high_draws) = &passes[0];
        assert_eq!(high.viewport, Viewport::Square(256));
        assert_eq!(high.color.len(), 3);
        assert_eq!(high.color[1], Some(Attachment::texture(atlas.distance_high)));
        assert!(high.depth.is_none());

        let (low, low_draws) = &passes[1];
        assert_eq!(low.viewport, Viewport::Square(16));
        assert_eq!(low.color, vec![None, Some(Attachment::texture(atlas.distance_low))]);

        for draw in high_draws.iter().chain(low_draws.iter()) {
            assert_eq!(draw.program, Program::OctahedralProject);
            assert_eq!(draw.depth_test, DepthTest::Disabled);
            assert_eq!(
                draw.textures,
                vec![capture.cubemaps().radiance_distance, capture.cubemaps().normals]
            );
        }
        assert_eq!(low_draws[0].uniforms.params.x, 16.0);
    }
}
