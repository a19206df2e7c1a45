//! CPU-side mesh data, vertex packing and material parameters

use crate::{Error, Result};
use glam::Vec3;

/// Vertex format matching `MeshVertex` in common.wgsl exactly (32 bytes)
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PackedVertex {
    pub position: [f32; 3],
    pub bitangent_sign: f32,
    pub tex_coords: [f32; 2],
    pub normal: u32,   // Packed SNORM8x4
    pub tangent: u32,  // Packed SNORM8x4
}

impl PackedVertex {
    pub fn new(position: [f32; 3], normal: [f32; 3], tex_coords: [f32; 2]) -> Self {
        Self {
            position,
            bitangent_sign: 1.0,
            tex_coords,
            normal: pack_snorm8x4(normal[0], normal[1], normal[2], 0.0),
            tangent: pack_snorm8x4(1.0, 0.0, 0.0, 1.0),
        }
    }

    /// Decoded normal, to 8-bit precision
    pub fn unpacked_normal(&self) -> Vec3 {
        let [x, y, z, _] = unpack_snorm8x4(self.normal);
        Vec3::new(x, y, z)
    }

    pub fn vertex_buffer_layout() -> wgpu::VertexBufferLayout<'static> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
            0 => Float32x3,
            1 => Float32,
            2 => Float32x2,
            3 => Uint32,
            4 => Uint32,
        ];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<PackedVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}

fn pack_snorm8x4(x: f32, y: f32, z: f32, w: f32) -> u32 {
    let xi = (x.clamp(-1.0, 1.0) * 127.0).round() as i8 as u8;
    let yi = (y.clamp(-1.0, 1.0) * 127.0).round() as i8 as u8;
    let zi = (z.clamp(-1.0, 1.0) * 127.0).round() as i8 as u8;
    let wi = (w.clamp(-1.0, 1.0) * 127.0).round() as i8 as u8;
    (xi as u32) | ((yi as u32) << 8) | ((zi as u32) << 16) | ((wi as u32) << 24)
}

fn unpack_snorm8x4(packed: u32) -> [f32; 4] {
    let c = |shift: u32| ((packed >> shift) as u8 as i8 as f32 / 127.0).max(-1.0);
    [c(0), c(8), c(16), c(24)]
}

/// Indexed triangle list ready for upload
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<PackedVertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn new(vertices: Vec<PackedVertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Axis-aligned cube centered at `center` with half-extent `half_size`
    pub fn cube(center: [f32; 3], half_size: f32) -> Self {
        let [cx, cy, cz] = center;
        let h = half_size;

        // 6 faces: (normal, [4 corners in CCW winding viewed from outside])
        let faces: &[([f32; 3], [[f32; 3]; 4])] = &[
            ([0.0, 0.0, 1.0], [[cx-h,cy-h,cz+h],[cx+h,cy-h,cz+h],[cx+h,cy+h,cz+h],[cx-h,cy+h,cz+h]]),
            ([0.0, 0.0,-1.0], [[cx+h,cy-h,cz-h],[cx-h,cy-h,cz-h],[cx-h,cy+h,cz-h],[cx+h,cy+h,cz-h]]),
            ([1.0, 0.0, 0.0], [[cx+h,cy-h,cz+h],[cx+h,cy-h,cz-h],[cx+h,cy+h,cz-h],[cx+h,cy+h,cz+h]]),
            ([-1.0,0.0, 0.0], [[cx-h,cy-h,cz-h],[cx-h,cy-h,cz+h],[cx-h,cy+h,cz+h],[cx-h,cy+h,cz-h]]),
            ([0.0, 1.0, 0.0], [[cx-h,cy+h,cz+h],[cx+h,cy+h,cz+h],[cx+h,cy+h,cz-h],[cx-h,cy+h,cz-h]]),
            ([0.0,-1.0, 0.0], [[cx-h,cy-h,cz-h],[cx+h,cy-h,cz-h],[cx+h,cy-h,cz+h],[cx-h,cy-h,cz+h]]),
        ];

        let uvs: [[f32; 2]; 4] = [[0.0,0.0],[1.0,0.0],[1.0,1.0],[0.0,1.0]];
        let mut vertices = Vec::with_capacity(24);
        let mut indices  = Vec::with_capacity(36);

        for (face_idx, (normal, corners)) in faces.iter().enumerate() {
            let base = (face_idx * 4) as u32;
            for (i, &pos) in corners.iter().enumerate() {
                vertices.push(PackedVertex::new(pos, *normal, uvs[i]));
            }
            indices.extend_from_slice(&[base, base+1, base+2, base, base+2, base+3]);
        }

        Self::new(vertices, indices)
    }

    /// Flat XZ plane facing +Y, centered at `center` with half-extent `half_extent`
    pub fn plane(center: [f32; 3], half_extent: f32) -> Self {
        let [cx, cy, cz] = center;
        let h = half_extent;
        let n = [0.0f32, 1.0, 0.0];
        let vertices = vec![
            PackedVertex::new([cx-h,cy,cz+h], n, [0.0,0.0]),
            PackedVertex::new([cx+h,cy,cz+h], n, [1.0,0.0]),
            PackedVertex::new([cx+h,cy,cz-h], n, [1.0,1.0]),
            PackedVertex::new([cx-h,cy,cz-h], n, [0.0,1.0]),
        ];
        Self::new(vertices, vec![0, 1, 2, 0, 2, 3])
    }

    /// UV sphere around the origin with `rings` latitude and `sectors`
    /// longitude subdivisions
    pub fn sphere(radius: f32, rings: u32, sectors: u32) -> Self {
        let rings = rings.max(2);
        let sectors = sectors.max(3);
        let mut vertices = Vec::with_capacity(((rings + 1) * (sectors + 1)) as usize);
        for r in 0..=rings {
            let v = r as f32 / rings as f32;
            let theta = v * std::f32::consts::PI;
            for s in 0..=sectors {
                let u = s as f32 / sectors as f32;
                let phi = u * std::f32::consts::TAU;
                let n = Vec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin());
                vertices.push(PackedVertex::new((n * radius).into(), n.into(), [u, v]));
            }
        }

        let mut indices = Vec::with_capacity((rings * sectors * 6) as usize);
        let stride = sectors + 1;
        for r in 0..rings {
            for s in 0..sectors {
                let a = r * stride + s;
                let b = a + stride;
                indices.extend_from_slice(&[a, a + 1, b, b, a + 1, b + 1]);
            }
        }
        Self::new(vertices, indices)
    }

    /// Same surface seen from the other side: winding and normals flipped.
    /// Turns a closed box into a room the camera can stand in.
    pub fn inverted(mut self) -> Self {
        for tri in self.indices.chunks_exact_mut(3) {
            tri.swap(1, 2);
        }
        for v in &mut self.vertices {
            let n = -v.unpacked_normal();
            v.normal = pack_snorm8x4(n.x, n.y, n.z, 0.0);
        }
        self
    }

    /// Reject index buffers that reach outside the vertex buffer
    pub fn validate(&self) -> Result<()> {
        if self.indices.len() % 3 != 0 {
            return Err(Error::Resource(format!(
                "index count {} is not a multiple of 3",
                self.indices.len()
            )));
        }
        let count = self.vertices.len() as u32;
        if let Some(bad) = self.indices.iter().find(|&&i| i >= count) {
            return Err(Error::Resource(format!(
                "index {} out of range for {} vertices",
                bad, count
            )));
        }
        Ok(())
    }
}

/// Surface parameters shared by the shading and precompute programs
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Material {
    pub base_color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    pub emissive: f32,
    pub ao: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            base_color: [1.0, 1.0, 1.0, 1.0],
            metallic: 0.0,
            roughness: 0.5,
            emissive: 0.0,
            ao: 1.0,
        }
    }
}

impl Material {
    pub fn with_base_color(mut self, rgb: [f32; 3]) -> Self {
        self.base_color = [rgb[0], rgb[1], rgb[2], 1.0];
        self
    }

    pub fn with_emissive(mut self, emissive: f32) -> Self {
        self.emissive = emissive;
        self
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness;
        self
    }

    pub fn uniform(&self) -> MaterialUniform {
        MaterialUniform {
            base_color: self.base_color,
            metallic: self.metallic,
            roughness: self.roughness,
            emissive: self.emissive,
            ao: self.ao,
        }
    }
}

/// GPU layout of [`Material`] (matches `Material` in shading.wgsl)
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniform {
    pub base_color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    pub emissive: f32,
    pub ao: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_vertex_is_32_bytes() {
        assert_eq!(std::mem::size_of::<PackedVertex>(), 32);
        assert_eq!(std::mem::size_of::<MaterialUniform>(), 32);
    }

    #[test]
    fn normals_survive_packing() {
        let v = PackedVertex::new([0.0; 3], [0.0, -1.0, 0.0], [0.0; 2]);
        assert!((v.unpacked_normal() - Vec3::NEG_Y).length() < 1e-2);
    }

    #[test]
    fn builders_produce_valid_meshes() {
        for mesh in [
            MeshData::cube([0.0, 1.0, 0.0], 0.5),
            MeshData::plane([0.0; 3], 10.0),
            MeshData::sphere(0.08, 8, 8),
        ] {
            mesh.validate().unwrap();
        }
        assert_eq!(MeshData::cube([0.0; 3], 1.0).indices.len(), 36);
        assert_eq!(MeshData::sphere(1.0, 8, 8).indices.len(), 8 * 8 * 6);
    }

    #[test]
    fn sphere_vertices_lie_on_radius() {
        let mesh = MeshData::sphere(2.0, 6, 10);
        for v in &mesh.vertices {
            assert!((Vec3::from(v.position).length() - 2.0).abs() < 1e-4);
        }
    }

    #[test]
    fn inverted_cube_faces_inward() {
        let room = MeshData::cube([0.0; 3], 5.0).inverted();
        for v in &room.vertices {
            let p = Vec3::from(v.position);
            assert!(v.unpacked_normal().dot(p) < 0.0);
        }
        room.validate().unwrap();
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mut mesh = MeshData::plane([0.0; 3], 1.0);
        mesh.indices[4] = 9;
        assert!(matches!(mesh.validate(), Err(Error::Resource(_))));
    }
}
