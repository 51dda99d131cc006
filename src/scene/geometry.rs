//! Mesh generators for common shapes.

use std::f32::consts::PI;

use glam::{Vec2, Vec3, Vec4};

use crate::types::Vertex;

use super::MeshData;

/// Generate a UV sphere.
///
/// `segments` runs around the equator and `rings` from pole to pole. The
/// mesh has `(rings + 1) * (segments + 1)` vertices.
pub fn generate_sphere(name: &str, radius: f32, segments: u32, rings: u32, material: usize) -> MeshData {
    let mut vertices = Vec::with_capacity(((rings + 1) * (segments + 1)) as usize);
    let mut indices = Vec::with_capacity((rings * segments * 6) as usize);

    for ring in 0..=rings {
        let theta = ring as f32 * PI / rings as f32;
        let (sin_theta, cos_theta) = theta.sin_cos();

        for segment in 0..=segments {
            let phi = segment as f32 * 2.0 * PI / segments as f32;
            let (sin_phi, cos_phi) = phi.sin_cos();

            let normal = Vec3::new(sin_theta * cos_phi, cos_theta, sin_theta * sin_phi);
            let mut vertex = Vertex::new(
                normal * radius,
                normal,
                Vec2::new(segment as f32 / segments as f32, ring as f32 / rings as f32),
            );
            vertex.tangent = Vec4::new(-sin_phi, 0.0, cos_phi, 1.0);
            vertices.push(vertex);
        }
    }

    for ring in 0..rings {
        for segment in 0..segments {
            let current = ring * (segments + 1) + segment;
            let next = current + segments + 1;

            indices.extend_from_slice(&[current, next, current + 1]);
            indices.extend_from_slice(&[current + 1, next, next + 1]);
        }
    }

    MeshData::new(name, vertices, indices, material)
}

/// Generate an axis-aligned box centered at the origin with per-face normals.
pub fn generate_box(name: &str, half_extents: Vec3, material: usize) -> MeshData {
    const FACES: [(Vec3, Vec3); 6] = [
        (Vec3::X, Vec3::Z),
        (Vec3::NEG_X, Vec3::NEG_Z),
        (Vec3::Y, Vec3::X),
        (Vec3::NEG_Y, Vec3::X),
        (Vec3::Z, Vec3::NEG_X),
        (Vec3::NEG_Z, Vec3::X),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    for (normal, tangent) in FACES {
        let bitangent = normal.cross(tangent);
        let base = vertices.len() as u32;
        for (u, v) in [(0.0, 1.0), (0.0, 0.0), (1.0, 0.0), (1.0, 1.0)] {
            let offset = normal + tangent * (u * 2.0 - 1.0) + bitangent * (1.0 - v * 2.0);
            let mut vertex = Vertex::new(offset * half_extents, normal, Vec2::new(u, v));
            vertex.tangent = tangent.extend(1.0);
            vertices.push(vertex);
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    MeshData::new(name, vertices, indices, material)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_sphere() {
        let mesh = generate_sphere("sphere", 1.0, 8, 4, 0);
        assert_eq!(mesh.vertices.len(), 45);
        assert_eq!(mesh.indices.len(), 8 * 4 * 6);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
        for vertex in &mesh.vertices {
            assert!((vertex.position.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_generate_box() {
        let mesh = generate_box("crate", Vec3::new(1.0, 2.0, 3.0), 0);
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.indices.len(), 36);
        let max = mesh
            .vertices
            .iter()
            .fold(Vec3::ZERO, |acc, v| acc.max(v.position.abs()));
        assert!(max.abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1e-5));
    }
}
