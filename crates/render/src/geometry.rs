use glam::Vec3;
use std::collections::HashMap;

/// Indexed triangle geometry with one normal per vertex.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Geometry {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

impl Geometry {
    /// Unit cube centred on the origin, used as the skybox enclosure.
    pub fn cube() -> Self {
        let positions: Vec<[f32; 3]> = (0..8)
            .map(|i| {
                let bit = |b: u32| if i & b == 0 { -1.0 } else { 1.0 };
                [bit(1), bit(2), bit(4)]
            })
            .collect();
        #[rustfmt::skip]
        let indices = vec![
            0, 2, 1, 1, 2, 3, // -z
            4, 5, 6, 5, 7, 6, // +z
            0, 1, 4, 1, 5, 4, // -y
            2, 6, 3, 3, 6, 7, // +y
            0, 4, 2, 2, 4, 6, // -x
            1, 3, 5, 3, 7, 5, // +x
        ];
        let normals = positions
            .iter()
            .map(|p| Vec3::from(*p).normalize().to_array())
            .collect();
        Self {
            positions,
            normals,
            indices,
        }
    }

    /// Two triangles covering clip space at the far plane.
    pub fn plane() -> Self {
        Self {
            positions: vec![
                [-1.0, -1.0, 1.0],
                [1.0, -1.0, 1.0],
                [-1.0, 1.0, 1.0],
                [1.0, 1.0, 1.0],
            ],
            normals: vec![[0.0, 0.0, -1.0]; 4],
            indices: vec![0, 1, 2, 2, 1, 3],
        }
    }

    /// Unit sphere made by subdividing an icosahedron. Each level splits
    /// every triangle into four.
    pub fn icosphere(subdivisions: u32) -> Self {
        let t = (1.0 + 5f32.sqrt()) / 2.0;
        let mut vertices: Vec<Vec3> = [
            [-1.0, t, 0.0],
            [1.0, t, 0.0],
            [-1.0, -t, 0.0],
            [1.0, -t, 0.0],
            [0.0, -1.0, t],
            [0.0, 1.0, t],
            [0.0, -1.0, -t],
            [0.0, 1.0, -t],
            [t, 0.0, -1.0],
            [t, 0.0, 1.0],
            [-t, 0.0, -1.0],
            [-t, 0.0, 1.0],
        ]
        .into_iter()
        .map(|p| Vec3::from(p).normalize())
        .collect();
        #[rustfmt::skip]
        let mut faces: Vec<[u32; 3]> = vec![
            [0, 11, 5], [0, 5, 1], [0, 1, 7], [0, 7, 10], [0, 10, 11],
            [1, 5, 9], [5, 11, 4], [11, 10, 2], [10, 7, 6], [7, 1, 8],
            [3, 9, 4], [3, 4, 2], [3, 2, 6], [3, 6, 8], [3, 8, 9],
            [4, 9, 5], [2, 4, 11], [6, 2, 10], [8, 6, 7], [9, 8, 1],
        ];

        for _ in 0..subdivisions {
            let mut midpoints: HashMap<(u32, u32), u32> = HashMap::new();
            let mut midpoint = |a: u32, b: u32, vertices: &mut Vec<Vec3>| {
                let key = (a.min(b), a.max(b));
                *midpoints.entry(key).or_insert_with(|| {
                    let mid = (vertices[a as usize] + vertices[b as usize]).normalize();
                    vertices.push(mid);
                    (vertices.len() - 1) as u32
                })
            };
            faces = faces
                .into_iter()
                .flat_map(|[a, b, c]| {
                    let ab = midpoint(a, b, &mut vertices);
                    let bc = midpoint(b, c, &mut vertices);
                    let ca = midpoint(c, a, &mut vertices);
                    [[a, ab, ca], [b, bc, ab], [c, ca, bc], [ab, bc, ca]]
                })
                .collect();
        }

        let positions: Vec<[f32; 3]> = vertices.iter().map(|v| v.to_array()).collect();
        Self {
            normals: positions.clone(),
            positions,
            indices: faces.into_iter().flatten().collect(),
        }
    }

    /// Split shared vertices so every triangle gets its own face normal.
    pub fn flatten_normals(&self) -> Self {
        let mut out = Self::default();
        for tri in self.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| Vec3::from(self.positions[i as usize]));
            let normal = (b - a).cross(c - a).normalize_or_zero().to_array();
            for p in [a, b, c] {
                out.indices.push(out.positions.len() as u32);
                out.positions.push(p.to_array());
                out.normals.push(normal);
            }
        }
        out
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Positions and normals interleaved as `[px, py, pz, nx, ny, nz]` per vertex.
    pub fn interleaved(&self) -> Vec<f32> {
        self.positions
            .iter()
            .zip(&self.normals)
            .flat_map(|(p, n)| [p[0], p[1], p[2], n[0], n[1], n[2]])
            .collect()
    }
}
