// mesh.rs — 包围相机的网格（UV 球 / 反向立方体）
//
// 只生成位置：纹理坐标由片元着色器按方向计算，半径无关紧要。

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
}

#[derive(Debug, Clone)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshShape {
    #[default]
    Sphere,
    Cube,
}

impl MeshShape {
    /// Sub-meshes of the surface: one for the sphere, one per cube face.
    /// Distance from the centre to the farthest vertex.
    pub fn extent(self, radius: f32) -> f32 {
        match self {
            MeshShape::Sphere => radius,
            // 立方体角点
            MeshShape::Cube => radius * 3f32.sqrt(),
        }
    }

    pub fn build(self, radius: f32) -> Vec<MeshData> {
        match self {
            MeshShape::Sphere => vec![build_sphere(radius, 32, 64)],
            MeshShape::Cube => build_inverted_cube(radius),
        }
    }
}

/// UV sphere with `lat` rings and `lon` segments, wound to face inward.
pub fn build_sphere(radius: f32, lat: usize, lon: usize) -> MeshData {
    let mut vertices = Vec::with_capacity((lat + 1) * (lon + 1));
    let mut indices = Vec::with_capacity(lat * lon * 6);

    for i in 0..=lat {
        let theta = std::f32::consts::PI * (i as f32) / (lat as f32);
        let y = radius * theta.cos();
        let sin_t = theta.sin();

        for j in 0..=lon {
            let phi = 2.0 * std::f32::consts::PI * (j as f32) / (lon as f32);

            let x = radius * phi.cos() * sin_t;
            let z = radius * phi.sin() * sin_t;

            vertices.push(Vertex { position: [x, y, z] });
        }
    }

    for i in 0..lat {
        for j in 0..lon {
            let a = (i * (lon + 1) + j) as u32;
            let b = a + (lon + 1) as u32;

            // 法线朝向球心：从内部看为逆时针
            indices.extend_from_slice(&[
                a, b, a + 1,
                b, b + 1, a + 1,
            ]);
        }
    }

    MeshData { vertices, indices }
}

/// Cube of half-extent `half`, one sub-mesh per face, wound to face inward.
pub fn build_inverted_cube(half: f32) -> Vec<MeshData> {
    // 每个面：法线方向 + 面内两个切向
    const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, 0.0, 1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];

    FACES
        .iter()
        .map(|&(n, s, t)| {
            let vertices = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)]
                .map(|(a, b)| Vertex {
                    position: [
                        half * (n[0] + a * s[0] + b * t[0]),
                        half * (n[1] + a * s[1] + b * t[1]),
                        half * (n[2] + a * s[2] + b * t[2]),
                    ],
                })
                .to_vec();
            MeshData {
                vertices,
                indices: vec![0, 1, 2, 0, 2, 3],
            }
        })
        .collect()
}
