// gpu/surface.rs — 被全景材质装饰的网格（GPU 缓冲 + 每个子网格的材质槽）

use glam::Mat4;
use wgpu::util::DeviceExt;

use super::device::{TransformUniform, WgpuDevice, WgpuMaterial};
use crate::host::PanoramaSurface;
use crate::mesh::{MeshData, MeshShape};

pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

impl GpuMesh {
    fn upload(device: &wgpu::Device, data: &MeshData) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("panorama_vertices"),
            contents: bytemuck::cast_slice(&data.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("panorama_indices"),
            contents: bytemuck::cast_slice(&data.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: data.indices.len() as u32,
        }
    }
}

/// Sphere or inverted cube centred on the camera.
pub struct PanoramaMesh {
    meshes: Vec<GpuMesh>,
    materials: Vec<Option<WgpuMaterial>>,
    model: Mat4,
    transform_buffer: wgpu::Buffer,
    transform_bind_group: wgpu::BindGroup,
}

impl PanoramaMesh {
    pub fn new(device: &WgpuDevice, shape: MeshShape, radius: f32) -> Self {
        let meshes: Vec<GpuMesh> = shape
            .build(radius)
            .iter()
            .map(|data| GpuMesh::upload(device.device(), data))
            .collect();
        let materials = vec![None; meshes.len()];

        let model = Mat4::IDENTITY;
        let uniform = TransformUniform {
            matrix_model: model.to_cols_array_2d(),
            matrix_view_projection: Mat4::IDENTITY.to_cols_array_2d(),
        };
        let transform_buffer = device.device().create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("transform_buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let transform_bind_group = device.device().create_bind_group(&wgpu::BindGroupDescriptor {
            layout: device.transform_layout(),
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: transform_buffer.as_entire_binding(),
            }],
            label: Some("transform_bind_group"),
        });

        log::debug!("panorama mesh {:?} with {} sub-meshes", shape, meshes.len());

        Self {
            meshes,
            materials,
            model,
            transform_buffer,
            transform_bind_group,
        }
    }

    pub fn write_transforms(&self, queue: &wgpu::Queue, view_projection: Mat4) {
        let uniform = TransformUniform {
            matrix_model: self.model.to_cols_array_2d(),
            matrix_view_projection: view_projection.to_cols_array_2d(),
        };
        queue.write_buffer(&self.transform_buffer, 0, bytemuck::cast_slice(&[uniform]));
    }

    pub fn transform_bind_group(&self) -> &wgpu::BindGroup {
        &self.transform_bind_group
    }

    /// Sub-meshes that have a material assigned.
    pub fn drawables(&self) -> impl Iterator<Item = (&GpuMesh, &WgpuMaterial)> {
        self.meshes
            .iter()
            .zip(&self.materials)
            .filter_map(|(mesh, material)| material.as_ref().map(|m| (mesh, m)))
    }
}

impl PanoramaSurface<WgpuMaterial> for PanoramaMesh {
    fn mesh_instance_count(&self) -> usize {
        self.meshes.len()
    }

    fn set_mesh_material(&mut self, index: usize, material: WgpuMaterial) {
        if let Some(slot) = self.materials.get_mut(index) {
            *slot = Some(material);
        }
    }
}
