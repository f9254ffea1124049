//! Immutable GPU-resident meshes and the asset store handing out handles

use wgpu::util::DeviceExt;

use super::texture_resource::TextureResource;
use crate::gfx::geometry::GeometryData;
use crate::gfx::scene::{MeshHandle, TextureHandle};

/// Vertex and index buffers of one uploaded mesh
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
    pub index_format: wgpu::IndexFormat,
}

impl GpuMesh {
    pub fn upload(device: &wgpu::Device, geometry: &GeometryData, label: &str) -> Self {
        let vertices = geometry.to_vertices();
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Vertex Buffer", label)),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Index Buffer", label)),
            contents: bytemuck::cast_slice(&geometry.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            vertex_buffer,
            index_buffer,
            index_count: geometry.indices.len() as u32,
            index_format: wgpu::IndexFormat::Uint32,
        }
    }

    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), self.index_format);
        pass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

/// Meshes and textures created before the scene is assembled
#[derive(Default)]
pub struct GpuAssets {
    meshes: Vec<GpuMesh>,
    textures: Vec<TextureResource>,
}

impl GpuAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_mesh(&mut self, device: &wgpu::Device, geometry: &GeometryData, label: &str) -> MeshHandle {
        log::debug!(
            "Uploading mesh '{}': {} vertices, {} triangles",
            label,
            geometry.vertex_count(),
            geometry.triangle_count()
        );
        self.meshes.push(GpuMesh::upload(device, geometry, label));
        MeshHandle(self.meshes.len() as u32 - 1)
    }

    pub fn add_texture(&mut self, texture: TextureResource) -> TextureHandle {
        self.textures.push(texture);
        TextureHandle(self.textures.len() as u32 - 1)
    }

    pub fn mesh(&self, handle: MeshHandle) -> Option<&GpuMesh> {
        self.meshes.get(handle.0 as usize)
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<&TextureResource> {
        self.textures.get(handle.0 as usize)
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }
}
