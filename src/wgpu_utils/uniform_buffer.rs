// src/wgpu_utils/uniform_buffer.rs
use std::marker::PhantomData;

fn short_type_name<T>() -> &'static str {
    let type_name = std::any::type_name::<T>();
    let pos = type_name.rfind(':').unwrap_or(0);
    if pos > 0 {
        &type_name[(pos + 1)..]
    } else {
        type_name
    }
}

/// Typed uniform buffer holding exactly one `Content` block
pub struct UniformBuffer<Content> {
    buffer: wgpu::Buffer,
    content_type: PhantomData<Content>,
    previous_content: Vec<u8>,
}

impl<Content: bytemuck::Pod> UniformBuffer<Content> {
    /// Create a new uniform buffer
    pub fn new(device: &wgpu::Device) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("UniformBuffer: {}", short_type_name::<Content>())),
            size: std::mem::size_of::<Content>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        UniformBuffer {
            buffer,
            content_type: PhantomData,
            previous_content: Vec::new(),
        }
    }

    /// Create buffer with initial data
    pub fn new_with_data(device: &wgpu::Device, initial_content: &Content) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("UniformBuffer: {}", short_type_name::<Content>())),
            size: std::mem::size_of::<Content>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: true,
        });

        buffer
            .slice(..)
            .get_mapped_range_mut()
            .clone_from_slice(bytemuck::bytes_of(initial_content));
        buffer.unmap();

        UniformBuffer {
            buffer,
            content_type: PhantomData,
            previous_content: bytemuck::bytes_of(initial_content).to_vec(),
        }
    }

    /// True if `bytes` differ from the last uploaded block
    pub fn differs(&self, bytes: &[u8]) -> bool {
        self.previous_content != bytes
    }

    /// Write raw block bytes, skipping the upload when nothing changed.
    /// Returns whether a write was queued.
    pub fn update_bytes(&mut self, queue: &wgpu::Queue, bytes: &[u8]) -> bool {
        if self.previous_content == bytes {
            return false;
        }
        queue.write_buffer(&self.buffer, 0, bytes);
        self.previous_content = bytes.to_vec();
        true
    }

    pub fn update_content(&mut self, queue: &wgpu::Queue, content: Content) -> bool {
        self.update_bytes(queue, bytemuck::bytes_of(&content))
    }

    pub fn binding_resource(&self) -> wgpu::BindingResource {
        self.buffer.as_entire_binding()
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

/// Byte-level view of a uniform buffer, for callers that address buffers by name
pub trait BlockBuffer {
    fn block_size(&self) -> usize;
    fn differs(&self, bytes: &[u8]) -> bool;
    fn update_bytes(&mut self, queue: &wgpu::Queue, bytes: &[u8]) -> bool;
}

impl<Content: bytemuck::Pod> BlockBuffer for UniformBuffer<Content> {
    fn block_size(&self) -> usize {
        std::mem::size_of::<Content>()
    }

    fn differs(&self, bytes: &[u8]) -> bool {
        UniformBuffer::differs(self, bytes)
    }

    fn update_bytes(&mut self, queue: &wgpu::Queue, bytes: &[u8]) -> bool {
        UniformBuffer::update_bytes(self, queue, bytes)
    }
}

/// Uniform buffer split into aligned slots addressed with a dynamic offset
///
/// Used where several passes of one submission each need their own copy of a
/// block (one light view per shadow pass).
pub struct SlotBuffer<Content> {
    buffer: wgpu::Buffer,
    content_type: PhantomData<Content>,
    stride: u64,
    slots: u32,
}

impl<Content: bytemuck::Pod> SlotBuffer<Content> {
    pub fn new(device: &wgpu::Device, slots: u32) -> Self {
        let stride = Self::aligned_stride(
            device.limits().min_uniform_buffer_offset_alignment as u64,
        );
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("SlotBuffer: {}", short_type_name::<Content>())),
            size: stride * slots.max(1) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        SlotBuffer {
            buffer,
            content_type: PhantomData,
            stride,
            slots: slots.max(1),
        }
    }

    fn aligned_stride(alignment: u64) -> u64 {
        let size = std::mem::size_of::<Content>() as u64;
        size.div_ceil(alignment) * alignment
    }

    pub fn write_slot(&self, queue: &wgpu::Queue, slot: u32, bytes: &[u8]) {
        if slot >= self.slots {
            log::warn!("SlotBuffer write to slot {} ignored ({} slots)", slot, self.slots);
            return;
        }
        queue.write_buffer(&self.buffer, self.offset(slot) as u64, bytes);
    }

    /// Dynamic offset of a slot
    pub fn offset(&self, slot: u32) -> u32 {
        (slot.min(self.slots - 1) as u64 * self.stride) as u32
    }

    /// Binding covering a single slot, for layouts with `has_dynamic_offset`
    pub fn binding_resource(&self) -> wgpu::BindingResource {
        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
            buffer: &self.buffer,
            offset: 0,
            size: wgpu::BufferSize::new(std::mem::size_of::<Content>() as u64),
        })
    }
}
