// src/wgpu_utils/binding_builder.rs
//! Builders for bind group layouts and bind groups
//!
//! Layout entries are numbered automatically unless an explicit binding
//! index is requested, which is how the fixed binding points of the shader
//! contract are expressed.

/// Bind group layout together with the entries it was created from
pub struct BindGroupLayoutWithDesc {
    pub layout: wgpu::BindGroupLayout,
    pub entries: Vec<wgpu::BindGroupLayoutEntry>,
}

pub struct BindGroupLayoutBuilder {
    entries: Vec<wgpu::BindGroupLayoutEntry>,
    next_binding_index: u32,
}

impl BindGroupLayoutBuilder {
    pub fn new() -> Self {
        BindGroupLayoutBuilder {
            entries: Vec::new(),
            next_binding_index: 0,
        }
    }

    /// Adds an entry at an explicit binding index
    pub fn binding(
        mut self,
        index: u32,
        visibility: wgpu::ShaderStages,
        binding: wgpu::BindingType,
    ) -> Self {
        self.entries.push(wgpu::BindGroupLayoutEntry {
            binding: index,
            visibility,
            ty: binding,
            count: None,
        });
        self.next_binding_index = index + 1;
        self
    }

    pub fn next_binding(self, visibility: wgpu::ShaderStages, binding: wgpu::BindingType) -> Self {
        let index = self.next_binding_index;
        self.binding(index, visibility, binding)
    }

    pub fn next_binding_vertex(self, binding: wgpu::BindingType) -> Self {
        self.next_binding(wgpu::ShaderStages::VERTEX, binding)
    }

    pub fn next_binding_fragment(self, binding: wgpu::BindingType) -> Self {
        self.next_binding(wgpu::ShaderStages::FRAGMENT, binding)
    }

    pub fn next_binding_rendering(self, binding: wgpu::BindingType) -> Self {
        self.next_binding(
            wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            binding,
        )
    }

    /// Explicit binding index visible to both rendering stages
    pub fn binding_rendering(self, index: u32, binding: wgpu::BindingType) -> Self {
        self.binding(
            index,
            wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            binding,
        )
    }

    pub fn binding_fragment(self, index: u32, binding: wgpu::BindingType) -> Self {
        self.binding(index, wgpu::ShaderStages::FRAGMENT, binding)
    }

    pub fn create(self, device: &wgpu::Device, label: &str) -> BindGroupLayoutWithDesc {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &self.entries,
        });
        BindGroupLayoutWithDesc {
            layout,
            entries: self.entries,
        }
    }
}

impl Default for BindGroupLayoutBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Fills a bind group in layout order
pub struct BindGroupBuilder<'a> {
    layout_with_desc: &'a BindGroupLayoutWithDesc,
    entries: Vec<wgpu::BindGroupEntry<'a>>,
}

impl<'a> BindGroupBuilder<'a> {
    pub fn new(layout_with_desc: &'a BindGroupLayoutWithDesc) -> Self {
        BindGroupBuilder {
            layout_with_desc,
            entries: Vec::new(),
        }
    }

    /// Binds the resource to the next layout entry
    pub fn resource(mut self, resource: wgpu::BindingResource<'a>) -> Self {
        let binding = self
            .layout_with_desc
            .entries
            .get(self.entries.len())
            .map(|entry| entry.binding)
            .unwrap_or(self.entries.len() as u32);
        self.entries.push(wgpu::BindGroupEntry { binding, resource });
        self
    }

    pub fn texture(self, view: &'a wgpu::TextureView) -> Self {
        self.resource(wgpu::BindingResource::TextureView(view))
    }

    pub fn sampler(self, sampler: &'a wgpu::Sampler) -> Self {
        self.resource(wgpu::BindingResource::Sampler(sampler))
    }

    pub fn buffer(self, buffer: &'a wgpu::Buffer) -> Self {
        self.resource(buffer.as_entire_binding())
    }

    pub fn create(&self, device: &wgpu::Device, label: &str) -> wgpu::BindGroup {
        debug_assert_eq!(
            self.entries.len(),
            self.layout_with_desc.entries.len(),
            "bind group '{}' does not fill its layout",
            label
        );
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.layout_with_desc.layout,
            entries: &self.entries,
        })
    }
}
