//! Pass-scoped builders: resource declarations and attachment setup.

use petgraph::graph::NodeIndex;

use super::{
    AccelerationStructureHandle, BufferHandle, Node, RenderGraph, TextureHandle,
};
use crate::rhi;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BlitPassMode {
    Normal,
}

#[derive(Clone, Debug)]
pub(crate) struct ColorTarget {
    pub handle: TextureHandle,
    pub level: u32,
    pub base_layer: u32,
    pub num_layers: u32,
    pub clear_color: Option<[f32; 4]>,
    pub store: bool,
    pub generate_mipmaps: bool,
}

#[derive(Clone, Debug)]
pub(crate) struct DepthStencilTarget {
    pub handle: TextureHandle,
    pub level: u32,
    pub base_layer: u32,
    pub num_layers: u32,
    pub clear_value: Option<(f32, u8)>,
    pub store: bool,
    pub read_only: bool,
    pub generate_mipmaps: bool,
}

pub struct GraphicsPassColorTargetBuilder {
    pub(crate) target: ColorTarget,
}

impl GraphicsPassColorTargetBuilder {
    pub fn new(handle: TextureHandle) -> Self {
        GraphicsPassColorTargetBuilder {
            target: ColorTarget {
                handle,
                level: 0,
                base_layer: 0,
                num_layers: 1,
                clear_color: None,
                store: true,
                generate_mipmaps: false,
            },
        }
    }

    pub fn array_layer(mut self, base_layer: u32, num_layers: u32) -> Self {
        self.target.base_layer = base_layer;
        self.target.num_layers = num_layers;
        self
    }

    pub fn mip_level(mut self, level: u32) -> Self {
        self.target.level = level;
        self
    }

    pub fn clear_color(mut self, color: [f32; 4]) -> Self {
        self.target.clear_color = Some(color);
        self
    }

    pub fn dont_store(mut self) -> Self {
        self.target.store = false;
        self
    }

    pub fn generate_mipmaps(mut self) -> Self {
        self.target.generate_mipmaps = true;
        self
    }
}

pub struct GraphicsPassDepthStencilTargetBuilder {
    pub(crate) target: DepthStencilTarget,
}

impl GraphicsPassDepthStencilTargetBuilder {
    pub fn new(handle: TextureHandle) -> Self {
        GraphicsPassDepthStencilTargetBuilder {
            target: DepthStencilTarget {
                handle,
                level: 0,
                base_layer: 0,
                num_layers: 1,
                clear_value: None,
                store: true,
                read_only: false,
                generate_mipmaps: false,
            },
        }
    }

    pub fn array_layer(mut self, base_layer: u32, num_layers: u32) -> Self {
        self.target.base_layer = base_layer;
        self.target.num_layers = num_layers;
        self
    }

    pub fn mip_level(mut self, level: u32) -> Self {
        self.target.level = level;
        self
    }

    pub fn clear_depth_stencil(mut self, depth: f32, stencil: u8) -> Self {
        self.target.clear_value = Some((depth, stencil));
        self
    }

    pub fn dont_store(mut self) -> Self {
        self.target.store = false;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.target.read_only = true;
        self
    }

    pub fn generate_mipmaps(mut self) -> Self {
        self.target.generate_mipmaps = true;
        self
    }
}

//--------------------------------------------------------------------------------------------------

/// Builder for transient buffers.
pub struct BufferBuilder {
    pub(crate) desc: rhi::BufferDesc,
}

impl BufferBuilder {
    pub(crate) fn new() -> Self {
        BufferBuilder {
            desc: rhi::BufferDesc::default(),
        }
    }

    pub fn size(&mut self, size: u64) -> &mut Self {
        self.desc.size = size;
        self
    }

    pub fn usage(&mut self, usages: rhi::BufferUsage) -> &mut Self {
        self.desc.usages = usages;
        self
    }

    pub fn memory(&mut self, memory_property: rhi::BufferMemoryProperty) -> &mut Self {
        self.desc.memory_property = memory_property;
        self
    }
}

/// Builder for transient textures.
pub struct TextureBuilder {
    pub(crate) desc: rhi::TextureDesc,
}

impl TextureBuilder {
    pub(crate) fn new() -> Self {
        TextureBuilder {
            desc: rhi::TextureDesc::default(),
        }
    }

    pub fn extent_2d(&mut self, width: u32, height: u32) -> &mut Self {
        self.desc.extent = rhi::Extent3d {
            width,
            height,
            depth_or_layers: 1,
        };
        self.desc.dim = rhi::TextureDimension::D2;
        self
    }

    pub fn extent_3d(&mut self, width: u32, height: u32, depth: u32) -> &mut Self {
        self.desc.extent = rhi::Extent3d {
            width,
            height,
            depth_or_layers: depth,
        };
        self.desc.dim = rhi::TextureDimension::D3;
        self
    }

    pub fn array_layers(&mut self, layers: u32) -> &mut Self {
        self.desc.extent.depth_or_layers = layers;
        self
    }

    pub fn levels(&mut self, levels: u32) -> &mut Self {
        self.desc.levels = levels;
        self
    }

    pub fn format(&mut self, format: rhi::ResourceFormat) -> &mut Self {
        self.desc.format = format;
        self
    }

    pub fn usage(&mut self, usages: rhi::TextureUsage) -> &mut Self {
        self.desc.usages = usages;
        self
    }
}

//--------------------------------------------------------------------------------------------------

/// Declares the resources a graphics pass touches. Every declaration adds the
/// matching edge to the graph; writes may split the target into an aliasing
/// chain, in which case the returned handle is the downstream alias.
pub struct GraphicsPassBuilder<'a> {
    pub(crate) graph: &'a mut RenderGraph,
    pub(crate) pass_index: NodeIndex<u32>,
}

impl<'a> GraphicsPassBuilder<'a> {
    pub fn use_color(
        &mut self,
        index: usize,
        target: GraphicsPassColorTargetBuilder,
    ) -> TextureHandle {
        let target = target.target;
        // the recorded target keeps the pre-alias handle; the chain shares
        // one pooled allocation either way
        let handle = self.graph.add_write_edge_texture(self.pass_index, target.handle);
        if let Node::GraphicsPass(node) = &mut self.graph.graph[self.pass_index] {
            if node.color_targets.len() <= index {
                node.color_targets.resize(index + 1, None);
            }
            node.color_targets[index] = Some(target);
        }
        handle
    }

    pub fn use_depth_stencil(
        &mut self,
        target: GraphicsPassDepthStencilTargetBuilder,
    ) -> TextureHandle {
        let target = target.target;
        let handle = if target.read_only {
            self.graph.add_read_edge(self.pass_index, target.handle.0);
            target.handle
        } else {
            self.graph.add_write_edge_texture(self.pass_index, target.handle)
        };
        if let Node::GraphicsPass(node) = &mut self.graph.graph[self.pass_index] {
            node.depth_stencil_target = Some(target);
        }
        handle
    }

    pub fn read_buffer(&mut self, handle: BufferHandle) -> BufferHandle {
        if let Node::GraphicsPass(node) = &mut self.graph.graph[self.pass_index] {
            node.read_buffers.push(handle);
        }
        self.graph.add_read_edge(self.pass_index, handle.0);
        handle
    }

    pub fn read_texture(&mut self, handle: TextureHandle) -> TextureHandle {
        if let Node::GraphicsPass(node) = &mut self.graph.graph[self.pass_index] {
            node.read_textures.push(handle);
        }
        self.graph.add_read_edge(self.pass_index, handle.0);
        handle
    }

    pub fn read_acceleration_structure(
        &mut self,
        handle: AccelerationStructureHandle,
    ) -> AccelerationStructureHandle {
        self.graph.add_read_edge(self.pass_index, handle.0);
        handle
    }

    pub fn write_buffer(&mut self, handle: BufferHandle) -> BufferHandle {
        if let Node::GraphicsPass(node) = &mut self.graph.graph[self.pass_index] {
            node.write_buffers.push(handle);
        }
        self.graph.add_write_edge_buffer(self.pass_index, handle)
    }

    pub fn write_texture(&mut self, handle: TextureHandle) -> TextureHandle {
        if let Node::GraphicsPass(node) = &mut self.graph.graph[self.pass_index] {
            node.write_textures.push(handle);
        }
        self.graph.add_write_edge_texture(self.pass_index, handle)
    }
}

/// Declares the resources a compute pass touches.
pub struct ComputePassBuilder<'a> {
    pub(crate) graph: &'a mut RenderGraph,
    pub(crate) pass_index: NodeIndex<u32>,
}

impl<'a> ComputePassBuilder<'a> {
    pub fn read_buffer(&mut self, handle: BufferHandle) -> BufferHandle {
        if let Node::ComputePass(node) = &mut self.graph.graph[self.pass_index] {
            node.read_buffers.push(handle);
        }
        self.graph.add_read_edge(self.pass_index, handle.0);
        handle
    }

    pub fn read_texture(&mut self, handle: TextureHandle) -> TextureHandle {
        if let Node::ComputePass(node) = &mut self.graph.graph[self.pass_index] {
            node.read_textures.push(handle);
        }
        self.graph.add_read_edge(self.pass_index, handle.0);
        handle
    }

    pub fn read_acceleration_structure(
        &mut self,
        handle: AccelerationStructureHandle,
    ) -> AccelerationStructureHandle {
        self.graph.add_read_edge(self.pass_index, handle.0);
        handle
    }

    pub fn write_buffer(&mut self, handle: BufferHandle) -> BufferHandle {
        if let Node::ComputePass(node) = &mut self.graph.graph[self.pass_index] {
            node.write_buffers.push(handle);
        }
        self.graph.add_write_edge_buffer(self.pass_index, handle)
    }

    pub fn write_texture(&mut self, handle: TextureHandle) -> TextureHandle {
        if let Node::ComputePass(node) = &mut self.graph.graph[self.pass_index] {
            node.write_textures.push(handle);
        }
        self.graph.add_write_edge_texture(self.pass_index, handle)
    }
}
