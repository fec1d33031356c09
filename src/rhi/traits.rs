//! Traits implemented by RHI backend objects.
//!
//! The engine core only ever talks to the GPU through these traits; no
//! concrete graphics API is mandated. Backend objects are exposed as boxed
//! trait objects and may be downcast by a backend that recognises its own
//! types.

use downcast_rs::{impl_downcast, Downcast};
use std::fmt::Debug;

use super::types::*;

/// Trait implemented by backend buffer objects.
///
/// `write`/`read` are only meaningful for CPU-visible buffers and abstract
/// over persistent mapping.
pub trait Buffer: Downcast + Debug {
    fn size(&self) -> u64;
    fn write(&self, offset: u64, data: &[u8]);
    fn read(&self, offset: u64, out: &mut [u8]);
    /// Device address used by acceleration-structure builds.
    fn gpu_reference(&self) -> u64;
}

/// Trait implemented by backend texture objects.
pub trait Texture: Downcast + Debug {
    fn desc(&self) -> &TextureDesc;
}

/// Trait implemented by backend sampler objects.
pub trait Sampler: Downcast + Debug {}

/// Trait implemented by backend shader module objects.
pub trait ShaderModule: Downcast + Debug {}

/// Trait implemented by backend graphics pipeline objects.
pub trait GraphicsPipeline: Downcast + Debug {
    fn bind_groups_layout(&self) -> &[BindGroupLayout];
}

/// Trait implemented by backend compute pipeline objects.
pub trait ComputePipeline: Downcast + Debug {
    fn bind_groups_layout(&self) -> &[BindGroupLayout];
}

/// Trait implemented by backend acceleration structure objects.
pub trait AccelerationStructure: Downcast + Debug {
    fn gpu_reference(&self) -> u64;
}

/// Trait implemented by backend fence objects.
pub trait Fence: Downcast {
    fn wait(&self);
}

/// Trait implemented by backend semaphore objects.
pub trait Semaphore: Downcast {}

/// Descriptor heaps hand out descriptors; CPU heaps are append-only within a
/// frame slot and GPU-visible heaps are reset together with their frame.
pub trait DescriptorHeap: Downcast {
    fn allocate_descriptor(&self, descriptor_type: DescriptorType) -> DescriptorHandle;
    fn allocate_descriptor_for_layout(&self, layout: &[BindGroupLayoutEntry]) -> DescriptorHandle;
    fn free_descriptor(&self, handle: DescriptorHandle);
    fn reset(&self);
}

/// Encoder for draw commands inside one render pass.
pub trait GraphicsEncoder {
    fn set_pipeline(&mut self, pipeline: &dyn GraphicsPipeline);
    fn set_descriptors(&mut self, set: u32, descriptors: &[DescriptorHandle]);
    fn set_viewports(&mut self, viewports: &[Viewport]);
    fn set_scissors(&mut self, scissors: &[Scissor]);
    fn push_constants(&mut self, data: &[u8]);
    fn bind_vertex_buffer(&mut self, binding: u32, buffer: &dyn Buffer, offset: u64);
    fn bind_index_buffer(&mut self, buffer: &dyn Buffer, offset: u64);
    fn draw(&mut self, num_vertices: u32);
    fn draw_indexed(&mut self, num_indices: u32);
}

/// Encoder for dispatches inside one compute pass.
pub trait ComputeEncoder {
    fn set_pipeline(&mut self, pipeline: &dyn ComputePipeline);
    fn set_descriptors(&mut self, set: u32, descriptors: &[DescriptorHandle]);
    fn push_constants(&mut self, data: &[u8]);
    fn dispatch(&mut self, x: u32, y: u32, z: u32);
}

/// A finished, submittable command stream.
pub trait CommandBuffer: Downcast {}

/// Top level command encoder tied to one command pool.
pub trait CommandEncoder: Downcast {
    fn set_descriptor_heaps(&mut self, heaps: &[&dyn DescriptorHeap]);
    fn resource_barriers(&mut self, buffers: &[BufferBarrier<'_>], textures: &[TextureBarrier<'_>]);
    fn copy_buffer_to_buffer(&mut self, src: &dyn Buffer, dst: &dyn Buffer, copy: BufferCopyDesc);
    fn begin_render_pass<'a>(
        &'a mut self,
        label: CommandLabel,
        desc: &RenderTargetDesc<'_>,
    ) -> Box<dyn GraphicsEncoder + 'a>;
    fn begin_compute_pass<'a>(&'a mut self, label: CommandLabel) -> Box<dyn ComputeEncoder + 'a>;
    fn build_bottom_level_acceleration_structures(&mut self, descs: &[AccelGeometryBuildDesc<'_>]);
    fn build_top_level_acceleration_structure(&mut self, desc: &AccelInstanceBuildDesc<'_>);
    fn compact_acceleration_structure(
        &mut self,
        src: &dyn AccelerationStructure,
        dst: &dyn AccelerationStructure,
    );
    fn finish(self: Box<Self>) -> Box<dyn CommandBuffer>;
}

/// Pool of command encoders, reset once per frame slot.
pub trait CommandPool: Downcast {
    fn reset(&self);
    fn get_command_encoder(&self) -> Box<dyn CommandEncoder>;
}

pub trait Queue: Downcast {
    fn submit_command_buffers(
        &self,
        command_buffers: Vec<Box<dyn CommandBuffer>>,
        wait_semaphores: &[&dyn Semaphore],
        signal_semaphores: &[&dyn Semaphore],
        fence: Option<&dyn Fence>,
    );
    fn wait_idle(&self);
}

pub trait Swapchain: Downcast {
    fn size(&self) -> (u32, u32);
    fn acquire_next_texture(&self, acquire_semaphore: &dyn Semaphore) -> bool;
    fn current_texture(&self) -> std::rc::Rc<dyn Texture>;
    fn present(&self, wait_semaphore: &dyn Semaphore);
    fn resize(&self, width: u32, height: u32);
}

/// The device capability set consumed by the engine core.
pub trait Device: Downcast {
    fn properties(&self) -> &DeviceProperties;

    fn create_queue(&self, queue_type: QueueType) -> Box<dyn Queue>;
    fn create_fence(&self) -> Box<dyn Fence>;
    fn create_semaphore(&self) -> Box<dyn Semaphore>;
    fn create_swapchain(&self, desc: &SwapchainDesc) -> Box<dyn Swapchain>;
    fn create_command_pool(&self) -> Box<dyn CommandPool>;
    fn create_descriptor_heap(&self, desc: &DescriptorHeapDesc) -> Box<dyn DescriptorHeap>;

    fn create_buffer(&self, desc: &BufferDesc) -> Box<dyn Buffer>;
    fn create_texture(&self, desc: &TextureDesc) -> Box<dyn Texture>;
    fn create_sampler(&self, desc: &SamplerDesc) -> Box<dyn Sampler>;
    fn create_shader_module(&self, bytecode: &[u8]) -> Box<dyn ShaderModule>;
    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_>)
        -> Box<dyn GraphicsPipeline>;
    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc<'_>) -> Box<dyn ComputePipeline>;

    fn create_buffer_descriptor(&self, desc: &BufferDescriptorDesc<'_>, handle: DescriptorHandle);
    fn create_texture_descriptor(&self, desc: &TextureDescriptorDesc<'_>, handle: DescriptorHandle);
    fn create_acceleration_structure_descriptor(
        &self,
        accel: &dyn AccelerationStructure,
        handle: DescriptorHandle,
    );
    fn create_sampler_descriptor(&self, sampler: &dyn Sampler, handle: DescriptorHandle);
    /// Copies CPU descriptors into a GPU-visible heap slot.
    fn copy_descriptors(
        &self,
        dst: DescriptorHandle,
        src: &[DescriptorHandle],
        types: &[DescriptorType],
    );

    fn create_acceleration_structure(
        &self,
        desc: &AccelStructureDesc<'_>,
    ) -> Box<dyn AccelerationStructure>;
    fn acceleration_structure_memory_size_of_geometry(
        &self,
        input: &AccelGeometryBuildInput<'_>,
    ) -> AccelMemorySize;
    fn acceleration_structure_memory_size_of_instances(
        &self,
        input: &AccelInstanceBuildInput<'_>,
    ) -> AccelMemorySize;
}

impl_downcast!(Buffer);
impl_downcast!(Texture);
impl_downcast!(Sampler);
impl_downcast!(ShaderModule);
impl_downcast!(GraphicsPipeline);
impl_downcast!(ComputePipeline);
impl_downcast!(AccelerationStructure);
impl_downcast!(Fence);
impl_downcast!(Semaphore);
impl_downcast!(DescriptorHeap);
impl_downcast!(CommandBuffer);
impl_downcast!(CommandEncoder);
impl_downcast!(CommandPool);
impl_downcast!(Queue);
impl_downcast!(Swapchain);
impl_downcast!(Device);
