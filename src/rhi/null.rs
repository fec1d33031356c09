//! Recording null backend.
//!
//! Creates inert objects and records encoded commands into a shared event
//! log. Used by the test suite to assert on barrier placement and submission
//! order without a real GPU.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use byteorder::{ByteOrder, LittleEndian};

use super::traits::*;
use super::types::*;

/// One recorded backend event, in encode order.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    BufferBarrier {
        buffer: u64,
        src: ResourceAccess,
        dst: ResourceAccess,
    },
    TextureBarrier {
        texture: u64,
        base_level: u32,
        num_levels: u32,
        src: ResourceAccess,
        dst: ResourceAccess,
    },
    CopyBufferToBuffer {
        src: u64,
        dst: u64,
    },
    BeginRenderPass {
        label: String,
    },
    BeginComputePass {
        label: String,
    },
    Draw {
        num_vertices: u32,
    },
    DrawIndexed {
        num_indices: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    BuildBottomLevel {
        count: usize,
    },
    BuildTopLevel {
        num_instances: u32,
    },
    CompactAccelerationStructure,
    Submit {
        command_buffers: usize,
        waits: usize,
        signals: usize,
        with_fence: bool,
    },
    Present,
}

pub type EventLog = Rc<RefCell<Vec<Event>>>;

/// Compacted size the null backend reports for every bottom-level build.
pub const NULL_COMPACTED_SIZE: u64 = 128;

//--------------------------------------------------------------------------------------------------

#[derive(Debug)]
pub struct NullBuffer {
    id: u64,
    desc: BufferDesc,
    data: RefCell<Vec<u8>>,
}

impl NullBuffer {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Buffer for NullBuffer {
    fn size(&self) -> u64 {
        self.desc.size
    }
    fn write(&self, offset: u64, data: &[u8]) {
        let mut storage = self.data.borrow_mut();
        let offset = offset as usize;
        let end = (offset + data.len()).min(storage.len());
        if offset < end {
            storage[offset..end].copy_from_slice(&data[..end - offset]);
        }
    }
    fn read(&self, offset: u64, out: &mut [u8]) {
        let storage = self.data.borrow();
        let offset = offset as usize;
        let end = (offset + out.len()).min(storage.len());
        if offset < end {
            out[..end - offset].copy_from_slice(&storage[offset..end]);
        }
    }
    fn gpu_reference(&self) -> u64 {
        self.id
    }
}

#[derive(Debug)]
pub struct NullTexture {
    id: u64,
    desc: TextureDesc,
}

impl NullTexture {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Texture for NullTexture {
    fn desc(&self) -> &TextureDesc {
        &self.desc
    }
}

#[derive(Debug)]
pub struct NullSampler;
impl Sampler for NullSampler {}

#[derive(Debug)]
pub struct NullShaderModule;
impl ShaderModule for NullShaderModule {}

#[derive(Debug)]
pub struct NullGraphicsPipeline {
    bind_groups_layout: Vec<BindGroupLayout>,
}
impl GraphicsPipeline for NullGraphicsPipeline {
    fn bind_groups_layout(&self) -> &[BindGroupLayout] {
        &self.bind_groups_layout
    }
}

#[derive(Debug)]
pub struct NullComputePipeline {
    bind_groups_layout: Vec<BindGroupLayout>,
}
impl ComputePipeline for NullComputePipeline {
    fn bind_groups_layout(&self) -> &[BindGroupLayout] {
        &self.bind_groups_layout
    }
}

#[derive(Debug)]
pub struct NullAccelerationStructure {
    id: u64,
}
impl AccelerationStructure for NullAccelerationStructure {
    fn gpu_reference(&self) -> u64 {
        self.id
    }
}

pub struct NullFence;
impl Fence for NullFence {
    fn wait(&self) {}
}

pub struct NullSemaphore;
impl Semaphore for NullSemaphore {}

pub struct NullDescriptorHeap {
    next: Cell<u64>,
}

impl DescriptorHeap for NullDescriptorHeap {
    fn allocate_descriptor(&self, _descriptor_type: DescriptorType) -> DescriptorHandle {
        let v = self.next.get() + 1;
        self.next.set(v);
        DescriptorHandle { cpu: v, gpu: v }
    }
    fn allocate_descriptor_for_layout(&self, _layout: &[BindGroupLayoutEntry]) -> DescriptorHandle {
        self.allocate_descriptor(DescriptorType::None)
    }
    fn free_descriptor(&self, _handle: DescriptorHandle) {}
    fn reset(&self) {}
}

//--------------------------------------------------------------------------------------------------

struct NullGraphicsEncoder {
    log: EventLog,
}

impl GraphicsEncoder for NullGraphicsEncoder {
    fn set_pipeline(&mut self, _pipeline: &dyn GraphicsPipeline) {}
    fn set_descriptors(&mut self, _set: u32, _descriptors: &[DescriptorHandle]) {}
    fn set_viewports(&mut self, _viewports: &[Viewport]) {}
    fn set_scissors(&mut self, _scissors: &[Scissor]) {}
    fn push_constants(&mut self, _data: &[u8]) {}
    fn bind_vertex_buffer(&mut self, _binding: u32, _buffer: &dyn Buffer, _offset: u64) {}
    fn bind_index_buffer(&mut self, _buffer: &dyn Buffer, _offset: u64) {}
    fn draw(&mut self, num_vertices: u32) {
        self.log.borrow_mut().push(Event::Draw { num_vertices });
    }
    fn draw_indexed(&mut self, num_indices: u32) {
        self.log.borrow_mut().push(Event::DrawIndexed { num_indices });
    }
}

struct NullComputeEncoder {
    log: EventLog,
}

impl ComputeEncoder for NullComputeEncoder {
    fn set_pipeline(&mut self, _pipeline: &dyn ComputePipeline) {}
    fn set_descriptors(&mut self, _set: u32, _descriptors: &[DescriptorHandle]) {}
    fn push_constants(&mut self, _data: &[u8]) {}
    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.log.borrow_mut().push(Event::Dispatch { x, y, z });
    }
}

pub struct NullCommandBuffer;
impl CommandBuffer for NullCommandBuffer {}

pub struct NullCommandEncoder {
    log: EventLog,
}

fn buffer_id(buffer: &dyn Buffer) -> u64 {
    buffer
        .downcast_ref::<NullBuffer>()
        .map(|b| b.id)
        .unwrap_or(0)
}

fn texture_id(texture: &dyn Texture) -> u64 {
    texture
        .downcast_ref::<NullTexture>()
        .map(|t| t.id)
        .unwrap_or(0)
}

impl CommandEncoder for NullCommandEncoder {
    fn set_descriptor_heaps(&mut self, _heaps: &[&dyn DescriptorHeap]) {}

    fn resource_barriers(&mut self, buffers: &[BufferBarrier<'_>], textures: &[TextureBarrier<'_>]) {
        let mut log = self.log.borrow_mut();
        for barrier in buffers {
            log.push(Event::BufferBarrier {
                buffer: buffer_id(barrier.buffer),
                src: barrier.src_access,
                dst: barrier.dst_access,
            });
        }
        for barrier in textures {
            log.push(Event::TextureBarrier {
                texture: texture_id(barrier.texture),
                base_level: barrier.base_level,
                num_levels: barrier.num_levels,
                src: barrier.src_access,
                dst: barrier.dst_access,
            });
        }
    }

    fn copy_buffer_to_buffer(&mut self, src: &dyn Buffer, dst: &dyn Buffer, copy: BufferCopyDesc) {
        let size = if copy.size == 0 { src.size() } else { copy.size };
        let mut staging = vec![0u8; size as usize];
        src.read(copy.src_offset, &mut staging);
        dst.write(copy.dst_offset, &staging);
        self.log.borrow_mut().push(Event::CopyBufferToBuffer {
            src: buffer_id(src),
            dst: buffer_id(dst),
        });
    }

    fn begin_render_pass<'a>(
        &'a mut self,
        label: CommandLabel,
        _desc: &RenderTargetDesc<'_>,
    ) -> Box<dyn GraphicsEncoder + 'a> {
        self.log
            .borrow_mut()
            .push(Event::BeginRenderPass { label: label.label });
        Box::new(NullGraphicsEncoder {
            log: self.log.clone(),
        })
    }

    fn begin_compute_pass<'a>(&'a mut self, label: CommandLabel) -> Box<dyn ComputeEncoder + 'a> {
        self.log
            .borrow_mut()
            .push(Event::BeginComputePass { label: label.label });
        Box::new(NullComputeEncoder {
            log: self.log.clone(),
        })
    }

    fn build_bottom_level_acceleration_structures(&mut self, descs: &[AccelGeometryBuildDesc<'_>]) {
        for desc in descs {
            for emit in &desc.emit_data {
                let mut record = [0u8; 8];
                LittleEndian::write_u64(&mut record, NULL_COMPACTED_SIZE);
                emit.dst_buffer.write(emit.dst_buffer_offset, &record);
            }
        }
        self.log
            .borrow_mut()
            .push(Event::BuildBottomLevel { count: descs.len() });
    }

    fn build_top_level_acceleration_structure(&mut self, desc: &AccelInstanceBuildDesc<'_>) {
        self.log.borrow_mut().push(Event::BuildTopLevel {
            num_instances: desc.build_input.num_instances,
        });
    }

    fn compact_acceleration_structure(
        &mut self,
        _src: &dyn AccelerationStructure,
        _dst: &dyn AccelerationStructure,
    ) {
        self.log
            .borrow_mut()
            .push(Event::CompactAccelerationStructure);
    }

    fn finish(self: Box<Self>) -> Box<dyn CommandBuffer> {
        Box::new(NullCommandBuffer)
    }
}

pub struct NullCommandPool {
    log: EventLog,
}

impl CommandPool for NullCommandPool {
    fn reset(&self) {}
    fn get_command_encoder(&self) -> Box<dyn CommandEncoder> {
        Box::new(NullCommandEncoder {
            log: self.log.clone(),
        })
    }
}

pub struct NullQueue {
    log: EventLog,
}

impl Queue for NullQueue {
    fn submit_command_buffers(
        &self,
        command_buffers: Vec<Box<dyn CommandBuffer>>,
        wait_semaphores: &[&dyn Semaphore],
        signal_semaphores: &[&dyn Semaphore],
        fence: Option<&dyn Fence>,
    ) {
        self.log.borrow_mut().push(Event::Submit {
            command_buffers: command_buffers.len(),
            waits: wait_semaphores.len(),
            signals: signal_semaphores.len(),
            with_fence: fence.is_some(),
        });
    }
    fn wait_idle(&self) {}
}

pub struct NullSwapchain {
    log: EventLog,
    texture: RefCell<Rc<NullTexture>>,
    device: Rc<NullDeviceShared>,
}

impl Swapchain for NullSwapchain {
    fn size(&self) -> (u32, u32) {
        let desc = &self.texture.borrow().desc;
        (desc.extent.width, desc.extent.height)
    }
    fn acquire_next_texture(&self, _acquire_semaphore: &dyn Semaphore) -> bool {
        true
    }
    fn current_texture(&self) -> Rc<dyn Texture> {
        self.texture.borrow().clone()
    }
    fn present(&self, _wait_semaphore: &dyn Semaphore) {
        self.log.borrow_mut().push(Event::Present);
    }
    fn resize(&self, width: u32, height: u32) {
        *self.texture.borrow_mut() = Rc::new(NullTexture {
            id: self.device.next_id(),
            desc: swapchain_texture_desc(width, height),
        });
    }
}

fn swapchain_texture_desc(width: u32, height: u32) -> TextureDesc {
    TextureDesc {
        extent: Extent3d {
            width,
            height,
            depth_or_layers: 1,
        },
        levels: 1,
        format: ResourceFormat::Bgra8Unorm,
        dim: TextureDimension::D2,
        usages: TextureUsage::COLOR_ATTACHMENT | TextureUsage::SAMPLED,
    }
}

//--------------------------------------------------------------------------------------------------

struct NullDeviceShared {
    next_id: Cell<u64>,
}

impl NullDeviceShared {
    fn next_id(&self) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }
}

pub struct NullDevice {
    properties: DeviceProperties,
    log: EventLog,
    shared: Rc<NullDeviceShared>,
}

impl NullDevice {
    pub fn new() -> NullDevice {
        NullDevice::with_properties(DeviceProperties {
            name: "null".to_string(),
            separate_sampler_heap: false,
            shader_binary_suffix: ".nullbin",
        })
    }

    pub fn with_properties(properties: DeviceProperties) -> NullDevice {
        NullDevice {
            properties,
            log: Rc::new(RefCell::new(Vec::new())),
            shared: Rc::new(NullDeviceShared {
                next_id: Cell::new(0),
            }),
        }
    }

    pub fn event_log(&self) -> EventLog {
        self.log.clone()
    }
}

impl Device for NullDevice {
    fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    fn create_queue(&self, _queue_type: QueueType) -> Box<dyn Queue> {
        Box::new(NullQueue {
            log: self.log.clone(),
        })
    }
    fn create_fence(&self) -> Box<dyn Fence> {
        Box::new(NullFence)
    }
    fn create_semaphore(&self) -> Box<dyn Semaphore> {
        Box::new(NullSemaphore)
    }
    fn create_swapchain(&self, desc: &SwapchainDesc) -> Box<dyn Swapchain> {
        Box::new(NullSwapchain {
            log: self.log.clone(),
            texture: RefCell::new(Rc::new(NullTexture {
                id: self.shared.next_id(),
                desc: swapchain_texture_desc(desc.width, desc.height),
            })),
            device: self.shared.clone(),
        })
    }
    fn create_command_pool(&self) -> Box<dyn CommandPool> {
        Box::new(NullCommandPool {
            log: self.log.clone(),
        })
    }
    fn create_descriptor_heap(&self, _desc: &DescriptorHeapDesc) -> Box<dyn DescriptorHeap> {
        Box::new(NullDescriptorHeap { next: Cell::new(0) })
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Box<dyn Buffer> {
        Box::new(NullBuffer {
            id: self.shared.next_id(),
            desc: desc.clone(),
            data: RefCell::new(vec![0u8; desc.size as usize]),
        })
    }
    fn create_texture(&self, desc: &TextureDesc) -> Box<dyn Texture> {
        Box::new(NullTexture {
            id: self.shared.next_id(),
            desc: desc.clone(),
        })
    }
    fn create_sampler(&self, _desc: &SamplerDesc) -> Box<dyn Sampler> {
        Box::new(NullSampler)
    }
    fn create_shader_module(&self, _bytecode: &[u8]) -> Box<dyn ShaderModule> {
        Box::new(NullShaderModule)
    }
    fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> Box<dyn GraphicsPipeline> {
        Box::new(NullGraphicsPipeline {
            bind_groups_layout: desc.bind_groups_layout.clone(),
        })
    }
    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc<'_>) -> Box<dyn ComputePipeline> {
        Box::new(NullComputePipeline {
            bind_groups_layout: desc.bind_groups_layout.clone(),
        })
    }

    fn create_buffer_descriptor(&self, _desc: &BufferDescriptorDesc<'_>, _handle: DescriptorHandle) {
    }
    fn create_texture_descriptor(
        &self,
        _desc: &TextureDescriptorDesc<'_>,
        _handle: DescriptorHandle,
    ) {
    }
    fn create_acceleration_structure_descriptor(
        &self,
        _accel: &dyn AccelerationStructure,
        _handle: DescriptorHandle,
    ) {
    }
    fn create_sampler_descriptor(&self, _sampler: &dyn Sampler, _handle: DescriptorHandle) {}
    fn copy_descriptors(
        &self,
        _dst: DescriptorHandle,
        _src: &[DescriptorHandle],
        _types: &[DescriptorType],
    ) {
    }

    fn create_acceleration_structure(
        &self,
        _desc: &AccelStructureDesc<'_>,
    ) -> Box<dyn AccelerationStructure> {
        Box::new(NullAccelerationStructure {
            id: self.shared.next_id(),
        })
    }
    fn acceleration_structure_memory_size_of_geometry(
        &self,
        _input: &AccelGeometryBuildInput<'_>,
    ) -> AccelMemorySize {
        AccelMemorySize {
            structure_size: 256,
            build_scratch_size: 256,
            update_scratch_size: 128,
        }
    }
    fn acceleration_structure_memory_size_of_instances(
        &self,
        input: &AccelInstanceBuildInput<'_>,
    ) -> AccelMemorySize {
        AccelMemorySize {
            structure_size: 256 + u64::from(input.num_instances) * 64,
            build_scratch_size: 256,
            update_scratch_size: 128,
        }
    }
}
