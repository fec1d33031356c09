//! Shared per-device graphics context.
//!
//! Owns the device, the queues, the CPU-side descriptor heaps and the frame
//! counter. The context is passed around explicitly (no process-wide
//! singleton); resources keep an `Rc` to it so uploads and descriptor
//! allocation do not need to thread the graphics manager through every call.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::rhi;

const CPU_RESOURCE_DESC_HEAP_SIZE: u32 = 8192;
const CPU_SAMPLER_DESC_HEAP_SIZE: u32 = 1024;

struct DelayedDestroy {
    frame: u64,
    callback: Box<dyn FnOnce()>,
}

pub struct GraphicsContext {
    device: Rc<dyn rhi::Device>,
    graphics_queue: Box<dyn rhi::Queue>,
    compute_queue: Box<dyn rhi::Queue>,
    cpu_resource_heap: Box<dyn rhi::DescriptorHeap>,
    cpu_sampler_heap: Box<dyn rhi::DescriptorHeap>,
    // One transfer pool per frame slot, reset together with the frame.
    upload_pools: Vec<Box<dyn rhi::CommandPool>>,
    immediate_fence: Box<dyn rhi::Fence>,
    frame_count: Cell<u64>,
    frames_in_flight: u32,
    delayed_destroys: RefCell<Vec<DelayedDestroy>>,
}

impl GraphicsContext {
    pub fn new(device: Rc<dyn rhi::Device>, frames_in_flight: u32) -> Rc<GraphicsContext> {
        let graphics_queue = device.create_queue(rhi::QueueType::Graphics);
        let compute_queue = device.create_queue(rhi::QueueType::Compute);
        let cpu_resource_heap = device.create_descriptor_heap(&rhi::DescriptorHeapDesc {
            max_count: CPU_RESOURCE_DESC_HEAP_SIZE,
            heap_type: rhi::DescriptorHeapType::Resource,
            shader_visible: false,
        });
        let cpu_sampler_heap = device.create_descriptor_heap(&rhi::DescriptorHeapDesc {
            max_count: CPU_SAMPLER_DESC_HEAP_SIZE,
            heap_type: rhi::DescriptorHeapType::Sampler,
            shader_visible: false,
        });
        let upload_pools = (0..frames_in_flight)
            .map(|_| device.create_command_pool())
            .collect();
        let immediate_fence = device.create_fence();

        Rc::new(GraphicsContext {
            device,
            graphics_queue,
            compute_queue,
            cpu_resource_heap,
            cpu_sampler_heap,
            upload_pools,
            immediate_fence,
            frame_count: Cell::new(0),
            frames_in_flight,
            delayed_destroys: RefCell::new(Vec::new()),
        })
    }

    pub fn device(&self) -> &dyn rhi::Device {
        &*self.device
    }

    pub fn device_rc(&self) -> Rc<dyn rhi::Device> {
        self.device.clone()
    }

    pub fn properties(&self) -> &rhi::DeviceProperties {
        self.device.properties()
    }

    pub fn graphics_queue(&self) -> &dyn rhi::Queue {
        &*self.graphics_queue
    }

    pub fn compute_queue(&self) -> &dyn rhi::Queue {
        &*self.compute_queue
    }

    pub fn frames_in_flight(&self) -> u32 {
        self.frames_in_flight
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count.get()
    }

    pub fn curr_frame_index(&self) -> u32 {
        (self.frame_count.get() % u64::from(self.frames_in_flight)) as u32
    }

    /// Called by the frame loop once the frame slot's fence has been waited
    /// on: recycles the slot's upload pool and runs destructions whose owning
    /// frame is provably complete.
    pub fn begin_frame(&self) {
        self.upload_pools[self.curr_frame_index() as usize].reset();

        let frame_count = self.frame_count.get();
        let frames_in_flight = u64::from(self.frames_in_flight);
        let mut pending = self.delayed_destroys.borrow_mut();
        let mut retained = Vec::with_capacity(pending.len());
        for entry in pending.drain(..) {
            if entry.frame + frames_in_flight <= frame_count {
                (entry.callback)();
            } else {
                retained.push(entry);
            }
        }
        *pending = retained;
    }

    pub fn advance_frame(&self) {
        self.frame_count.set(self.frame_count.get() + 1);
    }

    /// Queues `callback` to run once every frame in flight at call time has
    /// retired. RHI resources moved into the closure stay alive until then.
    pub fn add_delayed_destroy(&self, callback: Box<dyn FnOnce()>) {
        self.delayed_destroys.borrow_mut().push(DelayedDestroy {
            frame: self.frame_count.get(),
            callback,
        });
    }

    /// Runs every pending delayed destruction, regardless of age. Only safe
    /// after the device has gone idle.
    pub fn drain_delayed_destroys(&self) {
        let pending: Vec<_> = self.delayed_destroys.borrow_mut().drain(..).collect();
        for entry in pending {
            (entry.callback)();
        }
    }

    pub fn allocate_cpu_descriptor(
        &self,
        descriptor_type: rhi::DescriptorType,
    ) -> rhi::DescriptorHandle {
        match descriptor_type {
            rhi::DescriptorType::Sampler => {
                self.cpu_sampler_heap.allocate_descriptor(descriptor_type)
            }
            _ => self.cpu_resource_heap.allocate_descriptor(descriptor_type),
        }
    }

    pub fn free_cpu_descriptor(
        &self,
        descriptor_type: rhi::DescriptorType,
        handle: rhi::DescriptorHandle,
    ) {
        match descriptor_type {
            rhi::DescriptorType::Sampler => self.cpu_sampler_heap.free_descriptor(handle),
            _ => self.cpu_resource_heap.free_descriptor(handle),
        }
    }

    /// Records and submits a command buffer within the current frame. The
    /// submission is not waited on.
    pub fn execute_in_this_frame(&self, func: impl FnOnce(&mut dyn rhi::CommandEncoder)) {
        let pool = &self.upload_pools[self.curr_frame_index() as usize];
        let mut encoder = pool.get_command_encoder();
        func(&mut *encoder);
        self.graphics_queue
            .submit_command_buffers(vec![encoder.finish()], &[], &[], None);
    }

    /// Records, submits and blocks until the GPU has finished executing.
    pub fn execute_immediately(&self, func: impl FnOnce(&mut dyn rhi::CommandEncoder)) {
        let pool = &self.upload_pools[self.curr_frame_index() as usize];
        let mut encoder = pool.get_command_encoder();
        func(&mut *encoder);
        self.graphics_queue.submit_command_buffers(
            vec![encoder.finish()],
            &[],
            &[],
            Some(&*self.immediate_fence),
        );
        self.immediate_fence.wait();
    }
}
