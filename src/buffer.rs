//! Buffer resource wrapper.
//!
//! Wraps either a GPU-only RHI buffer backed by a ring of CPU-visible staging
//! buffers (one per frame in flight), or a ring of CPU-visible buffers on its
//! own. View descriptors are cached per key so identical views reuse the same
//! descriptor.

use fxhash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

use crate::context::GraphicsContext;
use crate::rhi;
use crate::shader::ShaderParameterMetadata;

/// Reinterprets a value as its raw bytes for upload.
pub fn as_bytes<T: Copy>(value: &T) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(value as *const T as *const u8, std::mem::size_of::<T>())
    }
}

/// Reinterprets a slice as its raw bytes for upload.
pub fn slice_as_bytes<T: Copy>(values: &[T]) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(values.as_ptr() as *const u8, std::mem::size_of_val(values))
    }
}

/// One range of a multi-range upload.
#[derive(Copy, Clone)]
pub struct DataSetDesc<'a> {
    pub data: &'a [u8],
    pub offset: u64,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
struct BufferDescriptorKey {
    descriptor_type: rhi::DescriptorType,
    format: rhi::ResourceFormat,
    offset: u64,
    size: u64,
    structure_stride: u32,
    // Frame slot of the staging buffer the view refers to; !0 for the GPU buffer.
    buffer_frame_index: u32,
}

pub struct Buffer {
    ctx: Rc<GraphicsContext>,
    desc: rhi::BufferDesc,
    buffer: Option<Box<dyn rhi::Buffer>>,
    staging_buffers: Vec<Box<dyn rhi::Buffer>>,
    cpu_descriptors: RefCell<FxHashMap<BufferDescriptorKey, rhi::DescriptorHandle>>,
}

impl Buffer {
    /// Creates a buffer. `with_staging_buffer` only matters for GPU-only
    /// memory; CPU-visible buffers are always a per-frame ring.
    pub fn new(ctx: &Rc<GraphicsContext>, desc: rhi::BufferDesc, with_staging_buffer: bool) -> Buffer {
        let mut buffer = None;
        let mut staging_buffers = Vec::new();
        if desc.memory_property == rhi::BufferMemoryProperty::GpuOnly {
            buffer = Some(ctx.device().create_buffer(&desc));
            if with_staging_buffer {
                let staging_desc = rhi::BufferDesc {
                    usages: rhi::BufferUsage::empty(),
                    memory_property: rhi::BufferMemoryProperty::CpuToGpu,
                    persistently_mapped: true,
                    ..desc.clone()
                };
                staging_buffers = (0..ctx.frames_in_flight())
                    .map(|_| ctx.device().create_buffer(&staging_desc))
                    .collect();
            }
        } else {
            staging_buffers = (0..ctx.frames_in_flight())
                .map(|_| ctx.device().create_buffer(&desc))
                .collect();
        }
        Buffer {
            ctx: ctx.clone(),
            desc,
            buffer,
            staging_buffers,
            cpu_descriptors: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn desc(&self) -> &rhi::BufferDesc {
        &self.desc
    }

    pub fn has_value(&self) -> bool {
        self.buffer.is_some() || !self.staging_buffers.is_empty()
    }

    /// The GPU buffer if there is one, else the staging buffer of the
    /// current frame.
    pub fn rhi_buffer(&self) -> &dyn rhi::Buffer {
        match &self.buffer {
            Some(buffer) => &**buffer,
            None => self.rhi_staging_buffer(),
        }
    }

    pub fn rhi_staging_buffer(&self) -> &dyn rhi::Buffer {
        &*self.staging_buffers[self.ctx.curr_frame_index() as usize]
    }

    /// Copies `data` into the buffer at `offset`.
    ///
    /// With a GPU buffer present, the copy goes to this frame's staging
    /// buffer and an in-frame transfer is scheduled, bracketed by barriers
    /// from and back to the access type inferred from the declared usages.
    pub fn set_data_raw(&self, data: &[u8], offset: u64) {
        if self.staging_buffers.is_empty() {
            return;
        }

        let size = (data.len() as u64).min(self.desc.size.saturating_sub(offset));
        self.rhi_staging_buffer()
            .write(offset, &data[..size as usize]);

        if let Some(gpu_buffer) = &self.buffer {
            let target_access = transfer_target_access(self.desc.usages);
            self.ctx.execute_in_this_frame(|cmd| {
                cmd.resource_barriers(
                    &[rhi::BufferBarrier {
                        buffer: &**gpu_buffer,
                        src_access: target_access,
                        dst_access: rhi::ResourceAccess::TRANSFER_WRITE,
                    }],
                    &[],
                );
                cmd.copy_buffer_to_buffer(
                    self.rhi_staging_buffer(),
                    &**gpu_buffer,
                    rhi::BufferCopyDesc {
                        src_offset: offset,
                        dst_offset: offset,
                        size,
                    },
                );
                cmd.resource_barriers(
                    &[rhi::BufferBarrier {
                        buffer: &**gpu_buffer,
                        src_access: rhi::ResourceAccess::TRANSFER_WRITE,
                        dst_access: target_access,
                    }],
                    &[],
                );
            });
        }
    }

    /// Multi-range variant of [`set_data_raw`](Self::set_data_raw); the
    /// transfer of all ranges is bracketed by a single barrier pair.
    pub fn set_multiple_data_raw(&self, descs: &[DataSetDesc<'_>]) {
        if self.staging_buffers.is_empty() {
            return;
        }

        let staging = self.rhi_staging_buffer();
        for desc in descs {
            let size = (desc.data.len() as u64).min(self.desc.size.saturating_sub(desc.offset));
            staging.write(desc.offset, &desc.data[..size as usize]);
        }

        if let Some(gpu_buffer) = &self.buffer {
            let target_access = transfer_target_access(self.desc.usages);
            self.ctx.execute_in_this_frame(|cmd| {
                cmd.resource_barriers(
                    &[rhi::BufferBarrier {
                        buffer: &**gpu_buffer,
                        src_access: target_access,
                        dst_access: rhi::ResourceAccess::TRANSFER_WRITE,
                    }],
                    &[],
                );
                cmd.copy_buffer_to_buffer(
                    self.rhi_staging_buffer(),
                    &**gpu_buffer,
                    rhi::BufferCopyDesc::default(),
                );
                cmd.resource_barriers(
                    &[rhi::BufferBarrier {
                        buffer: &**gpu_buffer,
                        src_access: rhi::ResourceAccess::TRANSFER_WRITE,
                        dst_access: target_access,
                    }],
                    &[],
                );
            });
        }
    }

    /// Reads back the contents of this frame's CPU-visible buffer.
    pub fn get_data_raw(&self, out: &mut [u8]) {
        if !self.staging_buffers.is_empty() {
            self.rhi_staging_buffer().read(0, out);
        }
    }

    pub fn get_cbv(&self) -> rhi::DescriptorHandle {
        self.get_descriptor_by_key(BufferDescriptorKey {
            descriptor_type: rhi::DescriptorType::UniformBuffer,
            format: rhi::ResourceFormat::Undefined,
            offset: 0,
            size: 0,
            structure_stride: 0,
            buffer_frame_index: self.view_frame_index(),
        })
    }

    pub fn get_descriptor(
        &self,
        metadata: &ShaderParameterMetadata,
        offset: u64,
        size: u64,
    ) -> rhi::DescriptorHandle {
        self.get_descriptor_by_key(BufferDescriptorKey {
            descriptor_type: metadata.descriptor_type,
            format: metadata.format,
            offset,
            size,
            structure_stride: metadata.structured_stride,
            buffer_frame_index: self.view_frame_index(),
        })
    }

    fn view_frame_index(&self) -> u32 {
        if self.buffer.is_some() {
            !0
        } else {
            self.ctx.curr_frame_index()
        }
    }

    fn get_descriptor_by_key(&self, key: BufferDescriptorKey) -> rhi::DescriptorHandle {
        if let Some(&handle) = self.cpu_descriptors.borrow().get(&key) {
            return handle;
        }

        let handle = self.ctx.allocate_cpu_descriptor(key.descriptor_type);
        let buffer = if key.buffer_frame_index == !0 {
            self.rhi_buffer()
        } else {
            &*self.staging_buffers[key.buffer_frame_index as usize]
        };
        self.ctx.device().create_buffer_descriptor(
            &rhi::BufferDescriptorDesc {
                buffer,
                descriptor_type: key.descriptor_type,
                offset: key.offset,
                size: key.size,
                structure_stride: key.structure_stride,
                format: key.format,
            },
            handle,
        );
        self.cpu_descriptors.borrow_mut().insert(key, handle);
        handle
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        for (key, handle) in self.cpu_descriptors.borrow_mut().drain() {
            self.ctx.free_cpu_descriptor(key.descriptor_type, handle);
        }
        let buffer = self.buffer.take();
        let staging_buffers = std::mem::replace(&mut self.staging_buffers, Vec::new());
        if buffer.is_some() || !staging_buffers.is_empty() {
            self.ctx.add_delayed_destroy(Box::new(move || {
                drop(buffer);
                drop(staging_buffers);
            }));
        }
    }
}

fn transfer_target_access(usages: rhi::BufferUsage) -> rhi::ResourceAccess {
    if usages.contains(rhi::BufferUsage::UNIFORM) {
        rhi::ResourceAccess::UNIFORM_BUFFER_READ
    } else if usages.contains(rhi::BufferUsage::INDIRECT) {
        rhi::ResourceAccess::INDIRECT_READ
    } else if usages.contains(rhi::BufferUsage::STORAGE_READ) {
        rhi::ResourceAccess::STORAGE_READ
    } else {
        rhi::ResourceAccess::NONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rhi::null::{Event, NullDevice};

    fn test_ctx() -> (Rc<GraphicsContext>, crate::rhi::null::EventLog) {
        let device = NullDevice::new();
        let log = device.event_log();
        (GraphicsContext::new(Rc::new(device), 2), log)
    }

    #[test]
    fn staged_upload_emits_transfer_barriers() {
        let (ctx, log) = test_ctx();
        let buffer = Buffer::new(
            &ctx,
            rhi::BufferDesc {
                size: 256,
                usages: rhi::BufferUsage::UNIFORM,
                memory_property: rhi::BufferMemoryProperty::GpuOnly,
                ..Default::default()
            },
            true,
        );
        buffer.set_data_raw(&[1u8, 2, 3, 4], 0);

        let events = log.borrow();
        let barriers: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::BufferBarrier { src, dst, .. } => Some((*src, *dst)),
                _ => None,
            })
            .collect();
        assert_eq!(
            barriers,
            [
                (
                    rhi::ResourceAccess::UNIFORM_BUFFER_READ,
                    rhi::ResourceAccess::TRANSFER_WRITE
                ),
                (
                    rhi::ResourceAccess::TRANSFER_WRITE,
                    rhi::ResourceAccess::UNIFORM_BUFFER_READ
                ),
            ]
        );
        assert!(events.iter().any(|e| match e {
            Event::CopyBufferToBuffer { .. } => true,
            _ => false,
        }));
    }

    #[test]
    fn cpu_visible_upload_does_not_submit() {
        let (ctx, log) = test_ctx();
        let buffer = Buffer::new(
            &ctx,
            rhi::BufferDesc {
                size: 64,
                memory_property: rhi::BufferMemoryProperty::CpuToGpu,
                ..Default::default()
            },
            false,
        );
        buffer.set_data_raw(&[7u8; 16], 8);
        assert!(log.borrow().is_empty());

        let mut out = [0u8; 32];
        buffer.get_data_raw(&mut out);
        assert_eq!(out[8..24], [7u8; 16]);
    }

    #[test]
    fn view_descriptors_are_cached() {
        let (ctx, _log) = test_ctx();
        let buffer = Buffer::new(
            &ctx,
            rhi::BufferDesc {
                size: 64,
                usages: rhi::BufferUsage::UNIFORM,
                ..Default::default()
            },
            false,
        );
        let a = buffer.get_cbv();
        let b = buffer.get_cbv();
        assert_eq!(a, b);
    }
}
