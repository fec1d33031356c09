//! Transient resource pools.
//!
//! Pools survive across frames: releasing a resource only pushes its index
//! onto the recycled list, the RHI allocation stays alive for reuse by later
//! frames. Buffers are bucketed by power-of-two size class, textures by their
//! full description.

use fxhash::FxHashMap;
use std::rc::Rc;

use crate::buffer::Buffer;
use crate::context::GraphicsContext;
use crate::rhi;
use crate::texture::Texture;

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct BufferPoolKey {
    size_log: u32,
    memory_property: rhi::BufferMemoryProperty,
    usages: rhi::BufferUsage,
}

impl BufferPoolKey {
    fn of(desc: &rhi::BufferDesc) -> BufferPoolKey {
        let mut size_log = 0;
        let mut bucket_size = 1u64;
        while bucket_size < desc.size {
            bucket_size <<= 1;
            size_log += 1;
        }
        BufferPoolKey {
            size_log,
            memory_property: desc.memory_property,
            usages: desc.usages,
        }
    }

    fn bucket_size(&self) -> u64 {
        1u64 << self.size_log
    }
}

#[derive(derivative::Derivative)]
#[derivative(Default(bound = ""))]
pub(crate) struct ResourcePool<T> {
    resources: Vec<Option<Rc<T>>>,
    accesses: Vec<rhi::ResourceAccess>,
    recycled: Vec<usize>,
}

impl<T> ResourcePool<T> {
    /// Reuses a recycled entry if one exists, else allocates a new one. The
    /// returned access is the state the resource was last released in.
    fn acquire(&mut self, create: impl FnOnce() -> T) -> (Rc<T>, usize, rhi::ResourceAccess) {
        if let Some(index) = self.recycled.pop() {
            if self.resources[index].is_none() {
                // the entry was taken out of the pool; back it anew
                self.resources[index] = Some(Rc::new(create()));
                self.accesses[index] = rhi::ResourceAccess::NONE;
            }
            let resource = self.resources[index].as_ref().unwrap().clone();
            (resource, index, self.accesses[index])
        } else {
            let index = self.resources.len();
            let resource = Rc::new(create());
            self.resources.push(Some(resource.clone()));
            self.accesses.push(rhi::ResourceAccess::NONE);
            (resource, index, rhi::ResourceAccess::NONE)
        }
    }

    fn release(&mut self, index: usize, access: rhi::ResourceAccess) {
        self.accesses[index] = access;
        self.recycled.push(index);
    }

    /// Extracts the resource at `index` out of the pool; the slot is marked
    /// recycled and will be backed by a fresh allocation on next use.
    fn take(&mut self, index: usize) -> Option<Rc<T>> {
        let resource = self.resources[index].take();
        self.recycled.push(index);
        resource
    }
}

#[derive(Default)]
pub(crate) struct TransientPools {
    buffers: FxHashMap<BufferPoolKey, ResourcePool<Buffer>>,
    textures: FxHashMap<rhi::TextureDesc, ResourcePool<Texture>>,
}

impl TransientPools {
    pub fn acquire_buffer(
        &mut self,
        ctx: &Rc<GraphicsContext>,
        desc: &rhi::BufferDesc,
    ) -> (Rc<Buffer>, usize, rhi::ResourceAccess) {
        let key = BufferPoolKey::of(desc);
        // allocate at the bucket size so any request in the class fits
        let create_desc = rhi::BufferDesc {
            size: key.bucket_size(),
            ..desc.clone()
        };
        self.buffers
            .entry(key)
            .or_insert_with(ResourcePool::default)
            .acquire(|| Buffer::new(ctx, create_desc, false))
    }

    pub fn release_buffer(&mut self, desc: &rhi::BufferDesc, index: usize, access: rhi::ResourceAccess) {
        if let Some(pool) = self.buffers.get_mut(&BufferPoolKey::of(desc)) {
            pool.release(index, access);
        }
    }

    pub fn take_buffer(&mut self, desc: &rhi::BufferDesc, index: usize) -> Option<Rc<Buffer>> {
        self.buffers
            .get_mut(&BufferPoolKey::of(desc))
            .and_then(|pool| pool.take(index))
    }

    pub fn acquire_texture(
        &mut self,
        ctx: &Rc<GraphicsContext>,
        desc: &rhi::TextureDesc,
    ) -> (Rc<Texture>, usize, rhi::ResourceAccess) {
        let create_desc = desc.clone();
        self.textures
            .entry(desc.clone())
            .or_insert_with(ResourcePool::default)
            .acquire(|| Texture::new(ctx, create_desc))
    }

    pub fn release_texture(
        &mut self,
        desc: &rhi::TextureDesc,
        index: usize,
        access: rhi::ResourceAccess,
    ) {
        if let Some(pool) = self.textures.get_mut(desc) {
            pool.release(index, access);
        }
    }

    pub fn take_texture(&mut self, desc: &rhi::TextureDesc, index: usize) -> Option<Rc<Texture>> {
        self.textures
            .get_mut(desc)
            .and_then(|pool| pool.take(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rhi::null::NullDevice;

    #[test]
    fn recycled_entries_keep_their_access() {
        let ctx = GraphicsContext::new(Rc::new(NullDevice::new()), 2);
        let mut pools = TransientPools::default();
        let desc = rhi::BufferDesc {
            size: 300,
            usages: rhi::BufferUsage::STORAGE_READ_WRITE,
            ..Default::default()
        };

        let (first, index, access) = pools.acquire_buffer(&ctx, &desc);
        assert_eq!(access, rhi::ResourceAccess::NONE);
        // bucketed to the next power of two
        assert_eq!(first.desc().size, 512);
        pools.release_buffer(&desc, index, rhi::ResourceAccess::STORAGE_WRITE);

        // a same-class request reuses the entry and carries the access forward
        let other = rhi::BufferDesc {
            size: 500,
            usages: rhi::BufferUsage::STORAGE_READ_WRITE,
            ..Default::default()
        };
        let (second, second_index, access) = pools.acquire_buffer(&ctx, &other);
        assert_eq!(second_index, index);
        assert_eq!(access, rhi::ResourceAccess::STORAGE_WRITE);
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn taken_entries_are_backed_anew() {
        let ctx = GraphicsContext::new(Rc::new(NullDevice::new()), 2);
        let mut pools = TransientPools::default();
        let desc = rhi::TextureDesc {
            extent: rhi::Extent3d {
                width: 8,
                height: 8,
                depth_or_layers: 1,
            },
            levels: 1,
            format: rhi::ResourceFormat::Rgba8Unorm,
            dim: rhi::TextureDimension::D2,
            usages: rhi::TextureUsage::SAMPLED,
        };
        let (first, index, _) = pools.acquire_texture(&ctx, &desc);
        let taken = pools.take_texture(&desc, index).unwrap();
        assert!(Rc::ptr_eq(&first, &taken));

        let (second, second_index, access) = pools.acquire_texture(&ctx, &desc);
        assert_eq!(second_index, index);
        assert_eq!(access, rhi::ResourceAccess::NONE);
        assert!(!Rc::ptr_eq(&first, &second));
    }
}
