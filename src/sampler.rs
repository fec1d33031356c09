//! Sampler wrapper and content-addressed sampler cache.

use fxhash::FxHashMap;
use std::cell::Cell;
use std::rc::Rc;

use crate::context::GraphicsContext;
use crate::rhi;

pub struct Sampler {
    ctx: Rc<GraphicsContext>,
    sampler: Box<dyn rhi::Sampler>,
    desc: rhi::SamplerDesc,
    cpu_descriptor: Cell<rhi::DescriptorHandle>,
}

impl Sampler {
    pub fn new(ctx: &Rc<GraphicsContext>, desc: rhi::SamplerDesc) -> Sampler {
        Sampler {
            ctx: ctx.clone(),
            sampler: ctx.device().create_sampler(&desc),
            desc,
            cpu_descriptor: Cell::new(rhi::DescriptorHandle::default()),
        }
    }

    pub fn desc(&self) -> &rhi::SamplerDesc {
        &self.desc
    }

    pub fn rhi_sampler(&self) -> &dyn rhi::Sampler {
        &*self.sampler
    }

    pub fn get_descriptor(&self) -> rhi::DescriptorHandle {
        let mut handle = self.cpu_descriptor.get();
        if handle == rhi::DescriptorHandle::default() {
            handle = self.ctx.allocate_cpu_descriptor(rhi::DescriptorType::Sampler);
            self.ctx
                .device()
                .create_sampler_descriptor(&*self.sampler, handle);
            self.cpu_descriptor.set(handle);
        }
        handle
    }
}

/// Samplers keyed by structural equality of their descriptor.
#[derive(Default)]
pub struct SamplerCache {
    samplers: FxHashMap<rhi::SamplerDesc, Rc<Sampler>>,
}

impl SamplerCache {
    pub fn new() -> SamplerCache {
        SamplerCache {
            samplers: FxHashMap::default(),
        }
    }

    pub fn get(&mut self, ctx: &Rc<GraphicsContext>, desc: rhi::SamplerDesc) -> Rc<Sampler> {
        self.samplers
            .entry(desc)
            .or_insert_with(|| Rc::new(Sampler::new(ctx, desc)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.samplers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rhi::null::NullDevice;

    #[test]
    fn identical_descs_share_one_sampler() {
        let ctx = GraphicsContext::new(Rc::new(NullDevice::new()), 2);
        let mut cache = SamplerCache::new();

        let desc = rhi::SamplerDesc {
            mag_filter: rhi::SamplerFilterMode::Linear,
            min_filter: rhi::SamplerFilterMode::Linear,
            ..Default::default()
        };
        let a = cache.get(&ctx, desc);
        let b = cache.get(&ctx, desc);
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);

        let c = cache.get(&ctx, rhi::SamplerDesc::default());
        assert!(!Rc::ptr_eq(&a, &c));
        assert_eq!(cache.len(), 2);
    }
}
