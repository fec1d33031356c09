//! Texture resource wrapper.

use fxhash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

use crate::context::GraphicsContext;
use crate::rhi;
use crate::shader::ShaderParameterMetadata;

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
struct TextureDescriptorKey {
    descriptor_type: rhi::DescriptorType,
    format: rhi::ResourceFormat,
    view_type: rhi::TextureViewType,
    base_level: u32,
    num_levels: u32,
    base_layer: u32,
    num_layers: u32,
}

/// Either an owned RHI texture or an imported, non-owned reference (for
/// example a swapchain image). View descriptors are cached per key.
pub struct Texture {
    ctx: Rc<GraphicsContext>,
    texture: Option<Box<dyn rhi::Texture>>,
    imported_texture: Option<Rc<dyn rhi::Texture>>,
    desc: rhi::TextureDesc,
    cpu_descriptors: RefCell<FxHashMap<TextureDescriptorKey, rhi::DescriptorHandle>>,
}

impl Texture {
    pub fn new(ctx: &Rc<GraphicsContext>, desc: rhi::TextureDesc) -> Texture {
        let texture = ctx.device().create_texture(&desc);
        Texture {
            ctx: ctx.clone(),
            texture: Some(texture),
            imported_texture: None,
            desc,
            cpu_descriptors: RefCell::new(FxHashMap::default()),
        }
    }

    /// Wraps a texture owned elsewhere. The wrapper never destroys it.
    pub fn from_imported(ctx: &Rc<GraphicsContext>, texture: Rc<dyn rhi::Texture>) -> Texture {
        let desc = texture.desc().clone();
        Texture {
            ctx: ctx.clone(),
            texture: None,
            imported_texture: Some(texture),
            desc,
            cpu_descriptors: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn desc(&self) -> &rhi::TextureDesc {
        &self.desc
    }

    pub fn has_value(&self) -> bool {
        self.texture.is_some() || self.imported_texture.is_some()
    }

    pub fn is_imported(&self) -> bool {
        self.imported_texture.is_some()
    }

    pub fn rhi_texture(&self) -> &dyn rhi::Texture {
        match &self.imported_texture {
            Some(texture) => &**texture,
            None => &**self.texture.as_ref().expect("texture has no value"),
        }
    }

    pub fn get_srv(
        &self,
        base_level: u32,
        num_levels: u32,
        base_layer: u32,
        num_layers: u32,
    ) -> rhi::DescriptorHandle {
        self.get_descriptor_by_key(TextureDescriptorKey {
            descriptor_type: rhi::DescriptorType::SampledTexture,
            format: self.desc.format,
            view_type: rhi::TextureViewType::Automatic,
            base_level,
            num_levels,
            base_layer,
            num_layers,
        })
    }

    pub fn get_uav(&self, mip_level: u32, base_layer: u32, num_layers: u32) -> rhi::DescriptorHandle {
        self.get_descriptor_by_key(TextureDescriptorKey {
            descriptor_type: rhi::DescriptorType::ReadWriteStorageTexture,
            format: self.desc.format,
            view_type: rhi::TextureViewType::Automatic,
            base_level: mip_level,
            num_levels: 1,
            base_layer,
            num_layers,
        })
    }

    pub fn get_descriptor(
        &self,
        metadata: &ShaderParameterMetadata,
        base_level: u32,
        num_levels: u32,
        base_layer: u32,
        num_layers: u32,
    ) -> rhi::DescriptorHandle {
        self.get_descriptor_by_key(TextureDescriptorKey {
            descriptor_type: metadata.descriptor_type,
            format: metadata.format,
            view_type: metadata.texture_view_type,
            base_level,
            num_levels,
            base_layer,
            num_layers,
        })
    }

    fn get_descriptor_by_key(&self, key: TextureDescriptorKey) -> rhi::DescriptorHandle {
        if let Some(&handle) = self.cpu_descriptors.borrow().get(&key) {
            return handle;
        }

        let handle = self.ctx.allocate_cpu_descriptor(key.descriptor_type);
        self.ctx.device().create_texture_descriptor(
            &rhi::TextureDescriptorDesc {
                texture: self.rhi_texture(),
                descriptor_type: key.descriptor_type,
                base_level: key.base_level,
                num_levels: key.num_levels,
                base_layer: key.base_layer,
                num_layers: key.num_layers,
                format: key.format,
                view_type: key.view_type,
            },
            handle,
        );
        self.cpu_descriptors.borrow_mut().insert(key, handle);
        handle
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        for (key, handle) in self.cpu_descriptors.borrow_mut().drain() {
            self.ctx.free_cpu_descriptor(key.descriptor_type, handle);
        }
        if let Some(texture) = self.texture.take() {
            self.ctx
                .add_delayed_destroy(Box::new(move || drop(texture)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rhi::null::NullDevice;

    #[test]
    fn srv_descriptors_are_cached_per_view() {
        let ctx = GraphicsContext::new(Rc::new(NullDevice::new()), 2);
        let texture = Texture::new(
            &ctx,
            rhi::TextureDesc {
                extent: rhi::Extent3d {
                    width: 16,
                    height: 16,
                    depth_or_layers: 1,
                },
                levels: 4,
                format: rhi::ResourceFormat::Rgba8Unorm,
                dim: rhi::TextureDimension::D2,
                usages: rhi::TextureUsage::SAMPLED,
            },
        );
        let a = texture.get_srv(0, 1, 0, 1);
        let b = texture.get_srv(0, 1, 0, 1);
        let c = texture.get_srv(1, 1, 0, 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
