//! Pass execution contexts and rendered-object lists.

use bitflags::bitflags;
use std::rc::Rc;

use super::{RenderGraph, TextureHandle};
use crate::accel::AccelerationStructure;
use crate::buffer::Buffer;
use crate::camera::CameraHandle;
use crate::commands::{CommandHelpers, MipmapMode};
use crate::context::GraphicsContext;
use crate::drawable::Drawable;
use crate::interface::FragmentShader;
use crate::manager::{FrameDescriptors, PipelineCache};
use crate::rhi;
use crate::scene::GpuScene;
use crate::shader::{ResourceSlot, ShaderParameter, SAMPLERS_BINDING_SHIFT};
use crate::texture::Texture;

pub const GRAPHICS_SET_MESH: u32 = 0;
pub const GRAPHICS_SET_MATERIAL: u32 = 1;
pub const GRAPHICS_SET_FRAGMENT: u32 = 2;
pub const GRAPHICS_SET_CAMERA: u32 = 3;
pub const GRAPHICS_SET_SAMPLERS: u32 = 3;

const POSSIBLE_MAX_SETS: u32 = 8;

bitflags! {
    pub struct RenderedObjectType: u32 {
        const OPAQUE      = 0x1;
        const TRANSPARENT = 0x2;
    }
}

pub struct RenderedObjectListDesc {
    pub camera: CameraHandle,
    pub fragment_shader: Rc<FragmentShader>,
    pub object_type: RenderedObjectType,
}

pub struct RenderedObjectListItem {
    pub drawables: Vec<Rc<Drawable>>,
}

/// Drawables grouped into pipeline-sharing runs, ordered by mesh identity,
/// then base material, then topology.
pub struct RenderedObjectList {
    pub camera: CameraHandle,
    pub fragment_shader: Rc<FragmentShader>,
    pub items: Vec<RenderedObjectListItem>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RenderedObjectListHandle(pub(crate) usize);

/// Everything pass execution needs besides the graph itself. Assembled by
/// the graphics manager from disjoint parts of its state.
pub struct ExecResources<'a> {
    pub ctx: &'a Rc<GraphicsContext>,
    pub scene: &'a GpuScene,
    pub pipelines: &'a mut PipelineCache,
    pub frame: &'a mut FrameDescriptors,
    pub helpers: &'a mut CommandHelpers,
}

impl<'a> ExecResources<'a> {
    pub(crate) fn blit_2d(
        &mut self,
        cmd: &mut dyn rhi::CommandEncoder,
        src: &Texture,
        src_mip_level: u32,
        src_array_layer: u32,
        dst: &Texture,
        dst_mip_level: u32,
        dst_array_layer: u32,
    ) {
        let ExecResources {
            ctx,
            frame,
            helpers,
            ..
        } = self;
        helpers.blit_2d(
            ctx,
            frame,
            cmd,
            src,
            src_mip_level,
            src_array_layer,
            dst,
            dst_mip_level,
            dst_array_layer,
        );
    }

    pub(crate) fn generate_mipmaps_2d(
        &mut self,
        cmd: &mut dyn rhi::CommandEncoder,
        texture: &Texture,
        access: &mut rhi::ResourceAccess,
        mode: MipmapMode,
    ) {
        let ExecResources {
            ctx,
            frame,
            helpers,
            ..
        } = self;
        helpers.generate_mipmaps_2d(ctx, frame, cmd, texture, access, mode);
    }
}

//--------------------------------------------------------------------------------------------------
// Resource binding

#[derive(Default)]
struct SetSamplers {
    cpu_descriptors: Vec<rhi::DescriptorHandle>,
    layout: rhi::BindGroupLayout,
}

/// Gathers CPU descriptors for one parameter block and resolves them to one
/// GPU-visible descriptor set. With a separate sampler heap, samplers are
/// collected per owning set and bound together afterwards.
pub(crate) struct ResourceBindingContext {
    set_samplers: Vec<SetSamplers>,
}

impl ResourceBindingContext {
    pub fn new() -> ResourceBindingContext {
        ResourceBindingContext {
            set_samplers: (0..POSSIBLE_MAX_SETS).map(|_| SetSamplers::default()).collect(),
        }
    }

    fn bind_shader_params(
        &mut self,
        ctx: &GraphicsContext,
        frame: &mut FrameDescriptors,
        set: u32,
        params: &ShaderParameter,
        bind: &mut dyn FnMut(u32, rhi::DescriptorHandle),
    ) {
        params.update_uniform_buffer();
        let separate_samplers = ctx.properties().separate_sampler_heap;

        let mut cpu_descriptors = Vec::new();
        let mut desc_types = Vec::new();
        let mut layout: rhi::BindGroupLayout = Vec::new();
        if let Some(uniform_buffer) = params.uniform_buffer() {
            cpu_descriptors.push(uniform_buffer.get_cbv());
            desc_types.push(rhi::DescriptorType::UniformBuffer);
            layout.push(rhi::BindGroupLayoutEntry {
                count: 1,
                descriptor_type: rhi::DescriptorType::UniformBuffer,
                visibility: rhi::ShaderStage::empty(),
                binding_or_register: 0,
                space: set,
            });
        }

        if separate_samplers {
            let samplers = &mut self.set_samplers[set as usize];
            samplers.cpu_descriptors.clear();
            samplers.layout.clear();
        }

        let metadata = params.metadata_list();
        let mut slots = params.layout().iter();
        let mut curr_binding = 1;
        for param in &metadata.params {
            let count = param.element_count();
            if param.descriptor_type == rhi::DescriptorType::None {
                for _ in 0..count {
                    slots.next();
                }
                continue;
            }

            for _ in 0..count {
                let slot = match slots.next() {
                    Some(slot) => slot,
                    None => break,
                };
                let resource_index = match slot.resource_index {
                    Some(index) => index,
                    None => continue,
                };
                match params.resource(resource_index) {
                    ResourceSlot::Buffer(buffer) => {
                        cpu_descriptors.push(buffer.buffer.get_descriptor(
                            param,
                            buffer.offset,
                            buffer.size,
                        ));
                        desc_types.push(param.descriptor_type);
                    }
                    ResourceSlot::Texture(texture) => {
                        cpu_descriptors.push(texture.texture.get_descriptor(
                            param,
                            texture.base_level,
                            texture.num_levels,
                            texture.base_layer,
                            texture.num_layers,
                        ));
                        desc_types.push(param.descriptor_type);
                    }
                    ResourceSlot::RwTexture(texture) => {
                        cpu_descriptors.push(texture.texture.get_descriptor(
                            param,
                            texture.mip_level,
                            1,
                            texture.base_layer,
                            texture.num_layers,
                        ));
                        desc_types.push(param.descriptor_type);
                    }
                    ResourceSlot::AccelerationStructure(accel) => {
                        cpu_descriptors.push(accel.accel.get_descriptor());
                        desc_types.push(param.descriptor_type);
                    }
                    ResourceSlot::Sampler(sampler) => {
                        if separate_samplers {
                            self.set_samplers[set as usize]
                                .cpu_descriptors
                                .push(sampler.sampler.get_descriptor());
                        } else {
                            cpu_descriptors.push(sampler.sampler.get_descriptor());
                            desc_types.push(param.descriptor_type);
                        }
                    }
                    ResourceSlot::Empty => {
                        log::error!(
                            target: "gfx",
                            "shader parameter `{}` was never bound",
                            param.var_name
                        );
                    }
                }
            }

            let mut entry = rhi::BindGroupLayoutEntry {
                count,
                descriptor_type: param.descriptor_type,
                visibility: rhi::ShaderStage::empty(),
                binding_or_register: curr_binding,
                space: set,
            };
            if separate_samplers && param.descriptor_type == rhi::DescriptorType::Sampler {
                entry.binding_or_register += set * SAMPLERS_BINDING_SHIFT;
                self.set_samplers[set as usize].layout.push(entry);
            } else {
                layout.push(entry);
            }
            curr_binding += count;
        }

        let descriptor = frame.get_descriptors_for(ctx, cpu_descriptors, &desc_types, &layout);
        bind(set, descriptor);
    }

    /// Binds the dedicated sampler set from all samplers collected so far.
    fn bind_samplers(
        &mut self,
        ctx: &GraphicsContext,
        frame: &mut FrameDescriptors,
        set: u32,
        bind: &mut dyn FnMut(u32, rhi::DescriptorHandle),
    ) {
        let mut cpu_descriptors = Vec::new();
        let mut layout: rhi::BindGroupLayout = Vec::new();
        for samplers in &self.set_samplers {
            cpu_descriptors.extend_from_slice(&samplers.cpu_descriptors);
            layout.extend(samplers.layout.iter().cloned());
        }
        let desc_types = vec![rhi::DescriptorType::Sampler; cpu_descriptors.len()];
        let descriptor = frame.get_descriptors_for(ctx, cpu_descriptors, &desc_types, &layout);
        bind(set, descriptor);
    }
}

//--------------------------------------------------------------------------------------------------
// Pass contexts

/// Handed to graphics pass callbacks; wraps the render pass encoder together
/// with the graph resources and the frame's binding facilities.
pub struct GraphicsPassContext<'a, 'r> {
    pub(crate) graph: &'a RenderGraph,
    pub encoder: &'a mut (dyn rhi::GraphicsEncoder + 'a),
    pub res: &'a mut ExecResources<'r>,
    pub color_formats: Vec<rhi::ResourceFormat>,
    pub depth_stencil_format: rhi::ResourceFormat,
    pub(crate) binding: ResourceBindingContext,
}

impl<'a, 'r> GraphicsPassContext<'a, 'r> {
    pub fn buffer(&self, handle: super::BufferHandle) -> Rc<Buffer> {
        self.graph.buffer(handle)
    }

    pub fn texture(&self, handle: TextureHandle) -> Rc<Texture> {
        self.graph.texture(handle)
    }

    pub fn acceleration_structure(
        &self,
        handle: super::AccelerationStructureHandle,
    ) -> Rc<AccelerationStructure> {
        self.graph.acceleration_structure(handle)
    }

    /// Binds one parameter block at `set`.
    pub fn set_shader_params(&mut self, set: u32, params: &ShaderParameter) {
        let encoder = &mut *self.encoder;
        let res = &mut *self.res;
        self.binding.bind_shader_params(
            res.ctx,
            res.frame,
            set,
            params,
            &mut |set, descriptor| encoder.set_descriptors(set, &[descriptor]),
        );
    }

    /// Binds the dedicated sampler set; a no-op on devices without a
    /// separate sampler heap.
    pub fn set_samplers(&mut self, set: u32) {
        if !self.res.ctx.properties().separate_sampler_heap {
            return;
        }
        let encoder = &mut *self.encoder;
        let res = &mut *self.res;
        self.binding
            .bind_samplers(res.ctx, res.frame, set, &mut |set, descriptor| {
                encoder.set_descriptors(set, &[descriptor])
            });
    }

    /// Draws every item of a rendered-object list: compiles (or fetches) the
    /// item pipeline, binds the camera, fragment, mesh and material parameter
    /// sets and issues one indexed draw per drawable.
    pub fn render_list(&mut self, handle: RenderedObjectListHandle, fragment_params: &ShaderParameter) {
        let list = self.graph.rendered_object_list(handle);
        let res = &mut *self.res;
        let encoder = &mut *self.encoder;
        let binding = &mut self.binding;

        let camera = match res.scene.camera(list.camera) {
            Some(camera) => camera,
            None => {
                log::warn!(target: "gfx", "rendered object list references a dead camera");
                return;
            }
        };
        let separate_samplers = res.ctx.properties().separate_sampler_heap;

        for item in &list.items {
            let head = match item.drawables.first() {
                Some(head) => head,
                None => continue,
            };
            let pipeline = res.pipelines.compile_pipeline_for_drawable(
                res.ctx,
                camera,
                head,
                &list.fragment_shader,
                &self.color_formats,
                self.depth_stencil_format,
            );
            encoder.set_pipeline(&*pipeline);

            {
                let camera_params = camera.shader_params().borrow();
                binding.bind_shader_params(
                    res.ctx,
                    res.frame,
                    GRAPHICS_SET_CAMERA,
                    &camera_params,
                    &mut |set, descriptor| encoder.set_descriptors(set, &[descriptor]),
                );
            }
            binding.bind_shader_params(
                res.ctx,
                res.frame,
                GRAPHICS_SET_FRAGMENT,
                fragment_params,
                &mut |set, descriptor| encoder.set_descriptors(set, &[descriptor]),
            );

            for drawable in &item.drawables {
                drawable.mesh.fill_shader_params(res.ctx, drawable);
                {
                    let mesh_params = drawable.shader_params.borrow();
                    binding.bind_shader_params(
                        res.ctx,
                        res.frame,
                        GRAPHICS_SET_MESH,
                        &mesh_params,
                        &mut |set, descriptor| encoder.set_descriptors(set, &[descriptor]),
                    );
                }
                {
                    let material_params = drawable.material.shader_parameters().borrow();
                    binding.bind_shader_params(
                        res.ctx,
                        res.frame,
                        GRAPHICS_SET_MATERIAL,
                        &material_params,
                        &mut |set, descriptor| encoder.set_descriptors(set, &[descriptor]),
                    );
                }
                if separate_samplers {
                    binding.bind_samplers(
                        res.ctx,
                        res.frame,
                        GRAPHICS_SET_SAMPLERS,
                        &mut |set, descriptor| encoder.set_descriptors(set, &[descriptor]),
                    );
                }

                drawable.mesh.bind_buffers(encoder);
                encoder.draw_indexed(drawable.mesh.num_indices());
            }
        }
    }
}

/// Handed to compute pass callbacks.
pub struct ComputePassContext<'a, 'r> {
    pub(crate) graph: &'a RenderGraph,
    pub encoder: &'a mut (dyn rhi::ComputeEncoder + 'a),
    pub res: &'a mut ExecResources<'r>,
    pub(crate) binding: ResourceBindingContext,
}

impl<'a, 'r> ComputePassContext<'a, 'r> {
    pub fn buffer(&self, handle: super::BufferHandle) -> Rc<Buffer> {
        self.graph.buffer(handle)
    }

    pub fn texture(&self, handle: TextureHandle) -> Rc<Texture> {
        self.graph.texture(handle)
    }

    pub fn acceleration_structure(
        &self,
        handle: super::AccelerationStructureHandle,
    ) -> Rc<AccelerationStructure> {
        self.graph.acceleration_structure(handle)
    }

    pub fn set_shader_params(&mut self, set: u32, params: &ShaderParameter) {
        let encoder = &mut *self.encoder;
        let res = &mut *self.res;
        self.binding.bind_shader_params(
            res.ctx,
            res.frame,
            set,
            params,
            &mut |set, descriptor| encoder.set_descriptors(set, &[descriptor]),
        );
    }
}
