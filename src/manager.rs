//! Graphics manager: frame orchestration and pipeline compilation.
//!
//! Owns the device context, the swapchain, the per-frame ring of command
//! pools, descriptor heaps and synchronisation objects, the GPU scene and the
//! render graph. Initialised once by the engine and torn down in reverse;
//! passed around as a context argument rather than through globals.

use fxhash::FxHashMap;
use std::rc::Rc;

use crate::camera::{Camera, CameraHandle};
use crate::commands::CommandHelpers;
use crate::context::GraphicsContext;
use crate::drawable::Drawable;
use crate::graph::{
    ExecResources, RenderGraph, GRAPHICS_SET_CAMERA, GRAPHICS_SET_FRAGMENT, GRAPHICS_SET_MATERIAL,
    GRAPHICS_SET_MESH, GRAPHICS_SET_SAMPLERS,
};
use crate::interface::{BlendMode, Displayer, FragmentShader, Renderer};
use crate::rhi;
use crate::sampler::{Sampler, SamplerCache};
use crate::scene::GpuScene;
use crate::shader::{
    CompilerEnvironment, ShaderCompiler, ShaderSourceCompiler, SAMPLERS_BINDING_SHIFT,
};
use crate::texture::Texture;
use crate::vfs::Vfs;

const GPU_RESOURCE_DESC_HEAP_SIZE: u32 = 2048;
const GPU_SAMPLER_DESC_HEAP_SIZE: u32 = 1024;

#[derive(Clone, Debug)]
pub struct GraphicsSettings {
    pub frames_in_flight: u32,
    pub enable_validation: bool,
    pub swapchain_width: u32,
    pub swapchain_height: u32,
}

impl Default for GraphicsSettings {
    fn default() -> Self {
        GraphicsSettings {
            frames_in_flight: 2,
            enable_validation: false,
            swapchain_width: 1280,
            swapchain_height: 720,
        }
    }
}

impl GraphicsSettings {
    /// Applies `gfx.*` overrides from a configuration source.
    pub fn with_config(mut self, cfg: &config::Config) -> GraphicsSettings {
        self.frames_in_flight = cfg
            .get::<u32>("gfx.frames_in_flight")
            .unwrap_or(self.frames_in_flight);
        self.enable_validation = cfg
            .get::<bool>("gfx.enable_validation")
            .unwrap_or(self.enable_validation);
        self.swapchain_width = cfg
            .get::<u32>("gfx.swapchain_width")
            .unwrap_or(self.swapchain_width);
        self.swapchain_height = cfg
            .get::<u32>("gfx.swapchain_height")
            .unwrap_or(self.swapchain_height);
        self
    }
}

//--------------------------------------------------------------------------------------------------
// Per-frame descriptor caching

/// GPU-visible descriptor heaps of one frame slot, plus the cache mapping an
/// ordered CPU descriptor list to its GPU-visible copy. Reset together with
/// the frame's command pool.
pub struct FrameDescriptors {
    resource_heap: Box<dyn rhi::DescriptorHeap>,
    sampler_heap: Box<dyn rhi::DescriptorHeap>,
    // keyed by the full ordered list; equal keys must mean equal bindings
    cached: FxHashMap<Vec<rhi::DescriptorHandle>, rhi::DescriptorHandle>,
}

impl FrameDescriptors {
    pub fn new(ctx: &Rc<GraphicsContext>) -> FrameDescriptors {
        FrameDescriptors {
            resource_heap: ctx.device().create_descriptor_heap(&rhi::DescriptorHeapDesc {
                max_count: GPU_RESOURCE_DESC_HEAP_SIZE,
                heap_type: rhi::DescriptorHeapType::Resource,
                shader_visible: true,
            }),
            sampler_heap: ctx.device().create_descriptor_heap(&rhi::DescriptorHeapDesc {
                max_count: GPU_SAMPLER_DESC_HEAP_SIZE,
                heap_type: rhi::DescriptorHeapType::Sampler,
                shader_visible: true,
            }),
            cached: FxHashMap::default(),
        }
    }

    pub fn reset(&mut self) {
        self.cached.clear();
        self.resource_heap.reset();
        self.sampler_heap.reset();
    }

    pub fn resource_heap(&self) -> &dyn rhi::DescriptorHeap {
        &*self.resource_heap
    }

    pub fn sampler_heap(&self) -> &dyn rhi::DescriptorHeap {
        &*self.sampler_heap
    }

    /// Resolves an ordered list of CPU descriptors to one GPU-visible
    /// descriptor, copying on first use within the frame slot.
    pub fn get_descriptors_for(
        &mut self,
        ctx: &GraphicsContext,
        cpu_descriptors: Vec<rhi::DescriptorHandle>,
        desc_types: &[rhi::DescriptorType],
        layout: &[rhi::BindGroupLayoutEntry],
    ) -> rhi::DescriptorHandle {
        if let Some(&handle) = self.cached.get(&cpu_descriptors) {
            return handle;
        }
        let handle = self.resource_heap.allocate_descriptor_for_layout(layout);
        ctx.device().copy_descriptors(handle, &cpu_descriptors, desc_types);
        self.cached.insert(cpu_descriptors, handle);
        handle
    }
}

//--------------------------------------------------------------------------------------------------
// Pipeline cache

/// Per-drawable graphics pipelines and their shader modules, keyed by the
/// composite mesh/material/fragment/format identifier.
pub struct PipelineCache {
    compiler: ShaderCompiler,
    cached_shaders: FxHashMap<String, Rc<dyn rhi::ShaderModule>>,
    graphics_pipelines: FxHashMap<String, Rc<dyn rhi::GraphicsPipeline>>,
}

impl PipelineCache {
    pub fn new(compiler: ShaderCompiler) -> PipelineCache {
        PipelineCache {
            compiler,
            cached_shaders: FxHashMap::default(),
            graphics_pipelines: FxHashMap::default(),
        }
    }

    pub fn compiler_mut(&mut self) -> &mut ShaderCompiler {
        &mut self.compiler
    }

    pub fn num_pipelines(&self) -> usize {
        self.graphics_pipelines.len()
    }

    fn get_or_compile_shader(
        &mut self,
        id: String,
        source_path: &str,
        entry: &str,
        stage: rhi::ShaderStage,
        environment: &CompilerEnvironment,
    ) -> Rc<dyn rhi::ShaderModule> {
        if let Some(module) = self.cached_shaders.get(&id) {
            return module.clone();
        }
        let module = self
            .compiler
            .compile_shader(source_path, entry, stage, environment)
            .unwrap_or_else(|message| {
                panic!("failed to compile shader `{}`: {}", source_path, message)
            });
        self.cached_shaders.insert(id, module.clone());
        module
    }

    /// Compiles (or fetches) the pipeline used to draw `drawable` with the
    /// given fragment shader against the given target formats.
    pub fn compile_pipeline_for_drawable(
        &mut self,
        ctx: &Rc<GraphicsContext>,
        camera: &Camera,
        drawable: &Drawable,
        fragment_shader: &FragmentShader,
        color_formats: &[rhi::ResourceFormat],
        depth_stencil_format: rhi::ResourceFormat,
    ) -> Rc<dyn rhi::GraphicsPipeline> {
        let mut environment = CompilerEnvironment::new();
        drawable.mesh.modify_compiler_environment(&mut environment);
        drawable.material.modify_compiler_environment(&mut environment);
        fragment_shader.modify_compiler_environment(&mut environment);
        let environment_id = environment.config_identifier();

        let mesh_shaders_id = format!(
            "MESH {} {} ",
            drawable.mesh.mesh_type_name(),
            environment_id
        );
        let fs_id = format!(
            "FS '{}' {} {} {}",
            fragment_shader.source_path,
            fragment_shader.source_entry,
            drawable.material.shader_identifier(),
            environment_id
        );
        let mut format_id = String::from("FORMAT");
        for format in color_formats {
            format_id = format!("{}-{:x}", format_id, *format as u32);
        }
        if depth_stencil_format != rhi::ResourceFormat::Undefined {
            format_id = format!("{}={:x}", format_id, depth_stencil_format as u32);
        }
        let pipeline_id = format!("{} {} {}", mesh_shaders_id, fs_id, format_id);
        if let Some(pipeline) = self.graphics_pipelines.get(&pipeline_id) {
            return pipeline.clone();
        }

        let separate_samplers = ctx.properties().separate_sampler_heap;
        let mesh_shader_params = drawable.mesh.shader_params_metadata().clone();
        let material_shader_params = drawable.material.shader_params_metadata().clone();
        let camera_shader_params = camera.shader_params_metadata();
        environment.set_replace_arg(
            "GRAPHICS_MESH_SHADER_PARAMS",
            mesh_shader_params.generated_shader_declaration(
                GRAPHICS_SET_MESH,
                GRAPHICS_SET_SAMPLERS,
                separate_samplers,
            ),
        );
        environment.set_replace_arg(
            "GRAPHICS_MATERIAL_SHADER_PARAMS",
            material_shader_params.generated_shader_declaration(
                GRAPHICS_SET_MATERIAL,
                GRAPHICS_SET_SAMPLERS,
                separate_samplers,
            ),
        );
        environment.set_replace_arg(
            "GRAPHICS_FRAGMENT_SHADER_PARAMS",
            fragment_shader.shader_params_metadata.generated_shader_declaration(
                GRAPHICS_SET_FRAGMENT,
                GRAPHICS_SET_SAMPLERS,
                separate_samplers,
            ),
        );
        environment.set_replace_arg(
            "GRAPHICS_CAMERA_SHADER_PARAMS",
            camera_shader_params.generated_shader_declaration(
                GRAPHICS_SET_CAMERA,
                GRAPHICS_SET_SAMPLERS,
                separate_samplers,
            ),
        );

        let vertex = self.get_or_compile_shader(
            format!("{}vs", mesh_shaders_id),
            drawable.mesh.source_path(rhi::ShaderStage::VERTEX),
            drawable.mesh.source_entry(rhi::ShaderStage::VERTEX),
            rhi::ShaderStage::VERTEX,
            &environment,
        );
        let mut compile_optional = |cache: &mut Self, stage, suffix: &str| {
            let source_path = drawable.mesh.source_path(stage);
            if source_path.is_empty() {
                return None;
            }
            Some((
                cache.get_or_compile_shader(
                    format!("{}{}", mesh_shaders_id, suffix),
                    source_path,
                    drawable.mesh.source_entry(stage),
                    stage,
                    &environment,
                ),
                drawable.mesh.source_entry(stage).to_string(),
            ))
        };
        let tessellation_control =
            compile_optional(self, rhi::ShaderStage::TESSELLATION_CONTROL, "tcs");
        let tessellation_evaluation =
            compile_optional(self, rhi::ShaderStage::TESSELLATION_EVALUATION, "tes");
        let geometry = compile_optional(self, rhi::ShaderStage::GEOMETRY, "gs");
        let fragment = self.get_or_compile_shader(
            fs_id,
            &fragment_shader.source_path,
            &fragment_shader.source_entry,
            rhi::ShaderStage::FRAGMENT,
            &environment,
        );

        let blend_mode = drawable.material.blend_mode();
        let mut depth_stencil_state = rhi::DepthStencilState {
            format: depth_stencil_format,
            depth_write: fragment_shader.depth_write,
            depth_test: fragment_shader.depth_test,
            depth_compare_op: fragment_shader.depth_compare_op,
            stencil_test: fragment_shader.stencil_test,
            stencil_front_face: fragment_shader.stencil_front_face,
            stencil_back_face: fragment_shader.stencil_back_face,
            stencil_compare_mask: fragment_shader.stencil_compare_mask,
            stencil_write_mask: fragment_shader.stencil_write_mask,
            stencil_reference: fragment_shader.stencil_reference,
        };
        if !blend_mode.is_opaque() {
            depth_stencil_state.depth_write = false;
        }

        let mut color_target_attachments: Vec<rhi::ColorTargetAttachmentState> = color_formats
            .iter()
            .map(|&format| rhi::ColorTargetAttachmentState {
                format,
                ..Default::default()
            })
            .collect();
        if let Some(attachment) = color_target_attachments.first_mut() {
            match blend_mode {
                BlendMode::Opaque | BlendMode::AlphaTest => {}
                BlendMode::Translucent => {
                    attachment.blend_enable = true;
                    attachment.src_blend_factor = rhi::BlendFactor::SrcAlpha;
                    attachment.dst_blend_factor = rhi::BlendFactor::OneMinusSrcAlpha;
                    attachment.src_alpha_blend_factor = rhi::BlendFactor::SrcAlpha;
                    attachment.dst_alpha_blend_factor = rhi::BlendFactor::OneMinusSrcAlpha;
                }
                BlendMode::Additive => {
                    attachment.blend_enable = true;
                    attachment.src_blend_factor = rhi::BlendFactor::One;
                    attachment.dst_blend_factor = rhi::BlendFactor::One;
                    attachment.src_alpha_blend_factor = rhi::BlendFactor::Zero;
                    attachment.dst_alpha_blend_factor = rhi::BlendFactor::One;
                }
                BlendMode::Modulate => {
                    attachment.blend_enable = true;
                    attachment.src_blend_factor = rhi::BlendFactor::Dst;
                    attachment.dst_blend_factor = rhi::BlendFactor::Zero;
                    attachment.src_alpha_blend_factor = rhi::BlendFactor::Zero;
                    attachment.dst_alpha_blend_factor = rhi::BlendFactor::One;
                }
            }
        }

        let non_fragment_stages = rhi::ShaderStage::ALL_GRAPHICS - rhi::ShaderStage::FRAGMENT;
        let mut bind_groups_layout = vec![
            mesh_shader_params.bind_group_layout(GRAPHICS_SET_MESH, non_fragment_stages),
            material_shader_params
                .bind_group_layout(GRAPHICS_SET_MATERIAL, rhi::ShaderStage::FRAGMENT),
            fragment_shader
                .shader_params_metadata
                .bind_group_layout(GRAPHICS_SET_FRAGMENT, rhi::ShaderStage::FRAGMENT),
            camera_shader_params.bind_group_layout(GRAPHICS_SET_CAMERA, non_fragment_stages),
        ];
        if separate_samplers {
            let mut samplers_layout: Vec<rhi::BindGroupLayoutEntry> = Vec::new();
            for (set, layout) in bind_groups_layout.iter_mut().enumerate() {
                for entry in layout.iter() {
                    if entry.descriptor_type == rhi::DescriptorType::Sampler {
                        let mut entry = entry.clone();
                        entry.binding_or_register += SAMPLERS_BINDING_SHIFT * set as u32;
                        entry.space = GRAPHICS_SET_SAMPLERS;
                        samplers_layout.push(entry);
                    }
                }
                layout.retain(|entry| entry.descriptor_type != rhi::DescriptorType::Sampler);
            }
            if !samplers_layout.is_empty() {
                bind_groups_layout.push(samplers_layout);
            }
        }

        let pipeline_desc = rhi::GraphicsPipelineDesc {
            vertex_input_buffers: drawable
                .mesh
                .vertex_input_desc(fragment_shader.needed_vertex_attributes),
            tessellation_state: drawable.mesh.tessellation_desc(),
            rasterization_state: rhi::RasterizationState {
                topology: drawable.mesh.primitive_topology(),
                front_face: fragment_shader.front_face,
                cull_mode: fragment_shader.cull_mode,
                polygon_mode: fragment_shader.polygon_mode,
                conservative: fragment_shader.conservative_rasterization,
            },
            depth_stencil_state,
            color_target_attachments,
            bind_groups_layout,
            static_samplers: Vec::new(),
            push_constants: None,
            shaders: rhi::GraphicsShaderSet {
                vertex: rhi::PipelineShader {
                    module: &*vertex,
                    entry: drawable.mesh.source_entry(rhi::ShaderStage::VERTEX),
                },
                tessellation_control: tessellation_control.as_ref().map(|(module, entry)| {
                    rhi::PipelineShader {
                        module: &**module,
                        entry,
                    }
                }),
                tessellation_evaluation: tessellation_evaluation.as_ref().map(|(module, entry)| {
                    rhi::PipelineShader {
                        module: &**module,
                        entry,
                    }
                }),
                geometry: geometry.as_ref().map(|(module, entry)| rhi::PipelineShader {
                    module: &**module,
                    entry,
                }),
                fragment: rhi::PipelineShader {
                    module: &*fragment,
                    entry: &fragment_shader.source_entry,
                },
            },
        };
        let pipeline: Rc<dyn rhi::GraphicsPipeline> =
            Rc::from(ctx.device().create_graphics_pipeline(&pipeline_desc));
        self.graphics_pipelines.insert(pipeline_id, pipeline.clone());
        pipeline
    }
}

//--------------------------------------------------------------------------------------------------
// Graphics manager

struct FrameData {
    acquire_semaphore: Box<dyn rhi::Semaphore>,
    signal_semaphore: Box<dyn rhi::Semaphore>,
    fence: Box<dyn rhi::Fence>,
    camera_semaphores: Vec<Box<dyn rhi::Semaphore>>,
    graphics_cmd_pool: Box<dyn rhi::CommandPool>,
    descriptors: FrameDescriptors,
}

pub struct GraphicsManager {
    ctx: Rc<GraphicsContext>,
    swapchain: Box<dyn rhi::Swapchain>,
    frame_data: Vec<FrameData>,
    scene: GpuScene,
    render_graph: RenderGraph,
    pipelines: PipelineCache,
    helpers: CommandHelpers,
    samplers: SamplerCache,
    renderer: Option<Box<dyn Renderer>>,
    displayer: Option<Box<dyn Displayer>>,
}

impl GraphicsManager {
    pub fn new(
        device: Rc<dyn rhi::Device>,
        settings: &GraphicsSettings,
        vfs: Rc<dyn Vfs>,
        source_compiler: Box<dyn ShaderSourceCompiler>,
    ) -> GraphicsManager {
        let ctx = GraphicsContext::new(device, settings.frames_in_flight);
        let swapchain = ctx.device().create_swapchain(&rhi::SwapchainDesc {
            width: settings.swapchain_width,
            height: settings.swapchain_height,
            image_count: settings.frames_in_flight,
        });
        let frame_data = (0..settings.frames_in_flight)
            .map(|_| FrameData {
                acquire_semaphore: ctx.device().create_semaphore(),
                signal_semaphore: ctx.device().create_semaphore(),
                fence: ctx.device().create_fence(),
                camera_semaphores: Vec::new(),
                graphics_cmd_pool: ctx.device().create_command_pool(),
                descriptors: FrameDescriptors::new(&ctx),
            })
            .collect();

        let mut compiler = ShaderCompiler::new(&ctx, vfs, source_compiler);
        let mut helpers = CommandHelpers::new(&ctx);
        helpers.initialize(&mut compiler);

        GraphicsManager {
            render_graph: RenderGraph::new(&ctx),
            pipelines: PipelineCache::new(compiler),
            helpers,
            samplers: SamplerCache::new(),
            scene: GpuScene::new(),
            swapchain,
            frame_data,
            ctx,
            renderer: None,
            displayer: None,
        }
    }

    pub fn ctx(&self) -> &Rc<GraphicsContext> {
        &self.ctx
    }

    pub fn scene(&self) -> &GpuScene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut GpuScene {
        &mut self.scene
    }

    pub fn render_graph(&mut self) -> &mut RenderGraph {
        &mut self.render_graph
    }

    pub fn pipelines_mut(&mut self) -> &mut PipelineCache {
        &mut self.pipelines
    }

    pub fn set_renderer(&mut self, renderer: Box<dyn Renderer>) {
        self.renderer = Some(renderer);
    }

    pub fn set_displayer(&mut self, displayer: Box<dyn Displayer>) {
        self.displayer = Some(displayer);
    }

    pub fn get_sampler(&mut self, desc: rhi::SamplerDesc) -> Rc<Sampler> {
        self.samplers.get(&self.ctx, desc)
    }

    pub fn num_frames_in_flight(&self) -> u32 {
        self.ctx.frames_in_flight()
    }

    pub fn curr_frame_index(&self) -> u32 {
        self.ctx.curr_frame_index()
    }

    pub fn execute_in_this_frame(&self, func: impl FnOnce(&mut dyn rhi::CommandEncoder)) {
        self.ctx.execute_in_this_frame(func);
    }

    pub fn execute_immediately(&self, func: impl FnOnce(&mut dyn rhi::CommandEncoder)) {
        self.ctx.execute_immediately(func);
    }

    /// Called from the window resize callback.
    pub fn resize_swapchain(&mut self, width: u32, height: u32) {
        self.ctx.graphics_queue().wait_idle();
        self.swapchain.resize(width, height);
    }

    /// Renders one frame: per-camera graph build and submission, then
    /// composition onto the swapchain image and present.
    pub fn render_frame(&mut self) {
        let mut renderer = match self.renderer.take() {
            Some(renderer) => renderer,
            None => return,
        };
        let mut displayer = match self.displayer.take() {
            Some(displayer) => displayer,
            None => {
                self.renderer = Some(renderer);
                return;
            }
        };

        let frame_index = self.ctx.curr_frame_index() as usize;
        {
            let fd = &mut self.frame_data[frame_index];
            self.swapchain.acquire_next_texture(&*fd.acquire_semaphore);
            fd.fence.wait();
            let num_cameras = self.scene.num_cameras();
            while fd.camera_semaphores.len() < num_cameras {
                fd.camera_semaphores.push(self.ctx.device().create_semaphore());
            }
            fd.graphics_cmd_pool.reset();
            fd.descriptors.reset();
        }
        self.ctx.begin_frame();

        renderer.prepare_renderer_per_frame_data(&self.scene);

        let camera_handles: Vec<CameraHandle> = self
            .scene
            .cameras_with_handles()
            .map(|(handle, _)| handle)
            .collect();
        let mut signaled_camera_semaphores = Vec::new();
        for (camera_index, &camera_handle) in camera_handles.iter().enumerate() {
            let target = {
                let camera = self.scene.camera(camera_handle).unwrap();
                match camera.target_texture() {
                    Some(target) => (target.clone(), camera.target_access()),
                    None => {
                        log::warn!(target: "gfx", "camera has no target texture, skipped");
                        continue;
                    }
                }
            };

            let mut encoder = self.frame_data[frame_index]
                .graphics_cmd_pool
                .get_command_encoder();
            {
                let fd = &self.frame_data[frame_index];
                encoder.set_descriptor_heaps(&[
                    fd.descriptors.resource_heap(),
                    fd.descriptors.sampler_heap(),
                ]);
            }
            self.render_graph.set_command_encoder(encoder);
            self.render_graph.set_back_buffer(&target.0, target.1);

            {
                let camera = self.scene.camera(camera_handle).unwrap();
                camera.update_shader_params(&self.ctx);
                renderer.prepare_renderer_per_camera_data(camera);
                renderer.render_camera(camera_handle, camera, &mut self.render_graph, &self.scene);
            }

            let executed = {
                let fd = &mut self.frame_data[frame_index];
                let mut res = ExecResources {
                    ctx: &self.ctx,
                    scene: &self.scene,
                    pipelines: &mut self.pipelines,
                    frame: &mut fd.descriptors,
                    helpers: &mut self.helpers,
                };
                self.render_graph.execute(&mut res)
            };
            if executed {
                if let Some(camera) = self.scene.camera(camera_handle) {
                    camera.set_target_access(rhi::ResourceAccess::SAMPLED_TEXTURE_READ);
                }
            }

            if let Some(encoder) = self.render_graph.take_command_encoder() {
                let fd = &self.frame_data[frame_index];
                self.ctx.graphics_queue().submit_command_buffers(
                    vec![encoder.finish()],
                    &[],
                    &[&*fd.camera_semaphores[camera_index]],
                    None,
                );
                signaled_camera_semaphores.push(camera_index);
            }
        }

        // composition and present
        {
            let fd = &self.frame_data[frame_index];
            let swapchain_rhi_texture = self.swapchain.current_texture();
            let swapchain_texture =
                Texture::from_imported(&self.ctx, swapchain_rhi_texture.clone());
            let mut encoder = fd.graphics_cmd_pool.get_command_encoder();
            encoder.set_descriptor_heaps(&[
                fd.descriptors.resource_heap(),
                fd.descriptors.sampler_heap(),
            ]);

            encoder.resource_barriers(
                &[],
                &[rhi::TextureBarrier::whole(
                    &*swapchain_rhi_texture,
                    rhi::ResourceAccess::PRESENT,
                    rhi::ResourceAccess::COLOR_ATTACHMENT_WRITE,
                )],
            );
            displayer.display(&mut *encoder, &swapchain_texture);
            encoder.resource_barriers(
                &[],
                &[rhi::TextureBarrier::whole(
                    &*swapchain_rhi_texture,
                    rhi::ResourceAccess::COLOR_ATTACHMENT_WRITE,
                    rhi::ResourceAccess::PRESENT,
                )],
            );

            let mut wait_semaphores: Vec<&dyn rhi::Semaphore> = signaled_camera_semaphores
                .iter()
                .map(|&index| &*fd.camera_semaphores[index])
                .collect();
            wait_semaphores.push(&*fd.acquire_semaphore);
            self.ctx.graphics_queue().submit_command_buffers(
                vec![encoder.finish()],
                &wait_semaphores,
                &[&*fd.signal_semaphore],
                Some(&*fd.fence),
            );
        }

        self.swapchain
            .present(&*self.frame_data[frame_index].signal_semaphore);
        self.ctx.advance_frame();

        self.renderer = Some(renderer);
        self.displayer = Some(displayer);
    }

    /// Waits for the device, persists the shader binary cache and runs every
    /// pending delayed destruction.
    pub fn shutdown(&mut self) {
        self.ctx.graphics_queue().wait_idle();
        self.pipelines.compiler_mut().save();
        self.ctx.drain_delayed_destroys();
    }
}
