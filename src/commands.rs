//! Built-in command helpers: fullscreen blits and mipmap generation.

use fxhash::FxHashMap;
use std::rc::Rc;

use crate::buffer::as_bytes;
use crate::context::GraphicsContext;
use crate::manager::FrameDescriptors;
use crate::rhi;
use crate::shader::{CompilerEnvironment, ShaderCompiler};
use crate::texture::Texture;

const BLIT_SHADER_PATH: &str = "/vermeil/shaders/core/blit.hlsl";
const MIPMAP_SHADER_PATH: &str = "/vermeil/shaders/core/mipmap.hlsl";

const MIPMAP_COMPUTE_GROUP_SIZE: u32 = 16;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MipmapMode {
    Average,
    Min,
    Max,
}

const MIPMAP_MODES: [MipmapMode; 3] = [MipmapMode::Average, MipmapMode::Min, MipmapMode::Max];

struct BlitShaders {
    vs: Rc<dyn rhi::ShaderModule>,
    fs: Rc<dyn rhi::ShaderModule>,
    fs_depth: Rc<dyn rhi::ShaderModule>,
}

struct MipmapShaders {
    vs: Rc<dyn rhi::ShaderModule>,
    fs: FxHashMap<MipmapMode, Rc<dyn rhi::ShaderModule>>,
    fs_depth: FxHashMap<MipmapMode, Rc<dyn rhi::ShaderModule>>,
}

pub struct CommandHelpers {
    ctx: Rc<GraphicsContext>,
    blit_sampler: Box<dyn rhi::Sampler>,
    blit_shaders: Option<BlitShaders>,
    mipmap_shaders: Option<MipmapShaders>,
    blit_pipelines: FxHashMap<rhi::ResourceFormat, Rc<dyn rhi::GraphicsPipeline>>,
    mipmap_pipelines: FxHashMap<(rhi::ResourceFormat, MipmapMode), Rc<dyn rhi::GraphicsPipeline>>,
    mipmap_pipelines_compute: FxHashMap<MipmapMode, Rc<dyn rhi::ComputePipeline>>,
}

impl CommandHelpers {
    pub fn new(ctx: &Rc<GraphicsContext>) -> CommandHelpers {
        let blit_sampler = ctx.device().create_sampler(&rhi::SamplerDesc {
            mag_filter: rhi::SamplerFilterMode::Linear,
            min_filter: rhi::SamplerFilterMode::Linear,
            ..Default::default()
        });
        CommandHelpers {
            ctx: ctx.clone(),
            blit_sampler,
            blit_shaders: None,
            mipmap_shaders: None,
            blit_pipelines: FxHashMap::default(),
            mipmap_pipelines: FxHashMap::default(),
            mipmap_pipelines_compute: FxHashMap::default(),
        }
    }

    /// Compiles the built-in shaders. Compile failures are fatal.
    pub fn initialize(&mut self, compiler: &mut ShaderCompiler) {
        self.initialize_blit(compiler);
        self.initialize_mipmap(compiler);
    }

    fn initialize_blit(&mut self, compiler: &mut ShaderCompiler) {
        let environment = CompilerEnvironment::new();
        let vs = compiler
            .compile_shader(BLIT_SHADER_PATH, "blit_vs", rhi::ShaderStage::VERTEX, &environment)
            .unwrap_or_else(|message| panic!("failed to compile blit shader: {}", message));
        let fs = compiler
            .compile_shader(BLIT_SHADER_PATH, "blit_fs", rhi::ShaderStage::FRAGMENT, &environment)
            .unwrap_or_else(|message| panic!("failed to compile blit shader: {}", message));
        let mut environment = CompilerEnvironment::new();
        environment.set_define("BLIT_DEPTH");
        let fs_depth = compiler
            .compile_shader(BLIT_SHADER_PATH, "blit_fs", rhi::ShaderStage::FRAGMENT, &environment)
            .unwrap_or_else(|message| panic!("failed to compile blit shader: {}", message));
        self.blit_shaders = Some(BlitShaders { vs, fs, fs_depth });
    }

    fn initialize_mipmap(&mut self, compiler: &mut ShaderCompiler) {
        let mut vs = None;
        let mut fs = FxHashMap::default();
        let mut fs_depth = FxHashMap::default();
        for (i, &mode) in MIPMAP_MODES.iter().enumerate() {
            let mut environment = CompilerEnvironment::new();
            environment.set_define_value("MIPMAP_MODE", i.to_string());
            if i == 0 {
                vs = Some(
                    compiler
                        .compile_shader(
                            MIPMAP_SHADER_PATH,
                            "mipmap_vs",
                            rhi::ShaderStage::VERTEX,
                            &environment,
                        )
                        .unwrap_or_else(|message| {
                            panic!("failed to compile mipmap shader: {}", message)
                        }),
                );
            }
            let mode_fs = compiler
                .compile_shader(
                    MIPMAP_SHADER_PATH,
                    "mipmap_fs",
                    rhi::ShaderStage::FRAGMENT,
                    &environment,
                )
                .unwrap_or_else(|message| panic!("failed to compile mipmap shader: {}", message));
            fs.insert(mode, mode_fs);

            environment.set_define("MIPMAP_DEPTH");
            let mode_fs_depth = compiler
                .compile_shader(
                    MIPMAP_SHADER_PATH,
                    "mipmap_fs",
                    rhi::ShaderStage::FRAGMENT,
                    &environment,
                )
                .unwrap_or_else(|message| panic!("failed to compile mipmap shader: {}", message));
            fs_depth.insert(mode, mode_fs_depth);

            environment.reset_define("MIPMAP_DEPTH");
            environment.set_define("USE_CS");
            let mode_cs = compiler
                .compile_shader(
                    MIPMAP_SHADER_PATH,
                    "mipmap_cs",
                    rhi::ShaderStage::COMPUTE,
                    &environment,
                )
                .unwrap_or_else(|message| panic!("failed to compile mipmap shader: {}", message));

            let layout = vec![
                rhi::BindGroupLayoutEntry {
                    count: 1,
                    descriptor_type: rhi::DescriptorType::SampledTexture,
                    visibility: rhi::ShaderStage::COMPUTE,
                    binding_or_register: 1,
                    space: 0,
                },
                rhi::BindGroupLayoutEntry {
                    count: 1,
                    descriptor_type: rhi::DescriptorType::ReadWriteStorageTexture,
                    visibility: rhi::ShaderStage::COMPUTE,
                    binding_or_register: 2,
                    space: 0,
                },
            ];
            let pipeline = self
                .ctx
                .device()
                .create_compute_pipeline(&rhi::ComputePipelineDesc {
                    bind_groups_layout: vec![layout],
                    static_samplers: Vec::new(),
                    push_constants: Some(rhi::PushConstantsDesc {
                        size: 8,
                        visibility: rhi::ShaderStage::COMPUTE,
                        register_: 0,
                        space: 0,
                    }),
                    compute: rhi::PipelineShader {
                        module: &*mode_cs,
                        entry: "mipmap_cs",
                    },
                });
            self.mipmap_pipelines_compute.insert(mode, Rc::from(pipeline));
        }
        self.mipmap_shaders = Some(MipmapShaders {
            vs: vs.unwrap(),
            fs,
            fs_depth,
        });
    }

    //----------------------------------------------------------------------------------------------

    /// Draws `src` into `dst` with a fullscreen triangle. Separate pipeline
    /// variants per destination format, color vs. depth.
    pub fn blit_2d(
        &mut self,
        ctx: &Rc<GraphicsContext>,
        frame: &mut FrameDescriptors,
        cmd: &mut dyn rhi::CommandEncoder,
        src: &Texture,
        src_mip_level: u32,
        src_array_layer: u32,
        dst: &Texture,
        dst_mip_level: u32,
        dst_array_layer: u32,
    ) {
        let target_format = dst.desc().format;
        let extent = dst.desc().extent;
        let pipeline = self.get_blit_pipeline(target_format);

        let label = if target_format.is_depth_stencil() {
            rhi::CommandLabel::new("blit (depth)", [0.0, 0.0, 1.0])
        } else {
            rhi::CommandLabel::new("blit (color)", [0.0, 0.0, 1.0])
        };
        let view = rhi::TextureViewRef {
            texture: dst.rhi_texture(),
            mip_level: dst_mip_level,
            base_layer: dst_array_layer,
            num_layers: 1,
        };
        let rt_desc = if target_format.is_depth_stencil() {
            rhi::RenderTargetDesc {
                colors: Vec::new(),
                depth_stencil: Some(rhi::DepthStencilAttachmentDesc {
                    texture: view,
                    clear_value: None,
                    store: true,
                    read_only: false,
                }),
            }
        } else {
            rhi::RenderTargetDesc {
                colors: vec![rhi::ColorAttachmentDesc {
                    texture: view,
                    clear_color: None,
                    store: true,
                }],
                depth_stencil: None,
            }
        };

        let mut encoder = cmd.begin_render_pass(label, &rt_desc);
        let width = (extent.width >> dst_mip_level).max(1);
        let height = (extent.height >> dst_mip_level).max(1);
        encoder.set_viewports(&[rhi::Viewport {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }]);
        encoder.set_scissors(&[rhi::Scissor {
            x: 0,
            y: 0,
            width,
            height,
        }]);
        encoder.set_pipeline(&*pipeline);

        let descriptor = frame.get_descriptors_for(
            ctx,
            vec![src.get_srv(src_mip_level, 1, src_array_layer, 1)],
            &[rhi::DescriptorType::SampledTexture],
            &pipeline.bind_groups_layout()[0],
        );
        encoder.set_descriptors(0, &[descriptor]);
        encoder.draw(3);
    }

    fn get_blit_pipeline(&mut self, target_format: rhi::ResourceFormat) -> Rc<dyn rhi::GraphicsPipeline> {
        if let Some(pipeline) = self.blit_pipelines.get(&target_format) {
            return pipeline.clone();
        }

        let shaders = self
            .blit_shaders
            .as_ref()
            .expect("command helpers were not initialized");
        let layout = vec![rhi::BindGroupLayoutEntry {
            count: 1,
            descriptor_type: rhi::DescriptorType::SampledTexture,
            visibility: rhi::ShaderStage::FRAGMENT,
            binding_or_register: 0,
            space: 0,
        }];
        let static_sampler = rhi::StaticSampler {
            sampler: &*self.blit_sampler,
            binding_or_register: 0,
            space: 1,
            visibility: rhi::ShaderStage::FRAGMENT,
        };

        let desc = if target_format.is_depth_stencil() {
            rhi::GraphicsPipelineDesc {
                vertex_input_buffers: Vec::new(),
                tessellation_state: rhi::TessellationState::default(),
                rasterization_state: rhi::RasterizationState::default(),
                depth_stencil_state: rhi::DepthStencilState {
                    format: target_format,
                    depth_write: true,
                    depth_test: true,
                    depth_compare_op: rhi::CompareOp::Always,
                    ..Default::default()
                },
                color_target_attachments: Vec::new(),
                bind_groups_layout: vec![layout],
                static_samplers: vec![static_sampler],
                push_constants: None,
                shaders: rhi::GraphicsShaderSet {
                    vertex: rhi::PipelineShader {
                        module: &*shaders.vs,
                        entry: "blit_vs",
                    },
                    tessellation_control: None,
                    tessellation_evaluation: None,
                    geometry: None,
                    fragment: rhi::PipelineShader {
                        module: &*shaders.fs_depth,
                        entry: "blit_fs",
                    },
                },
            }
        } else {
            rhi::GraphicsPipelineDesc {
                vertex_input_buffers: Vec::new(),
                tessellation_state: rhi::TessellationState::default(),
                rasterization_state: rhi::RasterizationState::default(),
                depth_stencil_state: rhi::DepthStencilState::default(),
                color_target_attachments: vec![rhi::ColorTargetAttachmentState {
                    format: target_format,
                    ..Default::default()
                }],
                bind_groups_layout: vec![layout],
                static_samplers: vec![static_sampler],
                push_constants: None,
                shaders: rhi::GraphicsShaderSet {
                    vertex: rhi::PipelineShader {
                        module: &*shaders.vs,
                        entry: "blit_vs",
                    },
                    tessellation_control: None,
                    tessellation_evaluation: None,
                    geometry: None,
                    fragment: rhi::PipelineShader {
                        module: &*shaders.fs,
                        entry: "blit_fs",
                    },
                },
            }
        };
        let pipeline: Rc<dyn rhi::GraphicsPipeline> =
            Rc::from(self.ctx.device().create_graphics_pipeline(&desc));
        self.blit_pipelines.insert(target_format, pipeline.clone());
        pipeline
    }

    fn get_mipmap_pipeline(
        &mut self,
        target_format: rhi::ResourceFormat,
        mode: MipmapMode,
    ) -> Rc<dyn rhi::GraphicsPipeline> {
        if let Some(pipeline) = self.mipmap_pipelines.get(&(target_format, mode)) {
            return pipeline.clone();
        }

        let shaders = self
            .mipmap_shaders
            .as_ref()
            .expect("command helpers were not initialized");
        let layout = vec![rhi::BindGroupLayoutEntry {
            count: 1,
            descriptor_type: rhi::DescriptorType::SampledTexture,
            visibility: rhi::ShaderStage::FRAGMENT,
            binding_or_register: 1,
            space: 0,
        }];
        let push_constants = Some(rhi::PushConstantsDesc {
            size: 8,
            visibility: rhi::ShaderStage::FRAGMENT,
            register_: 0,
            space: 0,
        });

        let desc = if target_format.is_depth_stencil() {
            rhi::GraphicsPipelineDesc {
                vertex_input_buffers: Vec::new(),
                tessellation_state: rhi::TessellationState::default(),
                rasterization_state: rhi::RasterizationState::default(),
                depth_stencil_state: rhi::DepthStencilState {
                    format: target_format,
                    depth_write: true,
                    depth_test: true,
                    depth_compare_op: rhi::CompareOp::Always,
                    ..Default::default()
                },
                color_target_attachments: Vec::new(),
                bind_groups_layout: vec![layout],
                static_samplers: Vec::new(),
                push_constants,
                shaders: rhi::GraphicsShaderSet {
                    vertex: rhi::PipelineShader {
                        module: &*shaders.vs,
                        entry: "mipmap_vs",
                    },
                    tessellation_control: None,
                    tessellation_evaluation: None,
                    geometry: None,
                    fragment: rhi::PipelineShader {
                        module: &*shaders.fs_depth[&mode],
                        entry: "mipmap_fs",
                    },
                },
            }
        } else {
            rhi::GraphicsPipelineDesc {
                vertex_input_buffers: Vec::new(),
                tessellation_state: rhi::TessellationState::default(),
                rasterization_state: rhi::RasterizationState::default(),
                depth_stencil_state: rhi::DepthStencilState::default(),
                color_target_attachments: vec![rhi::ColorTargetAttachmentState {
                    format: target_format,
                    ..Default::default()
                }],
                bind_groups_layout: vec![layout],
                static_samplers: Vec::new(),
                push_constants,
                shaders: rhi::GraphicsShaderSet {
                    vertex: rhi::PipelineShader {
                        module: &*shaders.vs,
                        entry: "mipmap_vs",
                    },
                    tessellation_control: None,
                    tessellation_evaluation: None,
                    geometry: None,
                    fragment: rhi::PipelineShader {
                        module: &*shaders.fs[&mode],
                        entry: "mipmap_fs",
                    },
                },
            }
        };
        let pipeline: Rc<dyn rhi::GraphicsPipeline> =
            Rc::from(self.ctx.device().create_graphics_pipeline(&desc));
        self.mipmap_pipelines
            .insert((target_format, mode), pipeline.clone());
        pipeline
    }

    /// Downsamples every mip level of a 2D texture from the one above it.
    /// Emits the per-level transitions itself and leaves every level, and the
    /// caller's access value, in sampled-read state.
    ///
    /// Plain color formats run on compute; depth and compressed or sRGB
    /// formats run through the graphics fallback.
    pub fn generate_mipmaps_2d(
        &mut self,
        ctx: &Rc<GraphicsContext>,
        frame: &mut FrameDescriptors,
        cmd: &mut dyn rhi::CommandEncoder,
        texture: &Texture,
        texture_access: &mut rhi::ResourceAccess,
        mode: MipmapMode,
    ) {
        #[derive(Copy, Clone)]
        enum Path {
            GraphicsDepth,
            GraphicsColor,
            Compute,
        }

        let target_format = texture.desc().format;
        let (path, read_access, write_access) = if target_format.is_depth_stencil() {
            (
                Path::GraphicsDepth,
                rhi::ResourceAccess::SAMPLED_TEXTURE_READ,
                rhi::ResourceAccess::DEPTH_STENCIL_WRITE,
            )
        } else if target_format.is_compressed() || target_format.is_srgb() {
            (
                Path::GraphicsColor,
                rhi::ResourceAccess::SAMPLED_TEXTURE_READ,
                rhi::ResourceAccess::COLOR_ATTACHMENT_WRITE,
            )
        } else {
            (
                Path::Compute,
                rhi::ResourceAccess::SAMPLED_TEXTURE_READ,
                rhi::ResourceAccess::STORAGE_WRITE,
            )
        };

        let mut width = texture.desc().extent.width;
        let mut height = texture.desc().extent.height;
        let max_levels = 1 + (width.max(height) as f32).log2() as u32;
        let num_levels = max_levels.min(texture.desc().levels);

        for level in 0..num_levels.saturating_sub(1) {
            cmd.resource_barriers(
                &[],
                &[
                    rhi::TextureBarrier {
                        texture: texture.rhi_texture(),
                        base_level: level,
                        num_levels: 1,
                        base_layer: 0,
                        num_layers: 0,
                        src_access: if level == 0 { *texture_access } else { write_access },
                        dst_access: read_access,
                    },
                    rhi::TextureBarrier {
                        texture: texture.rhi_texture(),
                        base_level: level + 1,
                        num_levels: 1,
                        base_layer: 0,
                        num_layers: 0,
                        src_access: *texture_access,
                        dst_access: write_access,
                    },
                ],
            );
            width = (width / 2).max(1);
            height = (height / 2).max(1);

            match path {
                Path::GraphicsDepth | Path::GraphicsColor => {
                    let pipeline = self.get_mipmap_pipeline(target_format, mode);
                    let view = rhi::TextureViewRef {
                        texture: texture.rhi_texture(),
                        mip_level: level + 1,
                        base_layer: 0,
                        num_layers: 1,
                    };
                    let (label, rt_desc) = match path {
                        Path::GraphicsDepth => (
                            rhi::CommandLabel::new("mipmap (depth)", [0.0, 0.0, 1.0]),
                            rhi::RenderTargetDesc {
                                colors: Vec::new(),
                                depth_stencil: Some(rhi::DepthStencilAttachmentDesc {
                                    texture: view,
                                    clear_value: None,
                                    store: true,
                                    read_only: false,
                                }),
                            },
                        ),
                        _ => (
                            rhi::CommandLabel::new("mipmap (color graphics)", [0.0, 0.0, 1.0]),
                            rhi::RenderTargetDesc {
                                colors: vec![rhi::ColorAttachmentDesc {
                                    texture: view,
                                    clear_color: None,
                                    store: true,
                                }],
                                depth_stencil: None,
                            },
                        ),
                    };
                    let mut encoder = cmd.begin_render_pass(label, &rt_desc);
                    encoder.set_viewports(&[rhi::Viewport {
                        x: 0.0,
                        y: 0.0,
                        width: width as f32,
                        height: height as f32,
                        min_depth: 0.0,
                        max_depth: 1.0,
                    }]);
                    encoder.set_scissors(&[rhi::Scissor {
                        x: 0,
                        y: 0,
                        width,
                        height,
                    }]);
                    encoder.set_pipeline(&*pipeline);
                    let descriptor = frame.get_descriptors_for(
                        ctx,
                        vec![texture.get_srv(level, 1, 0, 1)],
                        &[rhi::DescriptorType::SampledTexture],
                        &pipeline.bind_groups_layout()[0],
                    );
                    encoder.set_descriptors(0, &[descriptor]);
                    encoder.push_constants(as_bytes(&[width, height]));
                    encoder.draw(3);
                }
                Path::Compute => {
                    let pipeline = self.mipmap_pipelines_compute[&mode].clone();
                    let mut encoder = cmd.begin_compute_pass(rhi::CommandLabel::new(
                        "mipmap (color compute)",
                        [1.0, 0.0, 0.0],
                    ));
                    encoder.set_pipeline(&*pipeline);
                    let descriptor = frame.get_descriptors_for(
                        ctx,
                        vec![
                            texture.get_srv(level, 1, 0, 1),
                            texture.get_uav(level + 1, 0, 1),
                        ],
                        &[
                            rhi::DescriptorType::SampledTexture,
                            rhi::DescriptorType::ReadWriteStorageTexture,
                        ],
                        &pipeline.bind_groups_layout()[0],
                    );
                    encoder.set_descriptors(0, &[descriptor]);
                    encoder.push_constants(as_bytes(&[width, height]));
                    encoder.dispatch(
                        (width + MIPMAP_COMPUTE_GROUP_SIZE - 1) / MIPMAP_COMPUTE_GROUP_SIZE,
                        (height + MIPMAP_COMPUTE_GROUP_SIZE - 1) / MIPMAP_COMPUTE_GROUP_SIZE,
                        1,
                    );
                }
            }
        }

        if num_levels > 1 {
            cmd.resource_barriers(
                &[],
                &[rhi::TextureBarrier {
                    texture: texture.rhi_texture(),
                    base_level: num_levels - 1,
                    num_levels: 1,
                    base_layer: 0,
                    num_layers: 0,
                    src_access: write_access,
                    dst_access: read_access,
                }],
            );
        } else if *texture_access != read_access {
            cmd.resource_barriers(
                &[],
                &[rhi::TextureBarrier::whole(
                    texture.rhi_texture(),
                    *texture_access,
                    read_access,
                )],
            );
        }
        *texture_access = read_access;
    }
}
