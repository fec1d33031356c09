//! End-to-end frame loop: scene, rendered-object lists, per-drawable
//! pipeline compilation and presentation, all against the null backend.

use std::cell::RefCell;
use std::rc::Rc;

use vermeil::graph::{GraphicsPassColorTargetBuilder, RenderedObjectListHandle};
use vermeil::rhi::null::{Event, NullDevice};
use vermeil::rhi;
use vermeil::{
    BlendMode, Camera, CameraHandle, Displayer, Drawable, FragmentShader, GpuScene,
    GraphicsContext, GraphicsManager, GraphicsSettings, Material, MemoryVfs, Mesh, RenderGraph,
    Renderer, RenderedObjectListDesc, RenderedObjectType, ShaderParameter,
    ShaderParameterMetadata, ShaderParameterMetadataList, ShaderSourceCompiler, Texture, Vfs,
};

struct NoopCompiler;

impl ShaderSourceCompiler for NoopCompiler {
    fn compile(
        &self,
        source: &str,
        _entry: &str,
        _stage: rhi::ShaderStage,
    ) -> Result<Vec<u8>, String> {
        Ok(source.as_bytes().to_vec())
    }
}

struct TestMesh {
    type_name: String,
    metadata: ShaderParameterMetadataList,
}

impl TestMesh {
    fn new(type_name: &str) -> TestMesh {
        TestMesh {
            type_name: type_name.to_string(),
            metadata: ShaderParameterMetadataList::new(vec![ShaderParameterMetadata::value(
                "float4x4",
                "matrix_object",
                64,
                16,
            )]),
        }
    }
}

impl Mesh for TestMesh {
    fn mesh_type_name(&self) -> &str {
        &self.type_name
    }
    fn vertex_input_desc(
        &self,
        _attributes: rhi::VertexAttributesType,
    ) -> Vec<rhi::VertexInputBufferDesc> {
        Vec::new()
    }
    fn primitive_topology(&self) -> rhi::PrimitiveTopology {
        rhi::PrimitiveTopology::TriangleList
    }
    fn shader_params_metadata(&self) -> &ShaderParameterMetadataList {
        &self.metadata
    }
    fn fill_shader_params(&self, ctx: &Rc<GraphicsContext>, drawable: &Drawable) {
        let mut params = drawable.shader_params.borrow_mut();
        if !params.is_allocated() {
            params.initialize(ctx, self.metadata.clone(), false);
        }
        let matrix = drawable.transform.borrow().matrix;
        params.set_value("matrix_object", &matrix);
    }
    fn bind_buffers(&self, _encoder: &mut dyn rhi::GraphicsEncoder) {}
    fn num_indices(&self) -> u32 {
        6
    }
    fn source_path(&self, stage: rhi::ShaderStage) -> &str {
        if stage == rhi::ShaderStage::VERTEX {
            "/shaders/test_mesh.hlsl"
        } else {
            ""
        }
    }
    fn source_entry(&self, stage: rhi::ShaderStage) -> &str {
        if stage == rhi::ShaderStage::VERTEX {
            "vs_main"
        } else {
            ""
        }
    }
}

struct TestMaterial {
    params: RefCell<ShaderParameter>,
    metadata: ShaderParameterMetadataList,
}

impl TestMaterial {
    fn new() -> TestMaterial {
        TestMaterial {
            params: RefCell::new(ShaderParameter::new()),
            metadata: ShaderParameterMetadataList::default(),
        }
    }
}

impl Material for TestMaterial {
    fn blend_mode(&self) -> BlendMode {
        BlendMode::Opaque
    }
    fn base_material(&self) -> Option<Rc<dyn Material>> {
        None
    }
    fn shader_params_metadata(&self) -> &ShaderParameterMetadataList {
        &self.metadata
    }
    fn shader_parameters(&self) -> &RefCell<ShaderParameter> {
        &self.params
    }
    fn shader_identifier(&self) -> String {
        "test_material".to_string()
    }
}

struct ForwardRenderer {
    fragment_shader: Rc<FragmentShader>,
}

impl Renderer for ForwardRenderer {
    fn prepare_renderer_per_frame_data(&mut self, _scene: &GpuScene) {}
    fn prepare_renderer_per_camera_data(&mut self, _camera: &Camera) {}
    fn render_camera(
        &mut self,
        camera_handle: CameraHandle,
        _camera: &Camera,
        graph: &mut RenderGraph,
        scene: &GpuScene,
    ) {
        let list = graph.add_rendered_object_list(
            scene,
            RenderedObjectListDesc {
                camera: camera_handle,
                fragment_shader: self.fragment_shader.clone(),
                object_type: RenderedObjectType::OPAQUE,
            },
        );
        let back_buffer = graph.import_back_buffer().expect("no back buffer");
        graph.add_graphics_pass(
            "forward",
            list,
            |builder, _| {
                builder.use_color(
                    0,
                    GraphicsPassColorTargetBuilder::new(back_buffer)
                        .clear_color([0.1, 0.1, 0.1, 1.0]),
                );
            },
            |list: &RenderedObjectListHandle, pass_ctx| {
                let fragment_params = ShaderParameter::new();
                pass_ctx.render_list(*list, &fragment_params);
            },
        );
    }
}

struct NullDisplayer;

impl Displayer for NullDisplayer {
    fn display(&mut self, _encoder: &mut dyn rhi::CommandEncoder, _swapchain_texture: &Texture) {}
}

fn test_vfs() -> Rc<dyn Vfs> {
    Rc::new(
        MemoryVfs::new()
            .with_file("/vermeil/shaders/core/blit.hlsl", b"// blit\n")
            .with_file("/vermeil/shaders/core/mipmap.hlsl", b"// mipmap\n")
            .with_file(
                "/shaders/test_mesh.hlsl",
                b"$GRAPHICS_MESH_SHADER_PARAMS\n$GRAPHICS_CAMERA_SHADER_PARAMS\nfloat4 vs_main() {}\n",
            )
            .with_file(
                "/shaders/forward.hlsl",
                b"$GRAPHICS_MATERIAL_SHADER_PARAMS\n$GRAPHICS_FRAGMENT_SHADER_PARAMS\nfloat4 fs_main() {}\n",
            ),
    )
}

#[test]
fn frame_loop_draws_batches_and_presents() {
    let _ = pretty_env_logger::try_init();

    let device = NullDevice::new();
    let log = device.event_log();
    let device: Rc<dyn rhi::Device> = Rc::new(device);

    let mut manager = GraphicsManager::new(
        device,
        &GraphicsSettings::default(),
        test_vfs(),
        Box::new(NoopCompiler),
    );

    let ctx = manager.ctx().clone();
    let mut camera = Camera::new();
    camera.recreate_target_texture(&ctx, 128, 128, rhi::ResourceFormat::Rgba8Unorm, false);
    manager.scene_mut().add_camera(camera);

    let shared_mesh: Rc<dyn Mesh> = Rc::new(TestMesh::new("quad_mesh"));
    let other_mesh: Rc<dyn Mesh> = Rc::new(TestMesh::new("sphere_mesh"));
    let material: Rc<dyn Material> = Rc::new(TestMaterial::new());
    manager
        .scene_mut()
        .add_drawable(Rc::new(Drawable::new(shared_mesh.clone(), material.clone())));
    manager
        .scene_mut()
        .add_drawable(Rc::new(Drawable::new(shared_mesh, material.clone())));
    manager
        .scene_mut()
        .add_drawable(Rc::new(Drawable::new(other_mesh, material)));

    manager.set_renderer(Box::new(ForwardRenderer {
        fragment_shader: Rc::new(FragmentShader::new("/shaders/forward.hlsl", "fs_main")),
    }));
    manager.set_displayer(Box::new(NullDisplayer));

    manager.render_frame();

    {
        let events = log.borrow();
        let draws = events
            .iter()
            .filter(|event| match event {
                Event::DrawIndexed { .. } => true,
                _ => false,
            })
            .count();
        assert_eq!(draws, 3);

        let submits = events
            .iter()
            .filter(|event| match event {
                Event::Submit { .. } => true,
                _ => false,
            })
            .count();
        // one per camera plus the composition submission
        assert_eq!(submits, 2);

        assert!(events.iter().any(|event| *event == Event::Present));

        // the composition waits on the camera semaphore and the acquire
        // semaphore and signals the frame fence
        let last_submit = events
            .iter()
            .rev()
            .find_map(|event| match event {
                Event::Submit {
                    waits,
                    signals,
                    with_fence,
                    ..
                } => Some((*waits, *signals, *with_fence)),
                _ => None,
            })
            .unwrap();
        assert_eq!(last_submit, (2, 1, true));
    }

    // two distinct mesh identities share one material: two pipelines
    assert_eq!(manager.pipelines_mut().num_pipelines(), 2);

    // a second frame reuses the cached pipelines
    log.borrow_mut().clear();
    manager.render_frame();
    assert_eq!(manager.pipelines_mut().num_pipelines(), 2);
    let draws = log
        .borrow()
        .iter()
        .filter(|event| match event {
            Event::DrawIndexed { .. } => true,
            _ => false,
        })
        .count();
    assert_eq!(draws, 3);

    manager.shutdown();
}
