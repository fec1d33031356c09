//! Interfaces between the engine core and its collaborators.
//!
//! The core renders whatever implements these traits; it never depends on
//! concrete mesh, material or renderer types.

use std::cell::RefCell;
use std::rc::Rc;

use crate::accel::BlasGeometryDesc;
use crate::camera::{Camera, CameraHandle};
use crate::context::GraphicsContext;
use crate::drawable::Drawable;
use crate::graph::RenderGraph;
use crate::rhi;
use crate::scene::GpuScene;
use crate::shader::{CompilerEnvironment, ShaderParameter, ShaderParameterMetadataList};
use crate::texture::Texture;

/// How a material is composited over what is already in the target.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum BlendMode {
    Opaque,
    AlphaTest,
    Translucent,
    Additive,
    Modulate,
}

impl BlendMode {
    pub fn is_opaque(self) -> bool {
        match self {
            BlendMode::Opaque | BlendMode::AlphaTest => true,
            _ => false,
        }
    }
}

/// Geometry provider for drawables.
pub trait Mesh {
    fn mesh_type_name(&self) -> &str;
    fn vertex_input_desc(
        &self,
        attributes: rhi::VertexAttributesType,
    ) -> Vec<rhi::VertexInputBufferDesc>;
    fn tessellation_desc(&self) -> rhi::TessellationState {
        rhi::TessellationState::default()
    }
    fn primitive_topology(&self) -> rhi::PrimitiveTopology;
    fn shader_params_metadata(&self) -> &ShaderParameterMetadataList;
    /// Fills the drawable's parameter block before drawing.
    fn fill_shader_params(&self, ctx: &Rc<GraphicsContext>, drawable: &Drawable);
    fn bind_buffers(&self, encoder: &mut dyn rhi::GraphicsEncoder);
    fn num_indices(&self) -> u32;
    /// Empty path means the stage is absent.
    fn source_path(&self, stage: rhi::ShaderStage) -> &str;
    fn source_entry(&self, stage: rhi::ShaderStage) -> &str;
    fn modify_compiler_environment(&self, _environment: &mut CompilerEnvironment) {}
    /// Geometry input for bottom-level acceleration structure builds.
    fn blas_geometry(&self) -> Option<BlasGeometryDesc> {
        None
    }
}

/// Surface appearance provider for drawables.
pub trait Material {
    fn blend_mode(&self) -> BlendMode;
    /// The material this one was instantiated from, if any. Drawables are
    /// sorted by base material so instances batch together.
    fn base_material(&self) -> Option<Rc<dyn Material>>;
    fn shader_params_metadata(&self) -> &ShaderParameterMetadataList;
    fn shader_parameters(&self) -> &RefCell<ShaderParameter>;
    fn shader_identifier(&self) -> String;
    fn modify_compiler_environment(&self, _environment: &mut CompilerEnvironment) {}
}

/// A fragment stage plus the fixed-function state it expects.
#[derive(Clone)]
pub struct FragmentShader {
    pub source_path: String,
    pub source_entry: String,
    pub shader_params_metadata: ShaderParameterMetadataList,
    pub needed_vertex_attributes: rhi::VertexAttributesType,
    pub front_face: rhi::FrontFace,
    pub cull_mode: rhi::CullMode,
    pub polygon_mode: rhi::PolygonMode,
    pub conservative_rasterization: bool,
    pub depth_write: bool,
    pub depth_test: bool,
    pub stencil_test: bool,
    pub depth_compare_op: rhi::CompareOp,
    pub stencil_front_face: rhi::StencilFaceState,
    pub stencil_back_face: rhi::StencilFaceState,
    pub stencil_compare_mask: u8,
    pub stencil_write_mask: u8,
    pub stencil_reference: u8,
    pub defines: Vec<(String, String)>,
}

impl FragmentShader {
    pub fn new(source_path: impl Into<String>, source_entry: impl Into<String>) -> FragmentShader {
        FragmentShader {
            source_path: source_path.into(),
            source_entry: source_entry.into(),
            shader_params_metadata: ShaderParameterMetadataList::default(),
            needed_vertex_attributes: rhi::VertexAttributesType::all(),
            front_face: rhi::FrontFace::CounterClockwise,
            cull_mode: rhi::CullMode::Back,
            polygon_mode: rhi::PolygonMode::Fill,
            conservative_rasterization: false,
            depth_write: true,
            depth_test: true,
            stencil_test: false,
            depth_compare_op: rhi::CompareOp::Greater,
            stencil_front_face: rhi::StencilFaceState::default(),
            stencil_back_face: rhi::StencilFaceState::default(),
            stencil_compare_mask: 0xff,
            stencil_write_mask: 0xff,
            stencil_reference: 0,
            defines: Vec::new(),
        }
    }

    pub fn modify_compiler_environment(&self, environment: &mut CompilerEnvironment) {
        for (key, value) in &self.defines {
            if value.is_empty() {
                environment.set_define(key.clone());
            } else {
                environment.set_define_value(key.clone(), value.clone());
            }
        }
    }
}

/// Populates the render graph for each camera.
pub trait Renderer {
    fn prepare_renderer_per_frame_data(&mut self, scene: &GpuScene);
    fn prepare_renderer_per_camera_data(&mut self, camera: &Camera);
    fn render_camera(
        &mut self,
        camera_handle: CameraHandle,
        camera: &Camera,
        graph: &mut RenderGraph,
        scene: &GpuScene,
    );
}

/// Composes camera outputs onto the swapchain image.
pub trait Displayer {
    fn display(&mut self, encoder: &mut dyn rhi::CommandEncoder, swapchain_texture: &Texture);
}
