//! Cameras and their per-frame shader input.

use nalgebra_glm as glm;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::context::GraphicsContext;
use crate::define_handle;
use crate::rhi;
use crate::shader::{ShaderParameter, ShaderParameterMetadata, ShaderParameterMetadataList};
use crate::texture::Texture;

define_handle! {
    /// Stable handle of a camera inside the GPU scene.
    pub struct CameraHandle;
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ProjectionType {
    Perspective,
    Orthographic,
}

fn camera_params_metadata() -> ShaderParameterMetadataList {
    ShaderParameterMetadataList::new(vec![
        ShaderParameterMetadata::value("float4x4", "matrix_view", 64, 16),
        ShaderParameterMetadata::value("float4x4", "matrix_inv_view", 64, 16),
        ShaderParameterMetadata::value("float4x4", "matrix_proj", 64, 16),
        ShaderParameterMetadata::value("float4x4", "matrix_inv_proj", 64, 16),
        ShaderParameterMetadata::value("float4x4", "matrix_proj_view", 64, 16),
        ShaderParameterMetadata::value("float4x4", "matrix_prev_proj_view", 64, 16),
        ShaderParameterMetadata::value("uint", "frame_index", 4, 4),
        ShaderParameterMetadata::value("uint2", "viewport_size", 8, 8),
    ])
}

pub struct Camera {
    pub position: glm::Vec3,
    pub front_dir: glm::Vec3,
    pub up_dir: glm::Vec3,
    /// Vertical field of view in degrees.
    pub yfov: f32,
    pub near_z: f32,
    pub far_z: f32,
    pub projection_type: ProjectionType,

    target_texture: Option<Rc<Texture>>,
    target_access: Cell<rhi::ResourceAccess>,
    shader_params: RefCell<ShaderParameter>,
    matrix_proj_view: Cell<glm::Mat4>,
}

impl Default for Camera {
    fn default() -> Self {
        Camera::new()
    }
}

impl Camera {
    pub fn new() -> Camera {
        Camera {
            position: glm::vec3(0.0, 0.0, 0.0),
            front_dir: glm::vec3(0.0, 0.0, -1.0),
            up_dir: glm::vec3(0.0, 1.0, 0.0),
            yfov: 60.0,
            near_z: 0.001,
            far_z: 1e5,
            projection_type: ProjectionType::Perspective,
            target_texture: None,
            target_access: Cell::new(rhi::ResourceAccess::NONE),
            shader_params: RefCell::new(ShaderParameter::new()),
            matrix_proj_view: Cell::new(glm::identity()),
        }
    }

    pub fn target_texture(&self) -> Option<&Rc<Texture>> {
        self.target_texture.as_ref()
    }

    pub fn target_access(&self) -> rhi::ResourceAccess {
        self.target_access.get()
    }

    pub(crate) fn set_target_access(&self, access: rhi::ResourceAccess) {
        self.target_access.set(access);
    }

    /// (Re)creates the render target if the requested description changed.
    pub fn recreate_target_texture(
        &mut self,
        ctx: &Rc<GraphicsContext>,
        width: u32,
        height: u32,
        format: rhi::ResourceFormat,
        mipmap: bool,
    ) {
        let usages = if format.is_color() {
            rhi::TextureUsage::COLOR_ATTACHMENT | rhi::TextureUsage::SAMPLED
        } else {
            rhi::TextureUsage::DEPTH_STENCIL_ATTACHMENT | rhi::TextureUsage::SAMPLED
        };
        let levels = if mipmap {
            1 + (width.max(height) as f32).log2() as u32
        } else {
            1
        };
        let desc = rhi::TextureDesc {
            extent: rhi::Extent3d {
                width,
                height,
                depth_or_layers: 1,
            },
            levels,
            format,
            dim: rhi::TextureDimension::D2,
            usages,
        };
        let recreate = match &self.target_texture {
            Some(texture) => *texture.desc() != desc,
            None => true,
        };
        if recreate {
            self.target_texture = Some(Rc::new(Texture::new(ctx, desc)));
            self.target_access.set(rhi::ResourceAccess::NONE);
        }
    }

    pub fn shader_params(&self) -> &RefCell<ShaderParameter> {
        &self.shader_params
    }

    pub fn shader_params_metadata(&self) -> ShaderParameterMetadataList {
        camera_params_metadata()
    }

    pub fn aspect(&self) -> f32 {
        match &self.target_texture {
            Some(texture) => {
                let extent = texture.desc().extent;
                extent.width as f32 / extent.height.max(1) as f32
            }
            None => 1.0,
        }
    }

    /// Recomputes the camera matrices and uploads them; called once per
    /// camera per frame.
    pub fn update_shader_params(&self, ctx: &Rc<GraphicsContext>) {
        {
            let mut params = self.shader_params.borrow_mut();
            if !params.is_allocated() {
                params.initialize(ctx, camera_params_metadata(), false);
            }

            let matrix_view = glm::look_at(&self.position, &(self.position + self.front_dir), &self.up_dir);
            let matrix_proj = match self.projection_type {
                ProjectionType::Perspective => glm::perspective(
                    self.aspect(),
                    self.yfov.to_radians(),
                    self.near_z,
                    self.far_z,
                ),
                ProjectionType::Orthographic => {
                    let half_height = (self.yfov * 0.5).to_radians().tan();
                    let half_width = half_height * self.aspect();
                    glm::ortho(
                        -half_width,
                        half_width,
                        -half_height,
                        half_height,
                        self.near_z,
                        self.far_z,
                    )
                }
            };
            let matrix_proj_view = matrix_proj * matrix_view;

            params.set_value("matrix_view", &matrix_view);
            params.set_value("matrix_inv_view", &glm::inverse(&matrix_view));
            params.set_value("matrix_proj", &matrix_proj);
            params.set_value("matrix_inv_proj", &glm::inverse(&matrix_proj));
            params.set_value("matrix_proj_view", &matrix_proj_view);
            params.set_value("matrix_prev_proj_view", &self.matrix_proj_view.get());
            params.set_value("frame_index", &(ctx.frame_count() as u32));
            let viewport_size = match &self.target_texture {
                Some(texture) => [texture.desc().extent.width, texture.desc().extent.height],
                None => [0u32, 0u32],
            };
            params.set_value("viewport_size", &viewport_size);

            self.matrix_proj_view.set(matrix_proj_view);
        }
        self.shader_params.borrow().update_uniform_buffer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rhi::null::NullDevice;

    #[test]
    fn update_allocates_and_marks_dirty() {
        let ctx = GraphicsContext::new(Rc::new(NullDevice::new()), 2);
        let mut camera = Camera::new();
        camera.recreate_target_texture(&ctx, 64, 32, rhi::ResourceFormat::Rgba8Unorm, false);
        assert_eq!(camera.aspect(), 2.0);

        camera.update_shader_params(&ctx);
        let params = camera.shader_params().borrow();
        assert!(params.is_allocated());
        assert!(params.uniform_buffer().is_some());
        // the whole block is one contiguous value run
        assert_eq!(params.uniform_ranges().len(), 1);
    }

    #[test]
    fn target_recreation_is_desc_sensitive() {
        let ctx = GraphicsContext::new(Rc::new(NullDevice::new()), 2);
        let mut camera = Camera::new();
        camera.recreate_target_texture(&ctx, 64, 64, rhi::ResourceFormat::Rgba8Unorm, false);
        let first = camera.target_texture().unwrap().clone();
        camera.recreate_target_texture(&ctx, 64, 64, rhi::ResourceFormat::Rgba8Unorm, false);
        assert!(Rc::ptr_eq(&first, camera.target_texture().unwrap()));
        camera.recreate_target_texture(&ctx, 128, 64, rhi::ResourceFormat::Rgba8Unorm, false);
        assert!(!Rc::ptr_eq(&first, camera.target_texture().unwrap()));
    }
}
