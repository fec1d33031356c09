//! Drawables: what the renderer can issue draw calls for.

use nalgebra_glm as glm;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::accel::GeometryAccelerationStructure;
use crate::define_handle;
use crate::interface::{Material, Mesh};
use crate::shader::ShaderParameter;

define_handle! {
    /// Stable handle of a drawable inside the GPU scene.
    pub struct DrawableHandle;
}

/// An affine object-to-world transform.
#[derive(Copy, Clone, Debug)]
pub struct Transform {
    pub matrix: glm::Mat4,
}

impl Default for Transform {
    fn default() -> Self {
        Transform {
            matrix: glm::identity(),
        }
    }
}

impl Transform {
    pub fn from_translation(translation: glm::Vec3) -> Transform {
        Transform {
            matrix: glm::translation(&translation),
        }
    }

    /// The upper three rows, as consumed by acceleration structure instance
    /// records.
    pub fn to_rows_3x4(&self) -> [[f32; 4]; 3] {
        let mut rows = [[0.0f32; 4]; 3];
        for (row, out) in rows.iter_mut().enumerate() {
            for (col, v) in out.iter_mut().enumerate() {
                *v = self.matrix[(row, col)];
            }
        }
        rows
    }
}

/// A tuple of mesh, material, transform and per-drawable shader parameters.
pub struct Drawable {
    pub mesh: Rc<dyn Mesh>,
    pub material: Rc<dyn Material>,
    pub transform: RefCell<Transform>,
    pub shader_params: RefCell<ShaderParameter>,
    handle: Cell<DrawableHandle>,
    pub(crate) blas: RefCell<Option<Rc<RefCell<GeometryAccelerationStructure>>>>,
}

impl Drawable {
    pub fn new(mesh: Rc<dyn Mesh>, material: Rc<dyn Material>) -> Drawable {
        Drawable {
            mesh,
            material,
            transform: RefCell::new(Transform::default()),
            shader_params: RefCell::new(ShaderParameter::new()),
            handle: Cell::new(DrawableHandle::default()),
            blas: RefCell::new(None),
        }
    }

    pub fn handle(&self) -> DrawableHandle {
        self.handle.get()
    }

    pub(crate) fn assign_handle(&self, handle: DrawableHandle) {
        self.handle.set(handle);
    }

    pub fn set_transform(&self, transform: Transform) {
        *self.transform.borrow_mut() = transform;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_rows() {
        let transform = Transform::from_translation(glm::vec3(1.0, 2.0, 3.0));
        let rows = transform.to_rows_3x4();
        assert_eq!(rows[0], [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(rows[1], [0.0, 1.0, 0.0, 2.0]);
        assert_eq!(rows[2], [0.0, 0.0, 1.0, 3.0]);
    }
}
