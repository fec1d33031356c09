//! GPU scene: slot-mapped cameras and drawables.
//!
//! The scene owns no rendering state of its own; drawables reference mesh and
//! material implementations owned elsewhere. Iteration order is unspecified.

use std::rc::Rc;

use crate::camera::{Camera, CameraHandle};
use crate::containers::SlotMap;
use crate::drawable::{Drawable, DrawableHandle};

#[derive(Default)]
pub struct GpuScene {
    cameras: SlotMap<Camera, CameraHandle>,
    drawables: SlotMap<Rc<Drawable>, DrawableHandle>,
}

impl GpuScene {
    pub fn new() -> GpuScene {
        GpuScene::default()
    }

    pub fn add_camera(&mut self, camera: Camera) -> CameraHandle {
        self.cameras.emplace(camera)
    }

    pub fn remove_camera(&mut self, handle: CameraHandle) {
        self.cameras.remove(handle);
    }

    pub fn camera(&self, handle: CameraHandle) -> Option<&Camera> {
        self.cameras.get(handle)
    }

    pub fn camera_mut(&mut self, handle: CameraHandle) -> Option<&mut Camera> {
        self.cameras.get_mut(handle)
    }

    pub fn num_cameras(&self) -> usize {
        self.cameras.len()
    }

    pub fn for_each_camera(&self, mut func: impl FnMut(&Camera)) {
        for camera in self.cameras.iter() {
            func(camera);
        }
    }

    pub fn cameras_with_handles(&self) -> impl Iterator<Item = (CameraHandle, &Camera)> {
        self.cameras.iter_with_handles()
    }

    pub fn add_drawable(&mut self, drawable: Rc<Drawable>) -> DrawableHandle {
        let handle = self.drawables.emplace(drawable.clone());
        drawable.assign_handle(handle);
        handle
    }

    pub fn remove_drawable(&mut self, handle: DrawableHandle) {
        self.drawables.remove(handle);
    }

    pub fn drawable(&self, handle: DrawableHandle) -> Option<&Rc<Drawable>> {
        self.drawables.get(handle)
    }

    pub fn num_drawables(&self) -> usize {
        self.drawables.len()
    }

    pub fn for_each_drawable(&self, mut func: impl FnMut(&Rc<Drawable>)) {
        for drawable in self.drawables.iter() {
            func(drawable);
        }
    }
}
