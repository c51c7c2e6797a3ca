use crate::volume::VolumeModel;
use crate::window::PackedImage;

use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// A [`VolumeModel`] shared between threads.
///
/// The volume and view state sit behind one lock so that a render never
/// observes a half-replaced volume.
#[derive(Clone)]
pub struct SharedVolumeModel {
    inner: Arc<Mutex<VolumeModel>>,
}

impl SharedVolumeModel {
    pub fn new(model: VolumeModel) -> Self {
        Self {
            inner: Arc::new(Mutex::new(model)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, VolumeModel> {
        self.inner.lock()
    }

    /// Run `f` with exclusive access to the model
    pub fn with<R>(&self, f: impl FnOnce(&mut VolumeModel) -> R) -> R {
        f(&mut *self.inner.lock())
    }

    pub fn get_current_image(&self) -> Option<PackedImage> {
        self.inner.lock().get_current_image()
    }

    pub fn sum_images(&self) {
        self.inner.lock().sum_images();
    }

    pub fn avg_images(&self) {
        self.inner.lock().avg_images();
    }

    pub fn scale_images(&self, factor: f64) {
        self.inner.lock().scale_images(factor);
    }
}

impl From<VolumeModel> for SharedVolumeModel {
    fn from(model: VolumeModel) -> Self {
        Self::new(model)
    }
}
