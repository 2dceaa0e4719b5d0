//! Backend selection for burn.
//!
//! CPU-only: inference and training both run on the NdArray backend.

use burn::backend::{Autodiff, NdArray};

/// Backend used for inference.
pub type DefaultBackend = NdArray;

/// Autodiff backend used for training.
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Default device for the inference backend.
pub fn default_device() -> <DefaultBackend as burn::tensor::backend::BackendTypes>::Device {
    Default::default()
}
