//! Backend selection
//!
//! Picks the Burn backend from compile-time features:
//! - CUDA when built with `--features cuda`
//! - NdArray (CPU) otherwise

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn_cuda::Cuda;

#[cfg(all(feature = "ndarray", not(feature = "cuda")))]
pub type DefaultBackend = burn_ndarray::NdArray;

#[cfg(not(any(feature = "ndarray", feature = "cuda")))]
compile_error!("Enable one backend feature: `ndarray` or `cuda`.");

/// Backend used for inference (no gradient tracking)
pub type InferenceBackend = DefaultBackend;

/// The autodiff backend used for training
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Get the default device for the selected backend
pub fn default_device() -> <DefaultBackend as Backend>::Device {
    <DefaultBackend as Backend>::Device::default()
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }

    #[cfg(not(feature = "cuda"))]
    {
        "NdArray (CPU)"
    }
}
