//! Backend selection
//!
//! Training prefers the CUDA backend when the `cuda` feature is enabled.
//! Without it the crate falls back to the ndarray host backend so that the
//! same binary runs on machines without an accelerator.

use burn::backend::Autodiff;
use tracing::info;

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn_cuda::Cuda;

#[cfg(not(feature = "cuda"))]
pub type DefaultBackend = burn_ndarray::NdArray;

/// The autodiff backend used for fine-tuning
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Get the default device for the selected backend
pub fn default_device() -> <DefaultBackend as burn::tensor::backend::Backend>::Device {
    #[cfg(feature = "cuda")]
    {
        burn_cuda::CudaDevice::default()
    }
    #[cfg(not(feature = "cuda"))]
    {
        burn_ndarray::NdArrayDevice::default()
    }
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }
    #[cfg(not(feature = "cuda"))]
    {
        "ndarray (CPU)"
    }
}

/// Report which compute path this build uses
pub fn log_backend() {
    #[cfg(feature = "cuda")]
    info!("Using CUDA backend");
    #[cfg(not(feature = "cuda"))]
    tracing::warn!("CUDA backend not compiled in, computation falls back to the host processor");
    info!("Active backend: {}", backend_name());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_name_is_set() {
        assert!(!backend_name().is_empty());
    }
}
