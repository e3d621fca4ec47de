pub mod store;

#[cfg(feature = "onnx")]
pub mod onnx;
#[cfg(feature = "torch")]
pub mod torch;

use ndarray::Array4;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{ImageConfig, ModelBackend};

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Model artifact could not be loaded: {0}")]
    Load(String),
    #[error("Model execution failed: {0}")]
    Backend(String),
    #[error("Model returned an empty output")]
    EmptyOutput,
    #[error("Model returned a non-finite score: {0}")]
    NonFinite(f32),
    #[cfg(feature = "torch")]
    #[error("Torch error: {0}")]
    Torch(#[from] tch::TchError),
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read model file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Model(#[from] InferenceError),
    #[error("Backend {0:?} is not compiled into this build")]
    UnsupportedBackend(ModelBackend),
}

/// A loaded binary classifier. Implementations return the flattened model
/// output for a batch of one; the caller reads the first element.
pub trait Classifier: Send + Sync {
    fn predict(&self, batch: &Array4<f32>) -> Result<Vec<f32>, InferenceError>;
}

/// Builds a [`Classifier`] from the raw bytes of a model artifact.
pub trait ModelLoader: Send + Sync {
    fn name(&self) -> &'static str;

    fn load(&self, bytes: &[u8]) -> Result<Box<dyn Classifier>, InferenceError>;
}

#[cfg_attr(not(any(feature = "onnx", feature = "torch")), allow(unused_variables))]
pub fn loader_for(
    backend: ModelBackend,
    image: &ImageConfig,
) -> Result<Arc<dyn ModelLoader>, LoadError> {
    match backend {
        #[cfg(feature = "onnx")]
        ModelBackend::Onnx => Ok(Arc::new(onnx::OnnxLoader::new(image.batch_shape()))),
        #[cfg(feature = "torch")]
        ModelBackend::Torch => Ok(Arc::new(torch::TorchLoader::new(image.batch_shape()))),
        #[allow(unreachable_patterns)]
        other => Err(LoadError::UnsupportedBackend(other)),
    }
}

/// Takes the single scalar out of a batch-of-one output.
pub fn first_score(output: &[f32]) -> Result<f32, InferenceError> {
    let score = *output.first().ok_or(InferenceError::EmptyOutput)?;
    if !score.is_finite() {
        return Err(InferenceError::NonFinite(score));
    }
    Ok(score)
}
