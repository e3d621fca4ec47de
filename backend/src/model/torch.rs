use ndarray::Array4;
use std::io::Cursor;
use std::sync::{Mutex, PoisonError};
use tch::{CModule, Device, Kind, Tensor, nn::ModuleT};

use super::{Classifier, InferenceError, ModelLoader};

/// Loads TorchScript modules, on CUDA when available.
pub struct TorchLoader {
    input_shape: [usize; 4],
    device: Device,
}

impl TorchLoader {
    pub fn new(input_shape: [usize; 4]) -> Self {
        Self {
            input_shape,
            device: Device::cuda_if_available(),
        }
    }
}

impl ModelLoader for TorchLoader {
    fn name(&self) -> &'static str {
        "torch"
    }

    fn load(&self, bytes: &[u8]) -> Result<Box<dyn Classifier>, InferenceError> {
        let mut module = CModule::load_data_on_device(&mut Cursor::new(bytes), self.device)
            .map_err(|e| InferenceError::Load(e.to_string()))?;
        module.set_eval();
        log::info!("TorchScript module placed on {:?}", self.device);
        Ok(Box::new(TorchClassifier {
            module: Mutex::new(module),
            input_shape: self.input_shape.map(|d| d as i64),
            device: self.device,
        }))
    }
}

struct TorchClassifier {
    module: Mutex<CModule>,
    input_shape: [i64; 4],
    device: Device,
}

impl Classifier for TorchClassifier {
    fn predict(&self, batch: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        let data = batch
            .as_slice()
            .ok_or_else(|| InferenceError::Backend("batch is not contiguous".into()))?;
        let input = Tensor::f_from_slice(data)?
            .view(self.input_shape)
            .to_device(self.device);

        let output = {
            let module = self.module.lock().unwrap_or_else(PoisonError::into_inner);
            tch::no_grad(|| module.forward_t(&input, false))
        };
        let output = output.to_kind(Kind::Float).view([-1]);
        Ok(Vec::<f32>::try_from(&output)?)
    }
}
