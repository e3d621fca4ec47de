use ndarray::Array4;
use std::io::Cursor;
use tract_onnx::prelude::*;

use super::{Classifier, InferenceError, ModelLoader};

type OnnxPlan = TypedRunnableModel<TypedModel>;

/// Loads ONNX exports with tract. The input fact is pinned to the batch shape
/// produced by preprocessing so the graph can be fully optimized up front.
pub struct OnnxLoader {
    input_shape: [usize; 4],
}

impl OnnxLoader {
    pub fn new(input_shape: [usize; 4]) -> Self {
        Self { input_shape }
    }
}

impl ModelLoader for OnnxLoader {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn load(&self, bytes: &[u8]) -> Result<Box<dyn Classifier>, InferenceError> {
        let plan = tract_onnx::onnx()
            .model_for_read(&mut Cursor::new(bytes))
            .and_then(|model| {
                model.with_input_fact(
                    0,
                    InferenceFact::dt_shape(f32::datum_type(), self.input_shape),
                )
            })
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| InferenceError::Load(format!("{e:#}")))?;

        Ok(Box::new(OnnxClassifier {
            plan,
            input_shape: self.input_shape,
        }))
    }
}

struct OnnxClassifier {
    plan: OnnxPlan,
    input_shape: [usize; 4],
}

impl Classifier for OnnxClassifier {
    fn predict(&self, batch: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        if batch.shape() != self.input_shape {
            return Err(InferenceError::Backend(format!(
                "batch shape {:?} does not match model input {:?}",
                batch.shape(),
                self.input_shape
            )));
        }
        let data = batch
            .as_slice()
            .ok_or_else(|| InferenceError::Backend("batch is not contiguous".into()))?;
        let input = Tensor::from_shape(&self.input_shape, data)
            .map_err(|e| InferenceError::Backend(format!("{e:#}")))?;

        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| InferenceError::Backend(format!("{e:#}")))?;
        let output = outputs
            .first()
            .ok_or(InferenceError::EmptyOutput)?
            .to_array_view::<f32>()
            .map_err(|e| InferenceError::Backend(format!("{e:#}")))?;
        Ok(output.iter().copied().collect())
    }
}
