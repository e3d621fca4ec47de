use shared::{Freshness, HealthResponse, PredictResponse};

use crate::config::ImageConfig;
use crate::error::ServiceError;
use crate::model::first_score;
use crate::model::store::{ModelInfo, ModelStore};
use crate::preprocess::preprocess;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: Freshness,
    /// Raw model output, whichever label it selected.
    pub confidence: f32,
}

impl From<Prediction> for PredictResponse {
    fn from(prediction: Prediction) -> Self {
        Self {
            result: prediction.label,
            confidence: prediction.confidence,
        }
    }
}

pub struct InferenceService {
    store: ModelStore,
    image: ImageConfig,
    threshold: f32,
}

impl InferenceService {
    pub fn new(store: ModelStore, image: ImageConfig, threshold: f32) -> Self {
        Self {
            store,
            image,
            threshold,
        }
    }

    pub fn predict(&self, image_bytes: &[u8]) -> Result<Prediction, ServiceError> {
        let batch = preprocess(image_bytes, &self.image)?;
        let model = self.store.current();
        let output = model.classifier.predict(&batch)?;
        let confidence = first_score(&output)?;
        if !(0.0..=1.0).contains(&confidence) {
            log::warn!(
                "Model generation {} returned {} outside [0, 1]",
                model.info.generation,
                confidence
            );
        }

        let label = Freshness::from_score(confidence, self.threshold);
        log::debug!(
            "Predicted {} ({}) with model generation {}",
            label,
            confidence,
            model.info.generation
        );
        Ok(Prediction { label, confidence })
    }

    pub fn reload_model(&self) -> Result<ModelInfo, ServiceError> {
        Ok(self.store.reload()?)
    }

    pub fn health(&self) -> HealthResponse {
        let model = self.store.current();
        HealthResponse {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            backend: self.store.backend().to_string(),
            model: (&model.info).into(),
        }
    }
}
