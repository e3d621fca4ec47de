//! Test doubles: a fake model loader, temporary model files and encoded
//! images.

use image::{DynamicImage, ImageFormat};
use ndarray::Array4;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tempfile::{TempDir, tempdir};

use crate::model::{Classifier, InferenceError, ModelLoader};

/// The artifact is either a number, returned as the score for every image,
/// or the word `mean`, which scores an image by its mean pixel value.
pub struct ScoreFileLoader;

impl ModelLoader for ScoreFileLoader {
    fn name(&self) -> &'static str {
        "score-file"
    }

    fn load(&self, bytes: &[u8]) -> Result<Box<dyn Classifier>, InferenceError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| InferenceError::Load("artifact is not text".into()))?
            .trim();
        let scoring = match text {
            "mean" => Scoring::BatchMean,
            _ => Scoring::Fixed(
                text.parse()
                    .map_err(|_| InferenceError::Load("artifact is not a score".into()))?,
            ),
        };
        Ok(Box::new(FakeClassifier { scoring }))
    }
}

enum Scoring {
    Fixed(f32),
    BatchMean,
}

struct FakeClassifier {
    scoring: Scoring,
}

impl Classifier for FakeClassifier {
    fn predict(&self, batch: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        match self.scoring {
            Scoring::Fixed(score) => Ok(vec![score]),
            Scoring::BatchMean => Ok(vec![batch.mean().unwrap_or(0.0)]),
        }
    }
}

/// A model file inside its own temporary directory, removed on drop.
pub struct TempModel {
    _dir: TempDir,
    path: PathBuf,
}

impl TempModel {
    pub fn new(contents: &str) -> Self {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.txt");
        let model = Self { _dir: dir, path };
        model.write(contents);
        model
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, contents: &str) {
        std::fs::write(&self.path, contents).unwrap();
    }

    pub fn remove(&self) {
        std::fs::remove_file(&self.path).unwrap();
    }
}

pub fn encode_png(image: DynamicImage) -> Vec<u8> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_model_is_cleaned_up_on_drop() {
        let model = TempModel::new("0.4");
        let path = model.path().to_path_buf();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "0.4");

        model.write("mean");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "mean");

        drop(model);
        assert!(!path.exists());
        assert!(!path.parent().unwrap().exists());
    }
}
