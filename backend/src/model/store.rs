use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::{Classifier, LoadError, ModelLoader};

#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub path: PathBuf,
    pub sha256: String,
    pub loaded_at: DateTime<Utc>,
    pub generation: u64,
}

impl From<&ModelInfo> for shared::ModelStatus {
    fn from(info: &ModelInfo) -> Self {
        Self {
            path: info.path.display().to_string(),
            sha256: info.sha256.clone(),
            loaded_at: info.loaded_at,
            generation: info.generation,
        }
    }
}

pub struct LoadedModel {
    pub classifier: Box<dyn Classifier>,
    pub info: ModelInfo,
}

/// Holds the active model. Readers take an `Arc` snapshot, so a reload never
/// waits on, or interrupts, a prediction that is already running. Reloads
/// are serialized among themselves by `reload_guard`.
pub struct ModelStore {
    path: PathBuf,
    loader: Arc<dyn ModelLoader>,
    current: RwLock<Arc<LoadedModel>>,
    reload_guard: Mutex<()>,
}

impl ModelStore {
    pub fn open(path: impl Into<PathBuf>, loader: Arc<dyn ModelLoader>) -> Result<Self, LoadError> {
        let path = path.into();
        let model = load_from(&path, loader.as_ref(), 1)?;
        log::info!(
            "Loaded {} model from {} (sha256 {})",
            loader.name(),
            path.display(),
            model.info.sha256
        );
        Ok(Self {
            path,
            loader,
            current: RwLock::new(Arc::new(model)),
            reload_guard: Mutex::new(()),
        })
    }

    pub fn current(&self) -> Arc<LoadedModel> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn backend(&self) -> &'static str {
        self.loader.name()
    }

    /// Loads the artifact again from the same path. The swap only happens
    /// once the new model is built; on failure the old one stays active.
    /// The last reload to return is the one whose artifact is served.
    pub fn reload(&self) -> Result<ModelInfo, LoadError> {
        let _reloading = self.reload_guard.lock().unwrap_or_else(PoisonError::into_inner);
        let next_generation = self.current().info.generation + 1;
        let model = match load_from(&self.path, self.loader.as_ref(), next_generation) {
            Ok(model) => Arc::new(model),
            Err(e) => {
                log::error!("Reload of {} failed, keeping current model: {}", self.path.display(), e);
                return Err(e);
            }
        };
        let info = model.info.clone();

        let previous = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *current, model)
        };
        log::info!(
            "Model reloaded from {}: {} -> {} (generation {})",
            self.path.display(),
            previous.info.sha256,
            info.sha256,
            info.generation
        );
        Ok(info)
    }
}

fn load_from(path: &Path, loader: &dyn ModelLoader, generation: u64) -> Result<LoadedModel, LoadError> {
    let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let sha256 = artifact_digest(&bytes);
    let classifier = loader.load(&bytes)?;
    Ok(LoadedModel {
        classifier,
        info: ModelInfo {
            path: path.to_path_buf(),
            sha256,
            loaded_at: Utc::now(),
            generation,
        },
    })
}

pub fn artifact_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InferenceError;
    use crate::testing::{ScoreFileLoader, TempModel};
    use ndarray::Array4;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    /// Parks the first reload inside `load` until the test releases it.
    struct GatedLoader {
        loads: AtomicUsize,
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl ModelLoader for GatedLoader {
        fn name(&self) -> &'static str {
            "gated"
        }

        fn load(&self, bytes: &[u8]) -> Result<Box<dyn Classifier>, InferenceError> {
            if self.loads.fetch_add(1, Ordering::SeqCst) == 1 {
                self.entered.lock().unwrap().send(()).unwrap();
                self.release.lock().unwrap().recv().unwrap();
            }
            ScoreFileLoader.load(bytes)
        }
    }

    /// Slow loader that records how many loads ever ran at once.
    #[derive(Default)]
    struct OverlapLoader {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ModelLoader for OverlapLoader {
        fn name(&self) -> &'static str {
            "overlap"
        }

        fn load(&self, bytes: &[u8]) -> Result<Box<dyn Classifier>, InferenceError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            ScoreFileLoader.load(bytes)
        }
    }

    fn score_of(model: &LoadedModel) -> f32 {
        let batch = Array4::<f32>::zeros((1, 2, 2, 3));
        model.classifier.predict(&batch).unwrap()[0]
    }

    #[test]
    fn open_fails_fast_on_missing_file() {
        let err = ModelStore::open("/nonexistent/model.onnx", Arc::new(ScoreFileLoader))
            .err()
            .unwrap();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn open_fails_on_unloadable_artifact() {
        let file = TempModel::new("garbage");
        let err = ModelStore::open(file.path(), Arc::new(ScoreFileLoader))
            .err()
            .unwrap();
        assert!(matches!(err, LoadError::Model(_)));
    }

    #[test]
    fn reload_swaps_in_the_new_artifact() {
        let file = TempModel::new("0.25");
        let store = ModelStore::open(file.path(), Arc::new(ScoreFileLoader)).unwrap();
        let first = store.current();
        assert_eq!(score_of(&first), 0.25);
        assert_eq!(first.info.generation, 1);

        file.write("0.9");
        let info = store.reload().unwrap();
        assert_eq!(info.generation, 2);
        assert_ne!(info.sha256, first.info.sha256);
        assert_eq!(score_of(&store.current()), 0.9);
    }

    #[test]
    fn snapshot_outlives_a_reload() {
        let file = TempModel::new("0.1");
        let store = ModelStore::open(file.path(), Arc::new(ScoreFileLoader)).unwrap();
        let snapshot = store.current();

        file.write("0.8");
        store.reload().unwrap();

        assert_eq!(score_of(&snapshot), 0.1);
        assert_eq!(score_of(&store.current()), 0.8);
    }

    #[test]
    fn failed_reload_keeps_the_previous_model() {
        let file = TempModel::new("0.3");
        let store = ModelStore::open(file.path(), Arc::new(ScoreFileLoader)).unwrap();

        file.write("not a score");
        assert!(matches!(store.reload(), Err(LoadError::Model(_))));
        assert_eq!(score_of(&store.current()), 0.3);
        assert_eq!(store.current().info.generation, 1);

        file.remove();
        assert!(matches!(store.reload(), Err(LoadError::Io { .. })));
        assert_eq!(score_of(&store.current()), 0.3);
    }

    #[test]
    fn overlapping_reloads_serve_the_latest_artifact() {
        let file = TempModel::new("0.1");
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let loader = GatedLoader {
            loads: AtomicUsize::new(0),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        };
        let store = Arc::new(ModelStore::open(file.path(), Arc::new(loader)).unwrap());

        file.write("0.2");
        let older = {
            let store = store.clone();
            thread::spawn(move || store.reload().unwrap())
        };
        entered_rx.recv().unwrap();

        // Readers are not blocked while a reload is building its model.
        let reader = {
            let store = store.clone();
            thread::spawn(move || {
                let model = store.current();
                (score_of(&model), model.info.generation)
            })
        };
        assert_eq!(reader.join().unwrap(), (0.1, 1));

        file.write("0.9");
        let newer = {
            let store = store.clone();
            thread::spawn(move || store.reload().unwrap())
        };
        thread::sleep(Duration::from_millis(50));
        release_tx.send(()).unwrap();

        assert_eq!(older.join().unwrap().generation, 2);
        assert_eq!(newer.join().unwrap().generation, 3);
        let current = store.current();
        assert_eq!(score_of(&current), 0.9);
        assert_eq!(current.info.generation, 3);
    }

    #[test]
    fn concurrent_reloads_run_one_at_a_time() {
        let file = TempModel::new("0.4");
        let loader = Arc::new(OverlapLoader::default());
        let store = Arc::new(ModelStore::open(file.path(), loader.clone()).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || store.reload().unwrap().generation)
            })
            .collect();
        let mut generations: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        generations.sort_unstable();

        assert_eq!(generations, vec![2, 3, 4, 5]);
        assert_eq!(loader.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(store.current().info.generation, 5);
    }

    #[test]
    fn predictions_on_other_threads_see_old_or_new_model() {
        let file = TempModel::new("0.25");
        let store = Arc::new(ModelStore::open(file.path(), Arc::new(OverlapLoader::default())).unwrap());
        file.write("0.75");

        let readers: Vec<_> = (0..3)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    (0..200)
                        .map(|_| score_of(&store.current()))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let reloader = {
            let store = store.clone();
            thread::spawn(move || {
                for _ in 0..3 {
                    store.reload().unwrap();
                }
            })
        };

        reloader.join().unwrap();
        for reader in readers {
            let scores = reader.join().unwrap();
            assert!(scores.iter().all(|&s| s == 0.25 || s == 0.75));
        }
        assert_eq!(score_of(&store.current()), 0.75);
        assert_eq!(store.current().info.generation, 4);
    }

    #[test]
    fn digest_is_hex_sha256() {
        assert_eq!(
            artifact_digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
