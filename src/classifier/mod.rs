pub mod head;
pub mod preprocess;

use std::{
    fs,
    path::{Path, PathBuf},
};

use image::RgbImage;
use log::{debug, info};
use serde::de::DeserializeOwned;

use crate::{
    classifier::{
        head::{ClassifierHead, HeadWeights},
        preprocess::{ImagePreprocessor, PreprocessorConfig},
    },
    error::{DetectorError, Result},
    resource::ResourceLoader,
    verdict::ProbabilityPair,
};

pub const PREPROCESSOR_FILE: &str = "preprocessor_config.json";
pub const HEAD_FILE: &str = "head.json";

/// Preprocessor and head, always loaded and held together.
#[derive(Debug, Clone)]
pub struct Classifier {
    preprocessor: ImagePreprocessor,
    head: ClassifierHead,
}

impl Classifier {
    /// Rejects a preprocessor whose output cannot be pooled by the head.
    pub fn new(preprocessor: ImagePreprocessor, head: ClassifierHead) -> Result<Self> {
        let (width, height) = preprocessor.config().size.dimensions();
        let pool = head.pool_size() as u32;
        if width < pool || height < pool {
            return Err(DetectorError::Config(format!(
                "preprocessor size {}x{} is smaller than the head pool size {}",
                width, height, pool
            )));
        }

        Ok(Self { preprocessor, head })
    }

    pub fn classify(&self, image: &RgbImage) -> Result<ProbabilityPair> {
        let tensor = self.preprocessor.process(image);
        let probabilities = self.head.forward(&tensor)?;

        let real_index = self.head.real_index();
        let real = probabilities[real_index];
        let artificial = probabilities[1 - real_index];
        debug!("Classifier output: real={:.4}, artificial={:.4}", real, artificial);

        ProbabilityPair::new(real, artificial)
    }
}

/// Reads a classifier from a model directory on first use.
#[derive(Debug, Clone)]
pub struct ClassifierLoader {
    model_dir: PathBuf,
}

impl ClassifierLoader {
    pub fn new<P: AsRef<Path>>(model_dir: P) -> Self {
        Self {
            model_dir: model_dir.as_ref().to_path_buf(),
        }
    }

    fn read_json<T: DeserializeOwned>(&self, file: &str) -> Result<T> {
        let path = self.model_dir.join(file);
        let contents = fs::read_to_string(&path)
            .map_err(|e| DetectorError::Config(format!("cannot read {}: {}", path.display(), e)))?;

        serde_json::from_str(&contents)
            .map_err(|e| DetectorError::Config(format!("cannot parse {}: {}", path.display(), e)))
    }
}

impl ResourceLoader<Classifier> for ClassifierLoader {
    fn load(&self) -> Result<Classifier> {
        let config: PreprocessorConfig = self.read_json(PREPROCESSOR_FILE)?;
        let weights: HeadWeights = self.read_json(HEAD_FILE)?;

        let preprocessor = ImagePreprocessor::new(config)?;
        let head = ClassifierHead::from_weights(weights)?;
        info!(
            "Classifier labels {:?} read from {}",
            head.labels(),
            self.model_dir.display()
        );

        Classifier::new(preprocessor, head)
    }
}
