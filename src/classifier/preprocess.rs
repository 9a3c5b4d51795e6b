use image::{RgbImage, imageops::{self, FilterType}};
use ndarray::Array3;
use serde::Deserialize;

use crate::error::{DetectorError, Result};

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ImageSize {
    Square(u32),
    Dims { height: u32, width: u32 },
    ShortestEdge { shortest_edge: u32 },
}

impl ImageSize {
    /// `(width, height)` of the model input.
    pub fn dimensions(&self) -> (u32, u32) {
        match *self {
            ImageSize::Square(side) => (side, side),
            ImageSize::Dims { height, width } => (width, height),
            ImageSize::ShortestEdge { shortest_edge } => (shortest_edge, shortest_edge),
        }
    }
}

fn default_size() -> ImageSize {
    ImageSize::Square(224)
}

fn default_mean() -> [f32; 3] {
    IMAGENET_MEAN
}

fn default_std() -> [f32; 3] {
    IMAGENET_STD
}

fn default_rescale() -> f32 {
    1.0 / 255.0
}

fn default_true() -> bool {
    true
}

/// Mirrors the keys of a `preprocessor_config.json`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PreprocessorConfig {
    #[serde(default = "default_size")]
    pub size: ImageSize,
    #[serde(default = "default_mean")]
    pub image_mean: [f32; 3],
    #[serde(default = "default_std")]
    pub image_std: [f32; 3],
    #[serde(default = "default_rescale")]
    pub rescale_factor: f32,
    #[serde(default = "default_true")]
    pub do_normalize: bool,
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self {
            size: default_size(),
            image_mean: IMAGENET_MEAN,
            image_std: IMAGENET_STD,
            rescale_factor: default_rescale(),
            do_normalize: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    config: PreprocessorConfig,
}

impl ImagePreprocessor {
    pub fn new(config: PreprocessorConfig) -> Result<Self> {
        let (width, height) = config.size.dimensions();
        if width == 0 || height == 0 {
            return Err(DetectorError::Config("preprocessor size must be non-zero".into()));
        }
        if config.do_normalize && config.image_std.iter().any(|&s| s <= 0.0) {
            return Err(DetectorError::Config("image_std values must be positive".into()));
        }

        Ok(Self { config })
    }

    pub fn config(&self) -> &PreprocessorConfig {
        &self.config
    }

    /// Resize, rescale and normalize into a `(channel, row, column)` tensor.
    pub fn process(&self, image: &RgbImage) -> Array3<f32> {
        let (width, height) = self.config.size.dimensions();
        let resized = if image.dimensions() == (width, height) {
            image.clone()
        } else {
            imageops::resize(image, width, height, FilterType::Triangle)
        };

        let mut tensor = Array3::<f32>::zeros((3, height as usize, width as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                let mut value = pixel[c] as f32 * self.config.rescale_factor;
                if self.config.do_normalize {
                    value = (value - self.config.image_mean[c]) / self.config.image_std[c];
                }
                tensor[[c, y as usize, x as usize]] = value;
            }
        }

        tensor
    }
}
