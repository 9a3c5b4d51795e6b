use std::collections::BTreeMap;

use ndarray::{Array1, Array2, Array3, s};
use serde::Deserialize;

use crate::error::{DetectorError, Result};

const AUTHENTIC_LABELS: [&str; 3] = ["real", "authentic", "human"];

/// On-disk form of `head.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct HeadWeights {
    pub id2label: BTreeMap<String, String>,
    pub pool_size: usize,
    pub weight: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
}

/// Adaptive average pooling followed by a two-way linear layer.
#[derive(Debug, Clone)]
pub struct ClassifierHead {
    labels: [String; 2],
    real_index: usize,
    pool_size: usize,
    weight: Array2<f32>,
    bias: Array1<f32>,
}

impl ClassifierHead {
    pub fn new(labels: [String; 2], pool_size: usize, weight: Array2<f32>, bias: Array1<f32>) -> Result<Self> {
        if pool_size == 0 {
            return Err(DetectorError::Config("pool_size must be non-zero".into()));
        }

        let features = 3 * pool_size * pool_size;
        if weight.dim() != (2, features) {
            return Err(DetectorError::Config(format!(
                "weight must be 2x{}, got {:?}",
                features,
                weight.dim()
            )));
        }
        if bias.len() != 2 {
            return Err(DetectorError::Config(format!(
                "bias must have 2 entries, got {}",
                bias.len()
            )));
        }

        let authentic = labels
            .iter()
            .enumerate()
            .filter(|(_, label)| AUTHENTIC_LABELS.contains(&label.to_lowercase().as_str()))
            .map(|(i, _)| i)
            .collect::<Vec<_>>();
        let real_index = match authentic.as_slice() {
            [index] => *index,
            _ => {
                return Err(DetectorError::Config(format!(
                    "exactly one label must name the authentic class, got {:?}",
                    labels
                )));
            }
        };

        Ok(Self {
            labels,
            real_index,
            pool_size,
            weight,
            bias,
        })
    }

    pub fn from_weights(weights: HeadWeights) -> Result<Self> {
        let mut ids = weights
            .id2label
            .into_iter()
            .map(|(id, label)| {
                id.parse::<usize>()
                    .map(|id| (id, label))
                    .map_err(|_| DetectorError::Config(format!("label id {:?} is not an integer", id)))
            })
            .collect::<Result<Vec<_>>>()?;
        ids.sort_by_key(|(id, _)| *id);

        let labels = match ids.as_slice() {
            [(0, first), (1, second)] => [first.clone(), second.clone()],
            _ => {
                return Err(DetectorError::Config(
                    "id2label must contain exactly the ids 0 and 1".into(),
                ));
            }
        };

        let columns = weights.weight.first().map(Vec::len).unwrap_or(0);
        if weights.weight.iter().any(|row| row.len() != columns) {
            return Err(DetectorError::Config("weight rows have different lengths".into()));
        }
        let flat = weights.weight.into_iter().flatten().collect::<Vec<_>>();
        let rows = if columns == 0 { 0 } else { flat.len() / columns };
        let weight = Array2::from_shape_vec((rows, columns), flat)
            .map_err(|e| DetectorError::Config(format!("invalid weight matrix: {}", e)))?;

        Self::new(labels, weights.pool_size, weight, Array1::from(weights.bias))
    }

    pub fn labels(&self) -> &[String; 2] {
        &self.labels
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn real_index(&self) -> usize {
        self.real_index
    }

    pub fn pool(&self, tensor: &Array3<f32>) -> Result<Array1<f32>> {
        let (channels, height, width) = tensor.dim();
        let pool = self.pool_size;
        if channels != 3 || height < pool || width < pool {
            return Err(DetectorError::Inference(format!(
                "input tensor {:?} cannot be pooled to {}x{}",
                tensor.dim(),
                pool,
                pool
            )));
        }

        let mut features = Array1::<f32>::zeros(channels * pool * pool);
        for c in 0..channels {
            for i in 0..pool {
                let (y0, y1) = (i * height / pool, (i + 1) * height / pool);
                for j in 0..pool {
                    let (x0, x1) = (j * width / pool, (j + 1) * width / pool);
                    let cell = tensor.slice(s![c, y0..y1, x0..x1]);
                    features[c * pool * pool + i * pool + j] = cell.mean().unwrap_or(0.0);
                }
            }
        }

        Ok(features)
    }

    /// Class probabilities in label-id order.
    pub fn forward(&self, tensor: &Array3<f32>) -> Result<[f64; 2]> {
        let features = self.pool(tensor)?;
        let logits = self.weight.dot(&features) + &self.bias;

        let probabilities = softmax(&[logits[0] as f64, logits[1] as f64]);
        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(DetectorError::Inference("non-finite class probabilities".into()));
        }

        Ok(probabilities)
    }
}

fn softmax(logits: &[f64; 2]) -> [f64; 2] {
    let max = logits[0].max(logits[1]);
    let exp = [(logits[0] - max).exp(), (logits[1] - max).exp()];
    let sum = exp[0] + exp[1];
    [exp[0] / sum, exp[1] / sum]
}
