use image::RgbImage;
use log::debug;
use rayon::prelude::*;

use crate::{
    ElaResult, ImageAsset,
    error::{DetectorError, Result},
    image_utils::{encode_jpeg, jpeg_roundtrip},
};

pub const DEFAULT_ELA_QUALITY: u8 = 90;
pub const DEFAULT_ARTIFACT_QUALITY: u8 = 75;

/// Error Level Analysis: the difference between an image and a JPEG
/// re-encoding of itself, stretched so the largest residual becomes 255.
#[derive(Debug, Clone, Copy)]
pub struct ElaAnalyzer {
    quality: u8,
    artifact_quality: u8,
}

impl Default for ElaAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_ELA_QUALITY)
    }
}

impl ElaAnalyzer {
    pub fn new(quality: u8) -> Self {
        Self {
            quality,
            artifact_quality: DEFAULT_ARTIFACT_QUALITY,
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Raw bytes in, encoded error map out. Decode failures surface as
    /// `InvalidImage`.
    pub fn compute_error_map(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let asset = ImageAsset::decode(bytes.to_vec())?;
        Ok(self.analyze(&asset.image)?.encoded)
    }

    pub fn analyze(&self, image: &RgbImage) -> Result<ElaResult> {
        let recompressed = jpeg_roundtrip(image, self.quality)?;
        self.residual_map(image, &recompressed)
    }

    fn residual_map(&self, original: &RgbImage, recompressed: &RgbImage) -> Result<ElaResult> {
        let (width, height) = original.dimensions();
        if recompressed.dimensions() != (width, height) {
            return Err(DetectorError::AnalysisFailed(format!(
                "recompressed image is {:?}, expected {:?}",
                recompressed.dimensions(),
                (width, height)
            )));
        }

        let differences = original
            .as_raw()
            .par_iter()
            .zip(recompressed.as_raw().par_iter())
            .map(|(&orig, &recomp)| orig.abs_diff(recomp))
            .collect::<Vec<u8>>();

        let max_difference = differences.par_iter().copied().max().unwrap_or(0);
        let mean_difference = if differences.is_empty() {
            0.0
        } else {
            differences.par_iter().map(|&d| d as f64).sum::<f64>() / differences.len() as f64
        };

        let scale = brightness_scale(max_difference);
        let scaled = differences
            .par_iter()
            .map(|&d| amplify(d, scale))
            .collect::<Vec<u8>>();

        let ela_image = RgbImage::from_raw(width, height, scaled).ok_or_else(|| {
            DetectorError::AnalysisFailed("error map buffer has the wrong length".into())
        })?;
        let encoded = encode_jpeg(&ela_image, self.artifact_quality)?;

        debug!(
            "ELA {}x{} at q{}: max residual {}, mean {:.3}, scale {:.2}",
            width, height, self.quality, max_difference, mean_difference, scale
        );

        Ok(ElaResult {
            image: ela_image,
            encoded,
            max_difference,
            mean_difference,
            scale,
        })
    }
}

/// 255 / max residual, with a divisor of 1 when the residual is zero.
pub fn brightness_scale(max_difference: u8) -> f64 {
    255.0 / max_difference.max(1) as f64
}

fn amplify(value: u8, scale: f64) -> u8 {
    // Truncates like an 8-bit brightness enhance.
    (value as f64 * scale).min(255.0) as u8
}
