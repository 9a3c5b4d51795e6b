use image::RgbImage;

use crate::{error::Result, image_utils::{decode_rgb, sniff_mime}};

pub mod analysis;
pub mod classifier;
pub mod config;
pub mod decision;
pub mod error;
pub mod image_utils;
pub mod judge;
pub mod report;
pub mod resource;
pub mod server;
pub mod verdict;

pub use decision::{Decider, Strategy};
pub use error::{DetectorError, ErrorKind};
pub use verdict::{Label, Verdict};

/// An uploaded image: the bytes as received plus the decoded RGB buffer.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    pub bytes: Vec<u8>,
    pub image: RgbImage,
    pub mime_type: &'static str,
}

impl ImageAsset {
    /// Fails with `InvalidImage` when the bytes do not decode.
    pub fn decode(bytes: Vec<u8>) -> Result<Self> {
        let image = decode_rgb(&bytes)?;
        let mime_type = sniff_mime(&bytes).unwrap_or("image/jpeg");

        Ok(Self {
            bytes,
            image,
            mime_type,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ElaResult {
    /// Residuals stretched so the largest maps to 255.
    pub image: RgbImage,
    /// `image` as a standalone JPEG.
    pub encoded: Vec<u8>,
    pub max_difference: u8,
    pub mean_difference: f64,
    pub scale: f64,
}
