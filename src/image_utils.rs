use std::io::Cursor;

use image::{ImageFormat, RgbImage, codecs::jpeg::JpegEncoder};

use crate::error::{DetectorError, Result};

/// Decodes any supported format into an 8-bit RGB buffer.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage> {
    if bytes.is_empty() {
        return Err(DetectorError::InvalidImage("empty payload".into()));
    }

    let decoded = image::load_from_memory(bytes)
        .map_err(|e| DetectorError::InvalidImage(e.to_string()))?;

    Ok(decoded.to_rgb8())
}

pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type())
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());

    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    image
        .write_with_encoder(encoder)
        .map_err(|e| DetectorError::AnalysisFailed(format!("JPEG encoding failed: {}", e)))?;

    Ok(buffer.into_inner())
}

/// Re-encodes as JPEG at `quality` and decodes the result again.
pub fn jpeg_roundtrip(image: &RgbImage, quality: u8) -> Result<RgbImage> {
    let encoded = encode_jpeg(image, quality)?;

    let decoded = image::load_from_memory_with_format(&encoded, ImageFormat::Jpeg)
        .map_err(|e| DetectorError::AnalysisFailed(format!("JPEG re-decoding failed: {}", e)))?;

    Ok(decoded.to_rgb8())
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| DetectorError::AnalysisFailed(format!("PNG encoding failed: {}", e)))?;

    Ok(buffer.into_inner())
}
