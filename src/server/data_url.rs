use base64::{Engine, engine::general_purpose::STANDARD};

use crate::error::{DetectorError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct DataUrl {
    pub mime_type: Option<String>,
    pub data: Vec<u8>,
}

/// Accepts `data:<mime>;base64,<payload>` or a bare base64 payload.
pub fn parse(input: &str) -> Result<DataUrl> {
    let input = input.trim();

    let (mime_type, payload) = match input.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest
                .split_once(',')
                .ok_or_else(|| DetectorError::InvalidRequest("data URL has no payload".into()))?;
            let mime = header.strip_suffix(";base64").ok_or_else(|| {
                DetectorError::InvalidRequest("only base64 data URLs are supported".into())
            })?;
            let mime = (!mime.is_empty()).then(|| mime.to_ascii_lowercase());
            (mime, payload)
        }
        None => (None, input),
    };

    if let Some(mime) = &mime_type {
        if !mime.starts_with("image/") {
            return Err(DetectorError::InvalidImage(format!("{} is not an image type", mime)));
        }
    }

    let compact = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect::<String>();
    if compact.is_empty() {
        return Err(DetectorError::InvalidRequest("image payload is empty".into()));
    }
    let data = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| DetectorError::InvalidRequest(format!("invalid base64 payload: {}", e)))?;

    Ok(DataUrl { mime_type, data })
}

pub fn encode(mime_type: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(data))
}
