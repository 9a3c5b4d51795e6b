use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Model unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse failure classes. Each one maps to a single HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InputValidation,
    ResourceLoad,
    Inference,
    ExternalService,
}

impl DetectorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DetectorError::InvalidImage(_) | DetectorError::InvalidRequest(_) => {
                ErrorKind::InputValidation
            }
            DetectorError::ResourceUnavailable(_) => ErrorKind::ResourceLoad,
            DetectorError::ExternalService(_) | DetectorError::Http(_) => {
                ErrorKind::ExternalService
            }
            DetectorError::Inference(_)
            | DetectorError::AnalysisFailed(_)
            | DetectorError::Io(_)
            | DetectorError::Config(_) => ErrorKind::Inference,
        }
    }
}

pub type Result<T> = std::result::Result<T, DetectorError>;
