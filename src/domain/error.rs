use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TmError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Lookup timed out after {0:?}")]
    LookupTimeout(Duration),

    #[error("Transport failure: {0}")]
    LookupTransportFailure(String),

    #[error("Malformed response: {0}")]
    LookupMalformedResponse(String),

    #[error("Dispatcher is closed")]
    DispatcherClosed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl TmError {
    /// Short name of the error kind, used as a structured logging field.
    pub fn kind(&self) -> &'static str {
        match self {
            TmError::ProviderUnavailable(_) => "ProviderUnavailable",
            TmError::LookupTimeout(_) => "LookupTimeout",
            TmError::LookupTransportFailure(_) => "LookupTransportFailure",
            TmError::LookupMalformedResponse(_) => "LookupMalformedResponse",
            TmError::DispatcherClosed => "DispatcherClosed",
            TmError::Config(_) => "Config",
            TmError::Json(_) => "Json",
            TmError::Io(_) => "Io",
            TmError::Toml(_) => "Toml",
        }
    }
}

// reqwest 错误按查询失败类型分类
impl From<reqwest::Error> for TmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TmError::LookupTimeout(Duration::ZERO)
        } else if e.is_decode() {
            TmError::LookupMalformedResponse(e.to_string())
        } else if e.is_builder() {
            TmError::ProviderUnavailable(e.to_string())
        } else {
            TmError::LookupTransportFailure(e.to_string())
        }
    }
}
