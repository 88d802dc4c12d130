//! Error types for mirror sessions.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("The target platform {name} could not be found in the config file {file}")]
    TargetNotFound { name: String, file: String },

    #[error("Resolution error: {0}")]
    Resolution(String),

    #[error("Unknown artifact classifier '{classifier}' for {id}_{version}")]
    UnknownClassifier {
        classifier: String,
        id: String,
        version: String,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Download of {url} failed: {cause}")]
    Download { url: String, cause: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Malformed metadata document: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Settings error: {0}")]
    Settings(#[from] toml::de::Error),

    #[error("Operation interrupted")]
    Cancelled,
}

impl MirrorError {
    /// Whether the error is the status code of a missing resource.
    pub fn is_not_found(&self) -> bool {
        matches!(self, MirrorError::HttpStatus { status: 404, .. })
    }
}

pub type Result<T> = std::result::Result<T, MirrorError>;
