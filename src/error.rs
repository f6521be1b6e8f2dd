//! Error types for document and transport handling

use thiserror::Error;

/// Errors that can occur when loading or saving a recording document
#[derive(Error, Debug)]
pub enum DocumentError {
    /// File could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Document is not valid JSON or does not match the schema
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Document parsed but carries no "frames" key
    #[error("Document has no frames")]
    MissingFrames,

    /// Recordings are written as .json only
    #[error("Recording path must have a .json extension, got {0:?}")]
    BadExtension(String),

    /// A recording is already in progress on this recorder
    #[error("Recording already in progress")]
    RecordingActive,
}

/// Errors that can occur on the OSC transport
#[derive(Error, Debug)]
pub enum TransportError {
    /// Socket send/receive failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// OSC packet could not be encoded or decoded
    #[error("OSC error: {0}")]
    Osc(#[from] rosc::OscError),
}
